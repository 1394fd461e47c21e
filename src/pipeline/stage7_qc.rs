use anyhow::Result;
use tracing::{info, warn};

use crate::ctx::Ctx;
use crate::pipeline::Stage;
use crate::qc::AggregatedResults;

pub struct Stage7Qc;

impl Stage7Qc {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage7Qc {
    fn name(&self) -> &'static str {
        "stage7_qc"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let snapshot = AggregatedResults {
            store: ctx.store()?,
            features: ctx.features()?,
            groups: &ctx.diagnostic_groups,
            normalized: ctx.normalized()?,
            diagnosis: &ctx.config.diagnosis,
        };
        let results = ctx.config.qc.evaluate(&snapshot);
        for r in results.iter().filter(|r| !r.passed) {
            warn!(test = %r.test_name, category = %r.category, message = %r.message, "qc_failed");
        }
        let failed = results.iter().filter(|r| !r.passed).count();
        info!(evaluated = results.len(), failed, "qc_ready");
        ctx.qc_results = results;
        Ok(())
    }
}
