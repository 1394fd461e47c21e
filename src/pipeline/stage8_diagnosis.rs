use anyhow::Result;
use tracing::info;

use crate::ctx::Ctx;
use crate::diagnosis::{Verdict, diagnose};
use crate::pipeline::Stage;

pub struct Stage8Diagnosis;

impl Stage8Diagnosis {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage8Diagnosis {
    fn name(&self) -> &'static str {
        "stage8_diagnosis"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let verdicts = diagnose(&ctx.qc_results, ctx.normalized()?, &ctx.config.diagnosis);
        let count = |v: Verdict| verdicts.values().filter(|d| d.status == v).count();
        info!(
            positive = count(Verdict::Positive),
            negative = count(Verdict::Negative),
            invalid = count(Verdict::Invalid),
            "diagnosis_ready"
        );
        ctx.verdicts = verdicts;
        Ok(())
    }
}
