use anyhow::Result;
use tracing::info;

use crate::ctx::Ctx;
use crate::pipeline::Stage;
use crate::signal;

pub struct Stage3Signal;

impl Stage3Signal {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage3Signal {
    fn name(&self) -> &'static str {
        "stage3_signal"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let cfg = &ctx.config;
        let traces = signal::process(
            ctx.store()?,
            &cfg.analysis,
            cfg.remove_artifact,
            cfg.features.recovery_tolerance,
        );
        for (well, issue) in &traces.failures {
            ctx.warnings.push(format!("well {}: {}", well, issue));
        }
        info!(
            processed = traces.traces.len(),
            failed = traces.failures.len(),
            artifact_removed = traces.artifact_removed,
            "signal_ready"
        );
        ctx.traces = Some(traces);
        Ok(())
    }
}
