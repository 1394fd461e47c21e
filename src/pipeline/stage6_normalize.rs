use anyhow::Result;
use tracing::{info, warn};

use crate::ctx::Ctx;
use crate::normalize::normalize_groups;
use crate::pipeline::Stage;

pub struct Stage6Normalize;

impl Stage6Normalize {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage6Normalize {
    fn name(&self) -> &'static str {
        "stage6_normalize"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let normalized = normalize_groups(&ctx.diagnostic_groups);
        for result in normalized.samples.values() {
            if let Some(message) = &result.message {
                warn!(sample = %result.sample_id, reason = %message, "normalization_incomplete");
            }
        }
        info!(
            samples = normalized.samples.len(),
            positive_control = ?normalized.positive_control.ionomycin_normalized,
            "normalization_ready"
        );
        ctx.normalized = Some(normalized);
        Ok(())
    }
}
