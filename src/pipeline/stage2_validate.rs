use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::ctx::Ctx;
use crate::groups::check_roles;
use crate::pipeline::Stage;

/// Fail-fast configuration checks. Nothing is processed past a failure here.
pub struct Stage2Validate;

impl Stage2Validate {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage2Validate {
    fn name(&self) -> &'static str {
        "stage2_validate"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let store = ctx.store()?;
        ctx.config
            .validate(store.frame_count())
            .context("invalid configuration")?;
        check_roles(store, &ctx.config.diagnosis).context("invalid configuration")?;

        if !ctx.config.diagnosis.has_assignments() {
            warn!("no sample, NTC or positive-control columns assigned");
            ctx.warnings.push(
                "no diagnosis columns assigned; only wells labeled with a sample id are diagnosed"
                    .to_string(),
            );
        }
        info!(
            qc_enabled = ctx.config.qc.enabled().count(),
            "config_valid"
        );
        Ok(())
    }
}
