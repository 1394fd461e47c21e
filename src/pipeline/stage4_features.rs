use anyhow::{Context, Result};
use tracing::info;

use crate::ctx::Ctx;
use crate::features;
use crate::pipeline::Stage;

pub struct Stage4Features;

impl Stage4Features {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage4Features {
    fn name(&self) -> &'static str {
        "stage4_features"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let traces = ctx.traces.as_ref().context("derived traces missing")?;
        let set = features::extract(
            traces,
            &ctx.config.analysis,
            &ctx.config.features,
            ctx.frame_interval()?,
        );
        let with_peak = set.wells.values().filter(|f| f.peak_height.is_some()).count();
        info!(wells = set.wells.len(), with_peak, "features_ready");
        ctx.features = Some(set);
        Ok(())
    }
}
