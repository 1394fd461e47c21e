use anyhow::Result;
use tracing::info;

use crate::ctx::Ctx;
use crate::groups;
use crate::pipeline::Stage;

pub struct Stage5Groups;

impl Stage5Groups {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage5Groups {
    fn name(&self) -> &'static str {
        "stage5_groups"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let store = ctx.store()?;
        let features = ctx.features()?;
        let label_groups = groups::aggregate_by_label(features, store);
        let diagnostic_groups =
            groups::aggregate_diagnostic(features, store, &ctx.config.diagnosis);
        let empty = diagnostic_groups.values().filter(|g| !g.is_ok()).count();
        info!(
            label_groups = label_groups.len(),
            diagnostic_groups = diagnostic_groups.len(),
            empty,
            "groups_ready"
        );
        ctx.label_groups = label_groups;
        ctx.diagnostic_groups = diagnostic_groups;
        Ok(())
    }
}
