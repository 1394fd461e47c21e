use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::ctx::Ctx;
use crate::io::{layout, plate_reader};
use crate::pipeline::Stage;

pub struct Stage1Input;

impl Stage1Input {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage1Input {
    fn name(&self) -> &'static str {
        "stage1_input"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        if ctx.store.is_none() {
            let path = ctx
                .data_path
                .clone()
                .context("no plate data: pass a data file or an in-memory store")?;
            let plate = plate_reader::read_plate_file(&path)?;
            ctx.warnings.extend(plate.warnings);
            ctx.time_points = plate.time_points;
            ctx.store = Some(plate.store);
        }

        if let Some(path) = ctx.layout_path.clone() {
            let layout = layout::read_layout_file(&path)?;
            let store = ctx.store.as_mut().context("plate data not loaded")?;
            let warnings = layout::apply_layout(store, &layout);
            for w in &warnings {
                warn!(warning = %w, "layout_warning");
            }
            ctx.warnings.extend(warnings);
        }

        if let Some(interval) = ctx.config.frame_interval {
            let store = ctx.store.as_mut().context("plate data not loaded")?;
            store.set_frame_interval(interval);
        }

        let store = ctx.store()?;
        let wells = store.len() as u64;
        let labeled = store.labeled_count() as u64;
        let frames = store.frame_count() as u64;
        let frame_interval = store.frame_interval();
        let source = store.source.clone();

        ctx.report.input_meta.source_file = source;
        ctx.report.input_meta.wells = wells;
        ctx.report.input_meta.labeled_wells = labeled;
        ctx.report.input_meta.frames = frames;
        ctx.report.input_meta.frame_interval = frame_interval;

        info!(wells, labeled, frames, frame_interval, "input_ready");
        Ok(())
    }
}
