pub mod cli;
pub mod config;
pub mod ctx;
pub mod diagnosis;
pub mod error;
pub mod features;
pub mod groups;
pub mod io;
pub mod math;
pub mod normalize;
pub mod pipeline;
pub mod plate;
pub mod qc;
pub mod schema {
    pub mod v1;
}
pub mod signal;

use anyhow::Result;

use crate::config::RunConfig;
use crate::ctx::Ctx;
use crate::pipeline::Pipeline;
use crate::plate::WellDataStore;

/// Runs the full analysis over an in-memory plate and returns the finished
/// context. Nothing is written to disk.
pub fn analyze(store: WellDataStore, config: RunConfig) -> Result<Ctx> {
    let mut ctx = Ctx::from_store(store, config);
    Pipeline::analysis().run(&mut ctx)?;
    Ok(ctx)
}
