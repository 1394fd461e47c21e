use anyhow::Result;
use std::time::Instant;
use tracing::{info, warn};

use crate::ctx::Ctx;
use stage0_scaffold::Stage0Scaffold;
use stage1_input::Stage1Input;
use stage2_validate::Stage2Validate;
use stage3_signal::Stage3Signal;
use stage4_features::Stage4Features;
use stage5_groups::Stage5Groups;
use stage6_normalize::Stage6Normalize;
use stage7_qc::Stage7Qc;
use stage8_diagnosis::Stage8Diagnosis;
use stage9_output::Stage9Output;

pub mod stage0_scaffold;
pub mod stage1_input;
pub mod stage2_validate;
pub mod stage3_signal;
pub mod stage4_features;
pub mod stage5_groups;
pub mod stage6_normalize;
pub mod stage7_qc;
pub mod stage8_diagnosis;
pub mod stage9_output;

pub trait Stage {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &mut Ctx) -> Result<()>;
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Input through diagnosis and report, in order.
    pub fn analysis() -> Self {
        Self::new(vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage1Input::new()),
            Box::new(Stage2Validate::new()),
            Box::new(Stage3Signal::new()),
            Box::new(Stage4Features::new()),
            Box::new(Stage5Groups::new()),
            Box::new(Stage6Normalize::new()),
            Box::new(Stage7Qc::new()),
            Box::new(Stage8Diagnosis::new()),
            Box::new(Stage9Output::new()),
        ])
    }

    /// Input loading and configuration checks only.
    pub fn validation() -> Self {
        Self::new(vec![
            Box::new(Stage1Input::new()),
            Box::new(Stage2Validate::new()),
        ])
    }

    pub fn run(&self, ctx: &mut Ctx) -> Result<()> {
        for stage in &self.stages {
            let start = Instant::now();
            info!(stage = stage.name(), "stage started");
            if let Err(err) = stage.run(ctx) {
                let elapsed_ms = start.elapsed().as_millis();
                warn!(
                    stage = stage.name(),
                    elapsed_ms = elapsed_ms as u64,
                    "stage failed"
                );
                return Err(err);
            }
            let elapsed_ms = start.elapsed().as_millis();
            info!(
                stage = stage.name(),
                elapsed_ms = elapsed_ms as u64,
                "stage finished"
            );
        }
        Ok(())
    }
}
