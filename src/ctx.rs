use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::RunConfig;
use crate::diagnosis::DiagnosisVerdict;
use crate::features::FeatureSet;
use crate::groups::{DiagKey, Group};
use crate::normalize::NormalizedSet;
use crate::plate::WellDataStore;
use crate::qc::QcTestResult;
use crate::schema::v1::FliprQcV1;
use crate::signal::DerivedTraceSet;

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub out_dir: PathBuf,
    pub json_path: PathBuf,
    pub tsv_path: PathBuf,
}

/// One processing run. Owns its configuration snapshot, the plate and every
/// stage's output.
#[derive(Debug)]
pub struct Ctx {
    pub data_path: Option<PathBuf>,
    pub layout_path: Option<PathBuf>,
    pub config: RunConfig,
    pub write_json: bool,
    pub write_tsv: bool,
    pub store: Option<WellDataStore>,
    pub time_points: Vec<f64>,
    pub traces: Option<DerivedTraceSet>,
    pub features: Option<FeatureSet>,
    pub label_groups: BTreeMap<String, Group>,
    pub diagnostic_groups: BTreeMap<DiagKey, Group>,
    pub normalized: Option<NormalizedSet>,
    pub qc_results: Vec<QcTestResult>,
    pub verdicts: BTreeMap<String, DiagnosisVerdict>,
    pub warnings: Vec<String>,
    pub output: OutputPaths,
    pub report: FliprQcV1,
}

impl Ctx {
    pub fn new(
        data_path: Option<PathBuf>,
        layout_path: Option<PathBuf>,
        out_dir: PathBuf,
        config: RunConfig,
        write_json: bool,
        write_tsv: bool,
        tool_version: &str,
    ) -> Self {
        let json_path = out_dir.join("fliprqc.json");
        let tsv_path = out_dir.join("fliprqc.tsv");
        Self {
            data_path,
            layout_path,
            config,
            write_json,
            write_tsv,
            store: None,
            time_points: Vec::new(),
            traces: None,
            features: None,
            label_groups: BTreeMap::new(),
            diagnostic_groups: BTreeMap::new(),
            normalized: None,
            qc_results: Vec::new(),
            verdicts: BTreeMap::new(),
            warnings: Vec::new(),
            output: OutputPaths {
                out_dir,
                json_path,
                tsv_path,
            },
            report: FliprQcV1::empty(tool_version),
        }
    }

    /// Context over an in-memory plate; the input stage leaves it untouched.
    pub fn from_store(store: WellDataStore, config: RunConfig) -> Self {
        let mut ctx = Self::new(
            None,
            None,
            PathBuf::from("."),
            config,
            false,
            false,
            env!("CARGO_PKG_VERSION"),
        );
        ctx.store = Some(store);
        ctx
    }

    pub fn store(&self) -> Result<&WellDataStore> {
        self.store.as_ref().context("plate data not loaded")
    }

    pub fn features(&self) -> Result<&FeatureSet> {
        self.features.as_ref().context("features missing")
    }

    pub fn normalized(&self) -> Result<&NormalizedSet> {
        self.normalized.as_ref().context("normalized results missing")
    }

    pub fn frame_interval(&self) -> Result<f64> {
        Ok(self.store()?.frame_interval())
    }

    pub fn qc_passed(&self) -> bool {
        self.qc_results.iter().all(|r| r.passed)
    }
}
