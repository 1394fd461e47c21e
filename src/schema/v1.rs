use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputMeta {
    pub source_file: Option<String>,
    pub data_path: Option<String>,
    pub layout_path: Option<String>,
    pub wells: u64,
    pub labeled_wells: u64,
    pub frames: u64,
    pub frame_interval: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    pub artifact_start_frame: u64,
    pub artifact_end_frame: u64,
    pub baseline_frame_count: u64,
    pub peak_start_frame: u64,
    pub remove_artifact: bool,
    pub auc_window: String,
    pub threshold_type: String,
    pub threshold_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellRecord {
    pub well: String,
    pub agonist: Option<String>,
    pub concentration: Option<String>,
    pub sample_id: Option<String>,
    pub well_type: Option<String>,
    pub issue: Option<String>,
    pub f0: Option<f64>,
    pub baseline_sd: Option<f64>,
    pub peak_height: Option<f64>,
    pub time_to_peak: Option<f64>,
    pub auc: Option<f64>,
    pub fwhm: Option<f64>,
    pub baseline_deviation: Option<f64>,
    pub end_deviation: Option<f64>,
    pub artifact_change: Option<f64>,
    pub artifact_recovery_frames: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureStats {
    pub n: u64,
    pub mean: Option<f64>,
    pub sd: Option<f64>,
    pub sem: Option<f64>,
    pub cv: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub key: String,
    pub sample: Option<String>,
    pub well_type: Option<String>,
    pub status: String,
    pub members: Vec<String>,
    pub features: BTreeMap<String, FeatureStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub sample_id: String,
    pub atp_peak_mean: Option<f64>,
    pub ionomycin_peak_mean: Option<f64>,
    pub ionomycin_normalized: Option<f64>,
    pub pc_normalized: Option<f64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Normalization {
    pub samples: Vec<NormalizedRecord>,
    pub positive_control: Option<NormalizedRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasuredValue {
    pub label: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcRecord {
    pub test_name: String,
    pub category: String,
    pub passed: bool,
    pub message: String,
    pub measured: Vec<MeasuredValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcSummary {
    pub passed: bool,
    pub failed_tests: Vec<String>,
    pub results: Vec<QcRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub sample_id: String,
    pub status: String,
    pub normalized_value: Option<f64>,
    pub threshold_type: String,
    pub threshold_used: f64,
    pub failed_tests: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FliprQcV1 {
    pub tool: String,
    pub version: String,
    pub schema_version: String,
    pub input_meta: InputMeta,
    pub parameters: Option<Parameters>,
    pub wells: Vec<WellRecord>,
    pub label_groups: Vec<GroupRecord>,
    pub diagnostic_groups: Vec<GroupRecord>,
    pub normalization: Normalization,
    pub qc: QcSummary,
    pub diagnosis: Vec<DiagnosisRecord>,
    pub warnings: Vec<String>,
}

impl FliprQcV1 {
    pub fn empty(tool_version: &str) -> Self {
        Self {
            tool: "kira-fliprqc".to_string(),
            version: tool_version.to_string(),
            schema_version: "v1".to_string(),
            input_meta: InputMeta {
                source_file: None,
                data_path: None,
                layout_path: None,
                wells: 0,
                labeled_wells: 0,
                frames: 0,
                frame_interval: 1.0,
            },
            parameters: None,
            wells: Vec::new(),
            label_groups: Vec::new(),
            diagnostic_groups: Vec::new(),
            normalization: Normalization {
                samples: Vec::new(),
                positive_control: None,
            },
            qc: QcSummary {
                passed: true,
                failed_tests: Vec::new(),
                results: Vec::new(),
            },
            diagnosis: Vec::new(),
            warnings: Vec::new(),
        }
    }
}
