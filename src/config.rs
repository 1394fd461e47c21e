//! Run configuration: analysis window parameters, feature options, QC
//! registry and diagnosis settings. Loaded from JSON and copied into each
//! run context.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::plate::{COLUMNS, ROWS, WellId, WellType};
use crate::qc::QcRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParameters {
    pub artifact_start_frame: usize,
    pub artifact_end_frame: usize,
    pub baseline_frame_count: usize,
    pub peak_start_frame: usize,
}

impl Default for AnalysisParameters {
    fn default() -> Self {
        Self {
            artifact_start_frame: 18,
            artifact_end_frame: 30,
            baseline_frame_count: 15,
            peak_start_frame: 31,
        }
    }
}

impl AnalysisParameters {
    /// Checks frame ordering against a plate's trace length. The first
    /// violated field is reported.
    pub fn validate(&self, frame_count: usize) -> Result<(), ConfigError> {
        if self.baseline_frame_count == 0 {
            return Err(invalid("baseline_frame_count", "must be at least 1".into()));
        }
        if self.baseline_frame_count > self.artifact_start_frame {
            return Err(invalid(
                "baseline_frame_count",
                format!(
                    "{} exceeds artifact_start_frame {}",
                    self.baseline_frame_count, self.artifact_start_frame
                ),
            ));
        }
        if self.artifact_start_frame >= self.artifact_end_frame {
            return Err(invalid(
                "artifact_end_frame",
                format!(
                    "{} must be greater than artifact_start_frame {}",
                    self.artifact_end_frame, self.artifact_start_frame
                ),
            ));
        }
        if self.artifact_end_frame >= self.peak_start_frame {
            return Err(invalid(
                "peak_start_frame",
                format!(
                    "{} must be greater than artifact_end_frame {}",
                    self.peak_start_frame, self.artifact_end_frame
                ),
            ));
        }
        if self.peak_start_frame > frame_count {
            return Err(invalid(
                "peak_start_frame",
                format!(
                    "{} exceeds trace length {}",
                    self.peak_start_frame, frame_count
                ),
            ));
        }
        Ok(())
    }

    /// Number of frames dropped by artifact removal.
    pub fn artifact_len(&self) -> usize {
        self.artifact_end_frame - self.artifact_start_frame + 1
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidParameter { field, reason }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AucWindow {
    #[default]
    PeakWindow,
    FullTrace,
}

impl AucWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            AucWindow::PeakWindow => "peak_window",
            AucWindow::FullTrace => "full_trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureOptions {
    pub auc_window: AucWindow,
    /// Original frame index used for end deviation. `None` = last frame.
    pub end_frame: Option<usize>,
    /// |ΔF/F0| tolerance for considering the signal recovered after injection.
    pub recovery_tolerance: f64,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self {
            auc_window: AucWindow::PeakWindow,
            end_frame: None,
            recovery_tolerance: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdType {
    #[default]
    Ionomycin,
    PositiveControl,
}

impl ThresholdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdType::Ionomycin => "ionomycin",
            ThresholdType::PositiveControl => "positive_control",
        }
    }
}

/// Rows per assigned column, counted from row A down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnLayout {
    pub atp_wells: usize,
    pub ionomycin_wells: usize,
    pub buffer_wells: usize,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            atp_wells: 4,
            ionomycin_wells: 2,
            buffer_wells: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleRole {
    Test,
    Ntc,
    PositiveControl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosisConfig {
    pub threshold_type: ThresholdType,
    pub threshold_value: f64,
    pub sample_columns: Vec<u8>,
    pub ntc_columns: Vec<u8>,
    pub positive_control_columns: Vec<u8>,
    pub include_buffer: bool,
    pub column_layout: ColumnLayout,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            threshold_type: ThresholdType::Ionomycin,
            threshold_value: 20.0,
            sample_columns: Vec::new(),
            ntc_columns: Vec::new(),
            positive_control_columns: Vec::new(),
            include_buffer: true,
            column_layout: ColumnLayout::default(),
        }
    }
}

impl DiagnosisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold_value.is_finite() {
            return Err(ConfigError::InvalidThreshold(self.threshold_value));
        }
        let roles: [(&'static str, &Vec<u8>); 3] = [
            ("sample_columns", &self.sample_columns),
            ("ntc_columns", &self.ntc_columns),
            ("positive_control_columns", &self.positive_control_columns),
        ];
        let mut owner: [Option<&'static str>; COLUMNS as usize + 1] = [None; COLUMNS as usize + 1];
        for (field, columns) in roles {
            for &column in columns {
                if column == 0 || column > COLUMNS {
                    return Err(ConfigError::ColumnOutOfRange { field, column });
                }
                if let Some(first) = owner[column as usize] {
                    return Err(ConfigError::OverlappingColumns {
                        column,
                        first,
                        second: field,
                    });
                }
                owner[column as usize] = Some(field);
            }
        }
        let layout = self.column_layout;
        let buffer_rows = if self.include_buffer {
            layout.buffer_wells
        } else {
            0
        };
        let rows = layout.atp_wells + layout.ionomycin_wells + buffer_rows;
        if rows > ROWS as usize {
            return Err(ConfigError::ColumnLayoutTooTall { rows });
        }
        Ok(())
    }

    pub fn role_of(&self, well: &WellId) -> Option<SampleRole> {
        let column = well.column();
        if self.sample_columns.contains(&column) {
            Some(SampleRole::Test)
        } else if self.ntc_columns.contains(&column) {
            Some(SampleRole::Ntc)
        } else if self.positive_control_columns.contains(&column) {
            Some(SampleRole::PositiveControl)
        } else {
            None
        }
    }

    /// Well type implied by the row position inside an assigned column.
    pub fn expected_type(&self, well: &WellId) -> Option<WellType> {
        let row = well.row() as usize;
        let layout = self.column_layout;
        let atp_end = layout.atp_wells;
        let iono_end = atp_end + layout.ionomycin_wells;
        let buffer_end = iono_end + layout.buffer_wells;
        if row < atp_end {
            Some(WellType::Atp)
        } else if row < iono_end {
            Some(WellType::Ionomycin)
        } else if self.include_buffer && row < buffer_end {
            Some(WellType::Buffer)
        } else {
            None
        }
    }

    pub fn has_assignments(&self) -> bool {
        !(self.sample_columns.is_empty()
            && self.ntc_columns.is_empty()
            && self.positive_control_columns.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub analysis: AnalysisParameters,
    pub remove_artifact: bool,
    /// Seconds per frame. Overrides the interval derived from the plate file.
    pub frame_interval: Option<f64>,
    pub features: FeatureOptions,
    pub qc: QcRegistry,
    pub diagnosis: DiagnosisConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisParameters::default(),
            remove_artifact: false,
            frame_interval: None,
            features: FeatureOptions::default(),
            qc: QcRegistry::default(),
            diagnosis: DiagnosisConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let cfg: RunConfig = serde_json::from_str(content)?;
        Ok(cfg)
    }

    /// Validates everything that does not depend on the layout.
    pub fn validate(&self, frame_count: usize) -> Result<(), ConfigError> {
        self.analysis.validate(frame_count)?;
        if let Some(interval) = self.frame_interval {
            if !(interval.is_finite() && interval > 0.0) {
                return Err(ConfigError::InvalidFrameInterval(interval));
            }
        }
        self.diagnosis.validate()?;
        self.qc.validate()?;
        Ok(())
    }
}
