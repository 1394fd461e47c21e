//! Plate-wide quality-control tests.
//!
//! The registry is an ordered list of entries, each a typed test variant
//! with its own parameters and an enabled flag. Tests are independent
//! predicates over one immutable snapshot of the run's aggregated results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{DiagnosisConfig, SampleRole};
use crate::error::ConfigError;
use crate::features::{FeatureSet, WellFeatures};
use crate::groups::{DiagKey, Group};
use crate::normalize::NormalizedSet;
use crate::plate::{WellDataStore, WellId, WellType};

pub mod checks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcCategory {
    InjectionArtifact,
    RawBaseline,
    Dff,
    Controls,
    Replicates,
}

impl fmt::Display for QcCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QcCategory::InjectionArtifact => "injection_artifact",
            QcCategory::RawBaseline => "raw_baseline",
            QcCategory::Dff => "dff",
            QcCategory::Controls => "controls",
            QcCategory::Replicates => "replicates",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub label: String,
    pub value: Option<f64>,
}

impl Measurement {
    pub fn new(label: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcTestResult {
    pub test_name: String,
    pub category: QcCategory,
    pub passed: bool,
    pub message: String,
    pub measured: Vec<Measurement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactRecoveryParams {
    pub max_change: f64,
    pub max_frames: usize,
}

impl Default for ArtifactRecoveryParams {
    fn default() -> Self {
        Self {
            max_change: 0.5,
            max_frames: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinParams {
    pub min: f64,
}

impl Default for MinParams {
    fn default() -> Self {
        Self { min: 100.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxParams {
    pub max: f64,
}

impl Default for MaxParams {
    fn default() -> Self {
        Self { max: 60000.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeParams {
    pub min: f64,
    pub max: f64,
}

impl Default for RangeParams {
    fn default() -> Self {
        Self {
            min: 100.0,
            max: 60000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdParams {
    pub max_sd: f64,
}

impl Default for SdParams {
    fn default() -> Self {
        Self { max_sd: 500.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviationParams {
    pub max_deviation: f64,
}

impl Default for DeviationParams {
    fn default() -> Self {
        Self { max_deviation: 0.1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupRangeParams {
    pub well_type: WellType,
    pub min: f64,
    pub max: f64,
}

impl Default for GroupRangeParams {
    fn default() -> Self {
        Self {
            well_type: WellType::Atp,
            min: 0.0,
            max: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IonomycinParams {
    pub min_peak: f64,
    pub max_cv: f64,
}

impl Default for IonomycinParams {
    fn default() -> Self {
        Self {
            min_peak: 0.5,
            max_cv: 25.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferCeilingParams {
    pub max_peak: f64,
}

impl Default for BufferCeilingParams {
    fn default() -> Self {
        Self { max_peak: 0.1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPercentParams {
    pub max_percent: f64,
}

impl Default for BufferPercentParams {
    fn default() -> Self {
        Self { max_percent: 20.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicateCvParams {
    pub max_cv: f64,
    pub well_types: Vec<WellType>,
}

impl Default for ReplicateCvParams {
    fn default() -> Self {
        Self {
            max_cv: 20.0,
            well_types: vec![WellType::Atp, WellType::Ionomycin],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum QcTest {
    ArtifactRecovery(ArtifactRecoveryParams),
    RawBaselineMin(MinParams),
    RawBaselineMax(MaxParams),
    RawBaselineMean(RangeParams),
    RawBaselineSd(SdParams),
    DffBaseline(DeviationParams),
    DffEnd(DeviationParams),
    PeakHeightRange(GroupRangeParams),
    PeakWidthRange(GroupRangeParams),
    AucRange(GroupRangeParams),
    PositiveControlRange(RangeParams),
    NtcBaseline(MaxParams),
    NtcResponse(MaxParams),
    IonomycinResponse(IonomycinParams),
    BufferCeiling(BufferCeilingParams),
    BufferPercentOfAtp(BufferPercentParams),
    ReplicateCv(ReplicateCvParams),
}

impl QcTest {
    pub fn name(&self) -> &'static str {
        match self {
            QcTest::ArtifactRecovery(_) => "artifact_recovery",
            QcTest::RawBaselineMin(_) => "raw_baseline_min",
            QcTest::RawBaselineMax(_) => "raw_baseline_max",
            QcTest::RawBaselineMean(_) => "raw_baseline_mean",
            QcTest::RawBaselineSd(_) => "raw_baseline_sd",
            QcTest::DffBaseline(_) => "dff_baseline",
            QcTest::DffEnd(_) => "dff_end",
            QcTest::PeakHeightRange(_) => "peak_height_range",
            QcTest::PeakWidthRange(_) => "peak_width_range",
            QcTest::AucRange(_) => "auc_range",
            QcTest::PositiveControlRange(_) => "positive_control_range",
            QcTest::NtcBaseline(_) => "ntc_baseline",
            QcTest::NtcResponse(_) => "ntc_response",
            QcTest::IonomycinResponse(_) => "ionomycin_response",
            QcTest::BufferCeiling(_) => "buffer_ceiling",
            QcTest::BufferPercentOfAtp(_) => "buffer_percent_of_atp",
            QcTest::ReplicateCv(_) => "replicate_cv",
        }
    }

    pub fn category(&self) -> QcCategory {
        match self {
            QcTest::ArtifactRecovery(_) => QcCategory::InjectionArtifact,
            QcTest::RawBaselineMin(_)
            | QcTest::RawBaselineMax(_)
            | QcTest::RawBaselineMean(_)
            | QcTest::RawBaselineSd(_) => QcCategory::RawBaseline,
            QcTest::DffBaseline(_)
            | QcTest::DffEnd(_)
            | QcTest::PeakHeightRange(_)
            | QcTest::PeakWidthRange(_)
            | QcTest::AucRange(_) => QcCategory::Dff,
            QcTest::PositiveControlRange(_)
            | QcTest::NtcBaseline(_)
            | QcTest::NtcResponse(_)
            | QcTest::IonomycinResponse(_)
            | QcTest::BufferCeiling(_)
            | QcTest::BufferPercentOfAtp(_) => QcCategory::Controls,
            QcTest::ReplicateCv(_) => QcCategory::Replicates,
        }
    }

    pub fn evaluate(&self, input: &AggregatedResults<'_>) -> QcTestResult {
        use crate::features::Feature;
        match self {
            QcTest::ArtifactRecovery(p) => checks::artifact_recovery(input, p),
            QcTest::RawBaselineMin(p) => checks::raw_baseline_min(input, p),
            QcTest::RawBaselineMax(p) => checks::raw_baseline_max(input, p),
            QcTest::RawBaselineMean(p) => checks::raw_baseline_mean(input, p),
            QcTest::RawBaselineSd(p) => checks::raw_baseline_sd(input, p),
            QcTest::DffBaseline(p) => {
                checks::max_abs_per_well(self, input, p, |f| f.baseline_deviation)
            }
            QcTest::DffEnd(p) => checks::max_abs_per_well(self, input, p, |f| f.end_deviation),
            QcTest::PeakHeightRange(p) => checks::group_range(self, input, p, Feature::PeakHeight),
            QcTest::PeakWidthRange(p) => checks::group_range(self, input, p, Feature::Fwhm),
            QcTest::AucRange(p) => checks::group_range(self, input, p, Feature::Auc),
            QcTest::PositiveControlRange(p) => checks::positive_control_range(input, p),
            QcTest::NtcBaseline(p) => checks::ntc_baseline(input, p),
            QcTest::NtcResponse(p) => checks::ntc_response(input, p),
            QcTest::IonomycinResponse(p) => checks::ionomycin_response(input, p),
            QcTest::BufferCeiling(p) => checks::buffer_ceiling(input, p),
            QcTest::BufferPercentOfAtp(p) => checks::buffer_percent_of_atp(input, p),
            QcTest::ReplicateCv(p) => checks::replicate_cv(input, p),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let name = self.name();
        let bad = |field: &'static str, reason: String| ConfigError::InvalidQcParameter {
            test: name,
            field,
            reason,
        };
        let range = |min: f64, max: f64| {
            if !(min.is_finite() && max.is_finite()) || min > max {
                Err(bad("min", format!("range [{}, {}] is empty or not finite", min, max)))
            } else {
                Ok(())
            }
        };
        let non_negative = |field: &'static str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(bad(field, format!("{} must be finite and >= 0", v)))
            }
        };
        match self {
            QcTest::ArtifactRecovery(p) => non_negative("max_change", p.max_change),
            QcTest::RawBaselineMin(p) => non_negative("min", p.min),
            QcTest::RawBaselineMax(p) | QcTest::NtcBaseline(p) => non_negative("max", p.max),
            QcTest::NtcResponse(p) => {
                if p.max.is_finite() {
                    Ok(())
                } else {
                    Err(bad("max", "must be finite".into()))
                }
            }
            QcTest::RawBaselineMean(p) | QcTest::PositiveControlRange(p) => range(p.min, p.max),
            QcTest::RawBaselineSd(p) => non_negative("max_sd", p.max_sd),
            QcTest::DffBaseline(p) | QcTest::DffEnd(p) => {
                non_negative("max_deviation", p.max_deviation)
            }
            QcTest::PeakHeightRange(p) | QcTest::PeakWidthRange(p) | QcTest::AucRange(p) => {
                if p.well_type == WellType::Unlabeled {
                    return Err(bad("well_type", "must name ATP, Ionomycin or Buffer".into()));
                }
                range(p.min, p.max)
            }
            QcTest::IonomycinResponse(p) => {
                non_negative("max_cv", p.max_cv)?;
                if p.min_peak.is_finite() {
                    Ok(())
                } else {
                    Err(bad("min_peak", "must be finite".into()))
                }
            }
            QcTest::BufferCeiling(p) => {
                if p.max_peak.is_finite() {
                    Ok(())
                } else {
                    Err(bad("max_peak", "must be finite".into()))
                }
            }
            QcTest::BufferPercentOfAtp(p) => non_negative("max_percent", p.max_percent),
            QcTest::ReplicateCv(p) => {
                non_negative("max_cv", p.max_cv)?;
                if p.well_types.is_empty() {
                    return Err(bad("well_types", "at least one well type required".into()));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcEntry {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub test: QcTest,
}

fn default_enabled() -> bool {
    true
}

impl QcEntry {
    pub fn new(test: QcTest, enabled: bool) -> Self {
        Self { enabled, test }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QcRegistry {
    pub entries: Vec<QcEntry>,
}

impl Default for QcRegistry {
    /// Every test, in category order; replicate CV, ionomycin response and
    /// ΔF/F0 baseline enabled.
    fn default() -> Self {
        let entries = vec![
            QcEntry::new(QcTest::ArtifactRecovery(Default::default()), false),
            QcEntry::new(QcTest::RawBaselineMin(Default::default()), false),
            QcEntry::new(QcTest::RawBaselineMax(Default::default()), false),
            QcEntry::new(QcTest::RawBaselineMean(Default::default()), false),
            QcEntry::new(QcTest::RawBaselineSd(Default::default()), false),
            QcEntry::new(QcTest::DffBaseline(Default::default()), true),
            QcEntry::new(QcTest::DffEnd(Default::default()), false),
            QcEntry::new(QcTest::PeakHeightRange(Default::default()), false),
            QcEntry::new(
                QcTest::PeakWidthRange(GroupRangeParams {
                    min: 0.0,
                    max: 120.0,
                    ..Default::default()
                }),
                false,
            ),
            QcEntry::new(
                QcTest::AucRange(GroupRangeParams {
                    min: 0.0,
                    max: 500.0,
                    ..Default::default()
                }),
                false,
            ),
            QcEntry::new(
                QcTest::PositiveControlRange(RangeParams {
                    min: 20.0,
                    max: 150.0,
                }),
                false,
            ),
            QcEntry::new(QcTest::NtcBaseline(MaxParams { max: 1000.0 }), false),
            QcEntry::new(QcTest::NtcResponse(MaxParams { max: 0.1 }), false),
            QcEntry::new(QcTest::IonomycinResponse(Default::default()), true),
            QcEntry::new(QcTest::BufferCeiling(Default::default()), false),
            QcEntry::new(QcTest::BufferPercentOfAtp(Default::default()), false),
            QcEntry::new(QcTest::ReplicateCv(Default::default()), true),
        ];
        Self { entries }
    }
}

impl QcRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, test: QcTest, enabled: bool) -> Self {
        self.entries.push(QcEntry::new(test, enabled));
        self
    }

    /// Enables or disables every entry of the named test.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> usize {
        let mut touched = 0;
        for entry in self.entries.iter_mut().filter(|e| e.test.name() == name) {
            entry.enabled = enabled;
            touched += 1;
        }
        touched
    }

    pub fn enabled(&self) -> impl Iterator<Item = &QcEntry> {
        self.entries.iter().filter(|e| e.enabled)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for entry in &self.entries {
            entry.test.validate()?;
        }
        Ok(())
    }

    /// Evaluates every enabled test in registry order. No short-circuit: a
    /// failing test never prevents the ones after it from running.
    pub fn evaluate(&self, input: &AggregatedResults<'_>) -> Vec<QcTestResult> {
        self.enabled().map(|e| e.test.evaluate(input)).collect()
    }
}

/// Immutable view of one run's results that QC tests read from.
#[derive(Debug, Clone, Copy)]
pub struct AggregatedResults<'a> {
    pub store: &'a WellDataStore,
    pub features: &'a FeatureSet,
    pub groups: &'a BTreeMap<DiagKey, Group>,
    pub normalized: &'a NormalizedSet,
    pub diagnosis: &'a DiagnosisConfig,
}

impl<'a> AggregatedResults<'a> {
    /// Wells that carry a label or sit in an assigned diagnosis column.
    pub fn analyzed_wells(&self) -> Vec<(WellId, &'a WellFeatures)> {
        self.store
            .wells()
            .filter(|w| w.label.is_some() || self.diagnosis.role_of(&w.id).is_some())
            .filter_map(|w| self.features.get(&w.id).map(|f| (w.id, f)))
            .collect()
    }

    pub fn wells_with_role(&self, role: SampleRole) -> Vec<(WellId, &'a WellFeatures)> {
        self.store
            .wells()
            .filter(|w| self.diagnosis.role_of(&w.id) == Some(role))
            .filter_map(|w| self.features.get(&w.id).map(|f| (w.id, f)))
            .collect()
    }

    pub fn groups_of_type(&self, well_type: WellType) -> Vec<(&'a DiagKey, &'a Group)> {
        self.groups
            .iter()
            .filter(|(k, _)| k.well_type == well_type)
            .collect()
    }

    pub fn group(&self, key: &DiagKey) -> Option<&'a Group> {
        self.groups.get(key)
    }
}
