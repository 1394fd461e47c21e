//! Per-well kinetic features over the post-stimulus window.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{AnalysisParameters, AucWindow, FeatureOptions};
use crate::math::stats::{mean, trapezoid};
use crate::plate::WellId;
use crate::signal::{DerivedTrace, DerivedTraceSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    PeakHeight,
    TimeToPeak,
    Auc,
    Fwhm,
    BaselineDeviation,
    EndDeviation,
    F0,
    BaselineSd,
    ArtifactChange,
}

impl Feature {
    pub const ALL: [Feature; 9] = [
        Feature::PeakHeight,
        Feature::TimeToPeak,
        Feature::Auc,
        Feature::Fwhm,
        Feature::BaselineDeviation,
        Feature::EndDeviation,
        Feature::F0,
        Feature::BaselineSd,
        Feature::ArtifactChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::PeakHeight => "peak_height",
            Feature::TimeToPeak => "time_to_peak",
            Feature::Auc => "auc",
            Feature::Fwhm => "fwhm",
            Feature::BaselineDeviation => "baseline_deviation",
            Feature::EndDeviation => "end_deviation",
            Feature::F0 => "f0",
            Feature::BaselineSd => "baseline_sd",
            Feature::ArtifactChange => "artifact_change",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WellFeatures {
    pub well: Option<WellId>,
    pub peak_height: Option<f64>,
    pub time_to_peak: Option<f64>,
    pub auc: Option<f64>,
    pub fwhm: Option<f64>,
    pub baseline_deviation: Option<f64>,
    pub end_deviation: Option<f64>,
    pub f0: Option<f64>,
    pub baseline_sd: Option<f64>,
    pub artifact_change: Option<f64>,
    pub artifact_recovery_frames: Option<usize>,
}

impl WellFeatures {
    pub fn empty(well: WellId) -> Self {
        Self {
            well: Some(well),
            ..Self::default()
        }
    }

    pub fn value(&self, feature: Feature) -> Option<f64> {
        let v = match feature {
            Feature::PeakHeight => self.peak_height,
            Feature::TimeToPeak => self.time_to_peak,
            Feature::Auc => self.auc,
            Feature::Fwhm => self.fwhm,
            Feature::BaselineDeviation => self.baseline_deviation,
            Feature::EndDeviation => self.end_deviation,
            Feature::F0 => self.f0,
            Feature::BaselineSd => self.baseline_sd,
            Feature::ArtifactChange => self.artifact_change,
        };
        v.filter(|x| x.is_finite())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub wells: BTreeMap<WellId, WellFeatures>,
    pub frame_interval: f64,
}

impl FeatureSet {
    pub fn get(&self, id: &WellId) -> Option<&WellFeatures> {
        self.wells.get(id)
    }
}

/// Index of the largest finite sample in `values[start..]`; first wins on ties.
pub fn peak_position(values: &[f64], start: usize) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate().skip(start) {
        if v.is_finite() && best.is_none_or(|(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// Full width at half maximum, walking outward from `peak` inside
/// `[start, len)`. `None` when either side never drops below half-max.
pub fn fwhm(trace: &DerivedTrace, start: usize, peak: usize, frame_interval: f64) -> Option<f64> {
    let height = trace.dff[peak];
    if !(height > 0.0) {
        return None;
    }
    let half = height / 2.0;
    let below = |i: &usize| trace.dff[*i].is_finite() && trace.dff[*i] < half;
    let left = (start..peak).rev().find(below)?;
    let right = (peak + 1..trace.len()).find(below)?;
    Some((trace.frames[right] - trace.frames[left]) as f64 * frame_interval)
}

pub fn extract_well(
    trace: &DerivedTrace,
    params: &AnalysisParameters,
    options: &FeatureOptions,
    frame_interval: f64,
) -> WellFeatures {
    let start = trace.position_at_or_after(params.peak_start_frame);
    let peak = peak_position(&trace.dff, start);

    let peak_height = peak.map(|p| trace.dff[p]);
    let time_to_peak = peak.map(|p| {
        trace.frames[p].saturating_sub(params.peak_start_frame) as f64 * frame_interval
    });
    let fwhm = peak.and_then(|p| fwhm(trace, start, p, frame_interval));

    let auc_from = match options.auc_window {
        AucWindow::PeakWindow => start,
        AucWindow::FullTrace => 0,
    };
    let auc = if auc_from < trace.len() {
        let times: Vec<f64> = (auc_from..trace.len())
            .map(|i| trace.time_of(i, frame_interval))
            .collect();
        Some(trapezoid(&times, &trace.dff[auc_from..]))
    } else {
        None
    };

    let baseline_end = params.baseline_frame_count.min(trace.len());
    let baseline_deviation = mean(&trace.dff[..baseline_end]);
    let end_deviation = match options.end_frame {
        Some(frame) => trace.position_of(frame).map(|p| trace.dff[p]),
        None => trace.dff.last().copied(),
    };

    WellFeatures {
        well: Some(trace.well),
        peak_height,
        time_to_peak,
        auc,
        fwhm,
        baseline_deviation,
        end_deviation,
        f0: Some(trace.f0),
        baseline_sd: Some(trace.baseline_sd),
        artifact_change: Some(trace.artifact.max_change),
        artifact_recovery_frames: trace.artifact.recovery_frames,
    }
}

/// Extracts features for every processed well. Wells that failed signal
/// processing get an all-null row so they stay visible downstream.
pub fn extract(
    traces: &DerivedTraceSet,
    params: &AnalysisParameters,
    options: &FeatureOptions,
    frame_interval: f64,
) -> FeatureSet {
    let mut wells = BTreeMap::new();
    for (id, trace) in &traces.traces {
        wells.insert(*id, extract_well(trace, params, options, frame_interval));
    }
    for id in traces.failures.keys() {
        wells.insert(*id, WellFeatures::empty(*id));
    }
    FeatureSet {
        wells,
        frame_interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::process_well;

    fn params() -> AnalysisParameters {
        AnalysisParameters {
            artifact_start_frame: 15,
            artifact_end_frame: 17,
            baseline_frame_count: 15,
            peak_start_frame: 18,
        }
    }

    fn raw(tail: &[f64]) -> Vec<f64> {
        let mut raw = vec![1000.0; 18];
        raw.extend_from_slice(tail);
        raw
    }

    fn features(raw: &[f64], remove: bool, options: &FeatureOptions, dt: f64) -> WellFeatures {
        let trace = process_well("A1".parse().unwrap(), raw, &params(), remove, 0.05).unwrap();
        extract_well(&trace, &params(), options, dt)
    }

    #[test]
    fn scenario_peak_after_artifact() {
        let mut tail = Vec::new();
        for _ in 0..3 {
            tail.extend([1000.0, 1500.0, 2000.0, 1500.0, 1000.0]);
        }
        let f = features(&raw(&tail), true, &FeatureOptions::default(), 1.0);
        assert_eq!(f.f0, Some(1000.0));
        assert_eq!(f.peak_height, Some(1.0));
        assert_eq!(f.time_to_peak, Some(2.0));
        // first samples below half-max sit at frames 18 and 22
        assert_eq!(f.fwhm, Some(4.0));
        assert!(f.baseline_deviation.unwrap().abs() < 1e-12);
        assert_eq!(f.end_deviation, Some(0.0));
    }

    #[test]
    fn time_to_peak_independent_of_artifact_removal() {
        let tail = [1000.0, 1200.0, 1800.0, 1400.0, 1000.0, 1000.0];
        let kept = features(&raw(&tail), false, &FeatureOptions::default(), 0.5);
        let removed = features(&raw(&tail), true, &FeatureOptions::default(), 0.5);
        assert_eq!(kept.time_to_peak, removed.time_to_peak);
        assert_eq!(kept.time_to_peak, Some(1.0));
        assert_eq!(kept.auc, removed.auc);
    }

    #[test]
    fn fwhm_null_without_decay() {
        let tail = [1000.0, 1500.0, 2000.0, 2000.0, 1900.0];
        let f = features(&raw(&tail), true, &FeatureOptions::default(), 1.0);
        assert_eq!(f.peak_height, Some(1.0));
        assert_eq!(f.fwhm, None);
    }

    #[test]
    fn fwhm_null_for_flat_trace() {
        let f = features(&raw(&[1000.0; 6]), true, &FeatureOptions::default(), 1.0);
        assert_eq!(f.peak_height, Some(0.0));
        assert_eq!(f.fwhm, None);
    }

    #[test]
    fn auc_in_seconds() {
        // ΔF/F0 after peak start: 0, 1, 0 over 2 s spacing.
        let tail = [1000.0, 2000.0, 1000.0];
        let f = features(&raw(&tail), false, &FeatureOptions::default(), 2.0);
        assert!((f.auc.unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn full_trace_auc_bridges_gap() {
        let tail = [2000.0, 2000.0];
        let opts = FeatureOptions {
            auc_window: AucWindow::FullTrace,
            ..FeatureOptions::default()
        };
        let f = features(&raw(&tail), true, &opts, 1.0);
        // frames 0..14 at 0, gap 14 -> 18 ramps 0 -> 1, then 18 -> 19 at 1.
        assert!((f.auc.unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn end_frame_inside_removed_window_is_null() {
        let opts = FeatureOptions {
            end_frame: Some(16),
            ..FeatureOptions::default()
        };
        let f = features(&raw(&[1000.0; 4]), true, &opts, 1.0);
        assert_eq!(f.end_deviation, None);
        let kept = features(&raw(&[1000.0; 4]), false, &opts, 1.0);
        assert_eq!(kept.end_deviation, Some(0.0));
    }

    #[test]
    fn failures_get_null_rows() {
        let mut set = DerivedTraceSet::default();
        let id: WellId = "B2".parse().unwrap();
        set.failures.insert(
            id,
            crate::error::DataIssue::NonPositiveBaseline { f0: 0.0 },
        );
        let out = extract(&set, &params(), &FeatureOptions::default(), 1.0);
        assert_eq!(out.get(&id).unwrap().peak_height, None);
    }
}
