//! Baseline normalization and injection-artifact handling.
//!
//! Every trace keeps the original frame index of each retained sample, so
//! downstream windows work on shifted positions while times stay anchored to
//! the acquisition clock.

use std::collections::BTreeMap;

use tracing::warn;

use crate::config::AnalysisParameters;
use crate::error::DataIssue;
use crate::math::stats::{mean, sample_sd};
use crate::plate::{WellDataStore, WellId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArtifactProfile {
    /// Largest |ΔF/F0| inside the injection window (unremoved trace).
    pub max_change: f64,
    /// Frames from the extreme artifact sample back to baseline side.
    pub recovery_frames: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedTrace {
    pub well: WellId,
    pub dff: Vec<f64>,
    /// Original frame index of each retained sample. Strictly increasing.
    pub frames: Vec<usize>,
    pub f0: f64,
    pub baseline_sd: f64,
    pub artifact: ArtifactProfile,
}

impl DerivedTrace {
    pub fn len(&self) -> usize {
        self.dff.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dff.is_empty()
    }

    /// Position of the first retained sample at or after `frame`.
    pub fn position_at_or_after(&self, frame: usize) -> usize {
        self.frames.partition_point(|&f| f < frame)
    }

    /// Position of exactly `frame`, if it was retained.
    pub fn position_of(&self, frame: usize) -> Option<usize> {
        self.frames.binary_search(&frame).ok()
    }

    pub fn time_of(&self, pos: usize, frame_interval: f64) -> f64 {
        self.frames[pos] as f64 * frame_interval
    }

    /// Drops the injection window. A second call with the same parameters is
    /// a no-op because removal is keyed on original frame indices.
    pub fn remove_artifact(&self, params: &AnalysisParameters) -> DerivedTrace {
        let (dff, frames) = remove_artifact_frames(&self.dff, &self.frames, params);
        DerivedTrace {
            dff,
            frames,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DerivedTraceSet {
    pub traces: BTreeMap<WellId, DerivedTrace>,
    pub failures: BTreeMap<WellId, DataIssue>,
    pub artifact_removed: bool,
}

impl DerivedTraceSet {
    pub fn get(&self, id: &WellId) -> Option<&DerivedTrace> {
        self.traces.get(id)
    }
}

pub fn baseline_f0(raw: &[f64], baseline_frames: usize) -> Result<f64, DataIssue> {
    if baseline_frames == 0 || baseline_frames >= raw.len() {
        return Err(DataIssue::BaselineTooShort {
            baseline_frames,
            len: raw.len(),
        });
    }
    let f0 = mean(&raw[..baseline_frames]).unwrap_or(f64::NAN);
    if !f0.is_finite() || f0 <= 0.0 {
        return Err(DataIssue::NonPositiveBaseline { f0 });
    }
    Ok(f0)
}

pub fn delta_f_over_f0(raw: &[f64], f0: f64) -> Vec<f64> {
    raw.iter().map(|&v| (v - f0) / f0).collect()
}

pub fn remove_artifact_frames(
    values: &[f64],
    frames: &[usize],
    params: &AnalysisParameters,
) -> (Vec<f64>, Vec<usize>) {
    let window = params.artifact_start_frame..=params.artifact_end_frame;
    values
        .iter()
        .zip(frames.iter())
        .filter(|(_, f)| !window.contains(*f))
        .map(|(&v, &f)| (v, f))
        .unzip()
}

pub fn artifact_profile(
    dff: &[f64],
    params: &AnalysisParameters,
    tolerance: f64,
) -> ArtifactProfile {
    let start = params.artifact_start_frame.min(dff.len());
    let end = (params.artifact_end_frame + 1).min(dff.len());
    let mut extreme: Option<(usize, f64)> = None;
    for (i, &v) in dff.iter().enumerate().take(end).skip(start) {
        if !v.is_finite() {
            continue;
        }
        if extreme.is_none_or(|(_, e)| v.abs() > e.abs()) {
            extreme = Some((i, v));
        }
    }
    let Some((at, value)) = extreme else {
        return ArtifactProfile {
            max_change: 0.0,
            recovery_frames: Some(0),
        };
    };
    if value.abs() <= tolerance {
        return ArtifactProfile {
            max_change: value.abs(),
            recovery_frames: Some(0),
        };
    }
    let recovered = |v: f64| {
        if value < 0.0 {
            v >= -tolerance
        } else {
            v <= tolerance
        }
    };
    let recovery_frames = dff[at + 1..]
        .iter()
        .position(|&v| v.is_finite() && recovered(v))
        .map(|p| p + 1);
    ArtifactProfile {
        max_change: value.abs(),
        recovery_frames,
    }
}

pub fn process_well(
    well: WellId,
    raw: &[f64],
    params: &AnalysisParameters,
    remove_artifact: bool,
    recovery_tolerance: f64,
) -> Result<DerivedTrace, DataIssue> {
    let f0 = baseline_f0(raw, params.baseline_frame_count)?;
    let baseline_sd = sample_sd(&raw[..params.baseline_frame_count]).unwrap_or(0.0);
    let dff = delta_f_over_f0(raw, f0);
    let artifact = artifact_profile(&dff, params, recovery_tolerance);
    let frames: Vec<usize> = (0..raw.len()).collect();
    let trace = DerivedTrace {
        well,
        dff,
        frames,
        f0,
        baseline_sd,
        artifact,
    };
    if remove_artifact {
        Ok(trace.remove_artifact(params))
    } else {
        Ok(trace)
    }
}

/// Derives ΔF/F0 traces for every well in the store. Wells whose baseline is
/// unusable are listed in `failures`; the rest are processed normally.
pub fn process(
    store: &WellDataStore,
    params: &AnalysisParameters,
    remove_artifact: bool,
    recovery_tolerance: f64,
) -> DerivedTraceSet {
    let mut out = DerivedTraceSet {
        artifact_removed: remove_artifact,
        ..DerivedTraceSet::default()
    };
    for well in store.wells() {
        match process_well(well.id, &well.raw, params, remove_artifact, recovery_tolerance) {
            Ok(trace) => {
                out.traces.insert(well.id, trace);
            }
            Err(issue) => {
                warn!(well = %well.id, reason = %issue, "well_skipped");
                out.failures.insert(well.id, issue);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> AnalysisParameters {
        AnalysisParameters {
            artifact_start_frame: 15,
            artifact_end_frame: 17,
            baseline_frame_count: 15,
            peak_start_frame: 18,
        }
    }

    fn scenario_trace() -> Vec<f64> {
        let mut raw = vec![1000.0; 15];
        raw.extend([1000.0, 1000.0, 1000.0]);
        for _ in 0..3 {
            raw.extend([1000.0, 1500.0, 2000.0, 1500.0, 1000.0]);
        }
        raw
    }

    #[test]
    fn f0_and_dff() {
        let raw = scenario_trace();
        let f0 = baseline_f0(&raw, 15).unwrap();
        assert_eq!(f0, 1000.0);
        let dff = delta_f_over_f0(&raw, f0);
        assert_eq!(dff[20], 1.0);
        assert_eq!(dff[19], 0.5);
    }

    #[test]
    fn baseline_guards() {
        assert_eq!(
            baseline_f0(&[1.0, 2.0], 2),
            Err(DataIssue::BaselineTooShort {
                baseline_frames: 2,
                len: 2
            })
        );
        assert!(matches!(
            baseline_f0(&[0.0, 0.0, 5.0], 2),
            Err(DataIssue::NonPositiveBaseline { .. })
        ));
        assert!(matches!(
            baseline_f0(&[f64::NAN, 1.0, 5.0], 2),
            Err(DataIssue::NonPositiveBaseline { .. })
        ));
    }

    #[test]
    fn artifact_removal_shifts_indices() {
        let raw = scenario_trace();
        let trace = process_well("A1".parse().unwrap(), &raw, &params(), true, 0.05).unwrap();
        assert_eq!(trace.len(), raw.len() - 3);
        assert_eq!(trace.frames[14], 14);
        assert_eq!(trace.frames[15], 18);
        assert_eq!(trace.position_at_or_after(18), 15);
        assert_eq!(trace.dff[17], 1.0);
        assert_eq!(trace.position_of(16), None);
    }

    #[test]
    fn artifact_removal_is_idempotent() {
        let raw = scenario_trace();
        let once = process_well("A1".parse().unwrap(), &raw, &params(), true, 0.05).unwrap();
        let twice = once.remove_artifact(&params());
        assert_eq!(once, twice);
    }

    #[test]
    fn raw_trace_untouched() {
        let mut store = WellDataStore::new(1.0);
        let raw = scenario_trace();
        store.insert_raw("A1".parse().unwrap(), raw.clone()).unwrap();
        let set = process(&store, &params(), true, 0.05);
        assert_eq!(set.traces.len(), 1);
        assert_eq!(store.raw(&"A1".parse().unwrap()).unwrap(), raw.as_slice());
    }

    #[test]
    fn failed_wells_do_not_abort() {
        let mut store = WellDataStore::new(1.0);
        store.insert_raw("A1".parse().unwrap(), scenario_trace()).unwrap();
        let mut dead = scenario_trace();
        for v in dead.iter_mut().take(15) {
            *v = 0.0;
        }
        store.insert_raw("A2".parse().unwrap(), dead).unwrap();
        let set = process(&store, &params(), false, 0.05);
        assert_eq!(set.traces.len(), 1);
        assert!(set.failures.contains_key(&"A2".parse().unwrap()));
    }

    #[test]
    fn dip_artifact_recovery_counted() {
        let mut dff = vec![0.0; 15];
        dff.extend([-0.4, -0.6, -0.3]);
        dff.extend([-0.1, -0.02, 0.0, 0.5]);
        let profile = artifact_profile(&dff, &params(), 0.05);
        assert!((profile.max_change - 0.6).abs() < 1e-12);
        // extreme at 16, first value >= -0.05 at 19
        assert_eq!(profile.recovery_frames, Some(3));
    }

    #[test]
    fn artifact_without_recovery() {
        let mut dff = vec![0.0; 15];
        dff.extend([-0.4, -0.6, -0.5, -0.5, -0.5]);
        let profile = artifact_profile(&dff, &params(), 0.05);
        assert_eq!(profile.recovery_frames, None);
    }
}
