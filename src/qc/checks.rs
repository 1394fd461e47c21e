use crate::config::SampleRole;
use crate::features::{Feature, WellFeatures};
use crate::groups::{DiagKey, Group, SampleKey};
use crate::math::stats::{max, mean, min, percent_of};
use crate::plate::{WellId, WellType};

use super::{
    AggregatedResults, ArtifactRecoveryParams, BufferCeilingParams, BufferPercentParams,
    DeviationParams, GroupRangeParams, IonomycinParams, MaxParams, Measurement, MinParams,
    QcCategory, QcTest, QcTestResult, RangeParams, ReplicateCvParams, SdParams,
};

const MAX_LISTED: usize = 8;

/// Failures collected while a test walks its inputs.
#[derive(Default)]
struct Outcome {
    checked: usize,
    failures: Vec<String>,
    measured: Vec<Measurement>,
}

impl Outcome {
    fn check(&mut self, ok: bool, what: impl FnOnce() -> String) {
        self.checked += 1;
        if !ok {
            self.failures.push(what());
        }
    }

    fn finish(self, name: &str, category: QcCategory, subject: &str) -> QcTestResult {
        if self.checked == 0 {
            return unavailable(name, category, &format!("no {} to evaluate", subject));
        }
        let passed = self.failures.is_empty();
        let message = if passed {
            format!("{} {} within limits", self.checked, subject)
        } else {
            let mut listed: Vec<String> = self.failures.iter().take(MAX_LISTED).cloned().collect();
            if self.failures.len() > MAX_LISTED {
                listed.push(format!("and {} more", self.failures.len() - MAX_LISTED));
            }
            format!(
                "{}/{} {} failed: {}",
                self.failures.len(),
                self.checked,
                subject,
                listed.join("; ")
            )
        };
        QcTestResult {
            test_name: name.to_string(),
            category,
            passed,
            message,
            measured: self.measured,
        }
    }
}

fn unavailable(name: &str, category: QcCategory, detail: &str) -> QcTestResult {
    QcTestResult {
        test_name: name.to_string(),
        category,
        passed: false,
        message: format!("data unavailable: {}", detail),
        measured: Vec::new(),
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) => format!("{:.4}", x),
        None => "null".to_string(),
    }
}

fn per_well<'a>(
    wells: &[(WellId, &'a WellFeatures)],
    value: impl Fn(&WellFeatures) -> Option<f64>,
) -> Vec<(WellId, f64)> {
    wells
        .iter()
        .filter_map(|(id, f)| value(f).filter(|v| v.is_finite()).map(|v| (*id, v)))
        .collect()
}

fn only_values(values: &[(WellId, f64)]) -> Vec<f64> {
    values.iter().map(|(_, v)| *v).collect()
}

pub(super) fn artifact_recovery(
    input: &AggregatedResults<'_>,
    p: &ArtifactRecoveryParams,
) -> QcTestResult {
    let mut out = Outcome::default();
    let mut worst_change: Option<f64> = None;
    let mut worst_frames: Option<f64> = None;
    for (id, f) in input.analyzed_wells() {
        let Some(change) = f.artifact_change else {
            continue;
        };
        worst_change = Some(worst_change.map_or(change, |w| w.max(change)));
        let frames = f.artifact_recovery_frames;
        if let Some(n) = frames {
            worst_frames = Some(worst_frames.map_or(n as f64, |w| w.max(n as f64)));
        }
        let ok = change <= p.max_change && frames.is_some_and(|n| n <= p.max_frames);
        out.check(ok, || match frames {
            Some(n) => format!("{} change {:.3}, recovered after {} frames", id, change, n),
            None => format!("{} change {:.3}, never recovered", id, change),
        });
    }
    out.measured.push(Measurement::new("max_change", worst_change));
    out.measured.push(Measurement::new("max_recovery_frames", worst_frames));
    out.finish("artifact_recovery", QcCategory::InjectionArtifact, "wells")
}

pub(super) fn raw_baseline_min(input: &AggregatedResults<'_>, p: &MinParams) -> QcTestResult {
    let mut out = Outcome::default();
    let values = per_well(&input.analyzed_wells(), |f| f.f0);
    for (id, f0) in &values {
        out.check(*f0 >= p.min, || format!("{} F0 {:.1} < {}", id, f0, p.min));
    }
    let lowest = min(&only_values(&values));
    out.measured.push(Measurement::new("min_f0", lowest));
    out.finish("raw_baseline_min", QcCategory::RawBaseline, "wells")
}

pub(super) fn raw_baseline_max(input: &AggregatedResults<'_>, p: &MaxParams) -> QcTestResult {
    let mut out = Outcome::default();
    let values = per_well(&input.analyzed_wells(), |f| f.f0);
    for (id, f0) in &values {
        out.check(*f0 <= p.max, || format!("{} F0 {:.1} > {}", id, f0, p.max));
    }
    let highest = max(&only_values(&values));
    out.measured.push(Measurement::new("max_f0", highest));
    out.finish("raw_baseline_max", QcCategory::RawBaseline, "wells")
}

pub(super) fn raw_baseline_mean(input: &AggregatedResults<'_>, p: &RangeParams) -> QcTestResult {
    let name = "raw_baseline_mean";
    let values: Vec<f64> = per_well(&input.analyzed_wells(), |f| f.f0)
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    let Some(m) = mean(&values) else {
        return unavailable(name, QcCategory::RawBaseline, "no well has a valid F0");
    };
    let mut out = Outcome::default();
    out.check(m >= p.min && m <= p.max, || {
        format!("plate mean F0 {:.1} outside [{}, {}]", m, p.min, p.max)
    });
    out.measured.push(Measurement::new("mean_f0", Some(m)));
    out.finish(name, QcCategory::RawBaseline, "plate means")
}

pub(super) fn raw_baseline_sd(input: &AggregatedResults<'_>, p: &SdParams) -> QcTestResult {
    let mut out = Outcome::default();
    let values = per_well(&input.analyzed_wells(), |f| f.baseline_sd);
    for (id, sd) in &values {
        out.check(*sd <= p.max_sd, || {
            format!("{} baseline SD {:.1} > {}", id, sd, p.max_sd)
        });
    }
    let highest = max(&only_values(&values));
    out.measured.push(Measurement::new("max_baseline_sd", highest));
    out.finish("raw_baseline_sd", QcCategory::RawBaseline, "wells")
}

pub(super) fn max_abs_per_well(
    test: &QcTest,
    input: &AggregatedResults<'_>,
    p: &DeviationParams,
    value: impl Fn(&WellFeatures) -> Option<f64>,
) -> QcTestResult {
    let mut out = Outcome::default();
    let values = per_well(&input.analyzed_wells(), value);
    for (id, v) in &values {
        out.check(v.abs() <= p.max_deviation, || {
            format!("{} |ΔF/F0| {:.4} > {}", id, v.abs(), p.max_deviation)
        });
    }
    let worst = values.iter().map(|(_, v)| v.abs()).reduce(f64::max);
    out.measured.push(Measurement::new("max_abs_deviation", worst));
    out.finish(test.name(), test.category(), "wells")
}

pub(super) fn group_range(
    test: &QcTest,
    input: &AggregatedResults<'_>,
    p: &GroupRangeParams,
    feature: Feature,
) -> QcTestResult {
    let mut out = Outcome::default();
    for (key, group) in input.groups_of_type(p.well_type) {
        if key.sample == SampleKey::Ntc {
            continue;
        }
        let m = group.mean(feature);
        out.check(m.is_some_and(|v| v >= p.min && v <= p.max), || match m {
            Some(v) => format!("{} mean {} {:.4} outside [{}, {}]", key, feature.as_str(), v, p.min, p.max),
            None => format!("{} has no {} values", key, feature.as_str()),
        });
        out.measured.push(Measurement::new(key.to_string(), m));
    }
    let subject = format!("{} groups", p.well_type);
    out.finish(test.name(), test.category(), &subject)
}

pub(super) fn positive_control_range(
    input: &AggregatedResults<'_>,
    p: &RangeParams,
) -> QcTestResult {
    let name = "positive_control_range";
    let pc = &input.normalized.positive_control;
    let Some(v) = pc.ionomycin_normalized else {
        let detail = pc
            .message
            .clone()
            .unwrap_or_else(|| "positive control has no normalized value".into());
        return unavailable(name, QcCategory::Controls, &detail);
    };
    let mut out = Outcome::default();
    out.check(v >= p.min && v <= p.max, || {
        format!("positive control {:.2}% outside [{}, {}]", v, p.min, p.max)
    });
    out.measured.push(Measurement::new("positive_control_normalized", Some(v)));
    out.finish(name, QcCategory::Controls, "controls")
}

pub(super) fn ntc_baseline(input: &AggregatedResults<'_>, p: &MaxParams) -> QcTestResult {
    let mut out = Outcome::default();
    let values = per_well(&input.wells_with_role(SampleRole::Ntc), |f| f.f0);
    for (id, f0) in &values {
        out.check(*f0 <= p.max, || format!("{} NTC F0 {:.1} > {}", id, f0, p.max));
    }
    let highest = max(&only_values(&values));
    out.measured.push(Measurement::new("max_ntc_f0", highest));
    out.finish("ntc_baseline", QcCategory::Controls, "NTC wells")
}

pub(super) fn ntc_response(input: &AggregatedResults<'_>, p: &MaxParams) -> QcTestResult {
    let name = "ntc_response";
    let key = DiagKey::new(SampleKey::Ntc, WellType::Atp);
    let Some(m) = input.group(&key).and_then(|g| g.mean(Feature::PeakHeight)) else {
        return unavailable(name, QcCategory::Controls, "no NTC ATP response");
    };
    let mut out = Outcome::default();
    out.check(m <= p.max, || format!("NTC mean peak {:.4} > {}", m, p.max));
    out.measured.push(Measurement::new("ntc_peak_mean", Some(m)));
    out.finish(name, QcCategory::Controls, "controls")
}

pub(super) fn ionomycin_response(
    input: &AggregatedResults<'_>,
    p: &IonomycinParams,
) -> QcTestResult {
    let mut out = Outcome::default();
    for (key, group) in input.groups_of_type(WellType::Ionomycin) {
        if key.sample == SampleKey::Ntc {
            continue;
        }
        let m = group.mean(Feature::PeakHeight);
        let cv = group.cv(Feature::PeakHeight);
        let ok = m.is_some_and(|v| v >= p.min_peak) && cv.is_some_and(|c| c <= p.max_cv);
        out.check(ok, || {
            format!(
                "{} mean peak {} (min {}), CV {}% (max {})",
                key,
                fmt_opt(m),
                p.min_peak,
                fmt_opt(cv),
                p.max_cv
            )
        });
        out.measured.push(Measurement::new(format!("{} mean", key), m));
        out.measured.push(Measurement::new(format!("{} cv", key), cv));
    }
    out.finish("ionomycin_response", QcCategory::Controls, "ionomycin groups")
}

pub(super) fn buffer_ceiling(
    input: &AggregatedResults<'_>,
    p: &BufferCeilingParams,
) -> QcTestResult {
    let mut out = Outcome::default();
    for (key, group) in input.groups_of_type(WellType::Buffer) {
        let m = group.mean(Feature::PeakHeight);
        out.check(m.is_some_and(|v| v <= p.max_peak), || {
            format!("{} mean peak {} > {}", key, fmt_opt(m), p.max_peak)
        });
        out.measured.push(Measurement::new(key.to_string(), m));
    }
    out.finish("buffer_ceiling", QcCategory::Controls, "buffer groups")
}

fn atp_of<'a>(input: &AggregatedResults<'a>, sample: &SampleKey) -> Option<&'a Group> {
    input.group(&DiagKey::new(sample.clone(), WellType::Atp))
}

pub(super) fn buffer_percent_of_atp(
    input: &AggregatedResults<'_>,
    p: &BufferPercentParams,
) -> QcTestResult {
    let mut out = Outcome::default();
    for (key, group) in input.groups_of_type(WellType::Buffer) {
        let atp = atp_of(input, &key.sample).and_then(|g| g.mean(Feature::PeakHeight));
        let pct = percent_of(group.mean(Feature::PeakHeight), atp);
        out.check(pct.is_some_and(|v| v <= p.max_percent), || match pct {
            Some(v) => format!("{} buffer at {:.1}% of ATP > {}%", key.sample, v, p.max_percent),
            None => format!("{} buffer/ATP ratio undefined", key.sample),
        });
        out.measured
            .push(Measurement::new(format!("{} buffer % of ATP", key.sample), pct));
    }
    out.finish("buffer_percent_of_atp", QcCategory::Controls, "samples")
}

pub(super) fn replicate_cv(input: &AggregatedResults<'_>, p: &ReplicateCvParams) -> QcTestResult {
    let mut out = Outcome::default();
    for well_type in &p.well_types {
        for (key, group) in input.groups_of_type(*well_type) {
            if key.sample == SampleKey::Ntc {
                continue;
            }
            let n = group.n(Feature::PeakHeight);
            let cv = group.cv(Feature::PeakHeight);
            out.check(n >= 2 && cv.is_some_and(|c| c <= p.max_cv), || {
                if n < 2 {
                    format!("{} insufficient replicates (n={})", key, n)
                } else {
                    match cv {
                        Some(c) => format!("{} CV {:.2}% > {}%", key, c, p.max_cv),
                        None => format!("{} CV undefined (mean near zero)", key),
                    }
                }
            });
            out.measured.push(Measurement::new(key.to_string(), cv));
        }
    }
    out.finish("replicate_cv", QcCategory::Replicates, "replicate groups")
}
