//! Ionomycin-relative and positive-control-relative response normalization.
//!
//! The positive-control value is a double ratio: a sample's ionomycin
//! normalized response divided by the positive control's own ionomycin
//! normalized response.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::DataIssue;
use crate::features::Feature;
use crate::groups::{DiagKey, Group, SampleKey, sample_ids};
use crate::math::stats::{NEAR_ZERO, percent_of};
use crate::plate::WellType;

pub const POSITIVE_CONTROL_ID: &str = "positive_control";

#[derive(Debug, Clone, Copy)]
pub struct SampleGroups<'a> {
    pub atp: &'a Group,
    pub ionomycin: &'a Group,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub sample_id: String,
    pub atp_peak_mean: Option<f64>,
    pub ionomycin_peak_mean: Option<f64>,
    pub ionomycin_normalized: Option<f64>,
    pub pc_normalized: Option<f64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedSet {
    pub samples: BTreeMap<String, NormalizedResult>,
    pub positive_control: NormalizedResult,
}

/// ATP peak mean / ionomycin peak mean × 100. Both groups must be `ok`.
pub fn ionomycin_normalized(sample_id: &str, groups: SampleGroups<'_>) -> Result<f64, DataIssue> {
    if !groups.atp.is_ok() {
        return Err(DataIssue::EmptyGroup {
            group: groups.atp.name.clone(),
        });
    }
    let iono_mean = groups.ionomycin.mean(Feature::PeakHeight);
    if !groups.ionomycin.is_ok() || iono_mean.is_none_or(|m| m.abs() < NEAR_ZERO) {
        return Err(DataIssue::MissingReference {
            reference: "ionomycin",
            sample_id: sample_id.to_string(),
        });
    }
    percent_of(groups.atp.mean(Feature::PeakHeight), iono_mean).ok_or_else(|| {
        DataIssue::MissingReference {
            reference: "ionomycin",
            sample_id: sample_id.to_string(),
        }
    })
}

fn single(sample_id: &str, groups: SampleGroups<'_>) -> NormalizedResult {
    let (value, message) = match ionomycin_normalized(sample_id, groups) {
        Ok(v) => (Some(v), None),
        Err(issue) => (None, Some(issue.to_string())),
    };
    NormalizedResult {
        sample_id: sample_id.to_string(),
        atp_peak_mean: groups.atp.mean(Feature::PeakHeight),
        ionomycin_peak_mean: groups.ionomycin.mean(Feature::PeakHeight),
        ionomycin_normalized: value,
        pc_normalized: None,
        message,
    }
}

/// Runs ionomycin normalization for every sample, then the positive-control
/// pass for the samples whose first pass succeeded.
pub fn normalize(
    samples: &BTreeMap<String, SampleGroups<'_>>,
    positive_control: SampleGroups<'_>,
) -> NormalizedSet {
    let pc = single(POSITIVE_CONTROL_ID, positive_control);
    let mut out = BTreeMap::new();
    for (sample_id, groups) in samples {
        let mut result = single(sample_id, *groups);
        if let Some(value) = result.ionomycin_normalized {
            result.pc_normalized = percent_of(Some(value), pc.ionomycin_normalized);
            if result.pc_normalized.is_none() {
                result.message = Some(
                    DataIssue::MissingReference {
                        reference: "positive-control",
                        sample_id: sample_id.clone(),
                    }
                    .to_string(),
                );
            }
        }
        out.insert(sample_id.clone(), result);
    }
    NormalizedSet {
        samples: out,
        positive_control: pc,
    }
}

/// Normalizes straight from a diagnostic grouping; absent groups count as
/// empty.
pub fn normalize_groups(groups: &BTreeMap<DiagKey, Group>) -> NormalizedSet {
    let empty_atp = Group::empty("missing / ATP");
    let empty_iono = Group::empty("missing / Ionomycin");
    let lookup = |sample: SampleKey| SampleGroups {
        atp: groups
            .get(&DiagKey::new(sample.clone(), WellType::Atp))
            .unwrap_or(&empty_atp),
        ionomycin: groups
            .get(&DiagKey::new(sample, WellType::Ionomycin))
            .unwrap_or(&empty_iono),
    };
    let samples: BTreeMap<String, SampleGroups<'_>> = sample_ids(groups)
        .into_iter()
        .map(|id| (id.clone(), lookup(SampleKey::Sample(id))))
        .collect();
    normalize(&samples, lookup(SampleKey::PositiveControl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureSet, WellFeatures};
    use crate::groups::summarize;
    use crate::plate::WellId;

    fn group(name: &str, peaks: &[(&str, f64)]) -> Group {
        let mut set = FeatureSet::default();
        let mut members = Vec::new();
        for (well, peak) in peaks {
            let id: WellId = well.parse().unwrap();
            set.wells.insert(
                id,
                WellFeatures {
                    peak_height: Some(*peak),
                    ..WellFeatures::empty(id)
                },
            );
            members.push(id);
        }
        summarize(name, members, &set)
    }

    #[test]
    fn self_ratio_is_exactly_hundred() {
        let g = group("s1", &[("A1", 0.8), ("B1", 1.3), ("C1", 0.95)]);
        let v = ionomycin_normalized("s1", SampleGroups { atp: &g, ionomycin: &g }).unwrap();
        assert_eq!(v, 100.0);
    }

    #[test]
    fn missing_ionomycin_is_null_not_zero() {
        let atp = group("atp", &[("A1", 0.5)]);
        let iono = Group::empty("iono");
        let err = ionomycin_normalized("s1", SampleGroups { atp: &atp, ionomycin: &iono });
        assert!(matches!(err, Err(DataIssue::MissingReference { reference: "ionomycin", .. })));
    }

    #[test]
    fn positive_control_double_ratio() {
        let atp = group("atp", &[("A1", 0.5)]);
        let iono = group("iono", &[("E1", 2.0)]);
        let pc_atp = group("pc atp", &[("A12", 1.0)]);
        let pc_iono = group("pc iono", &[("E12", 2.0)]);
        let mut samples = BTreeMap::new();
        samples.insert("s1".to_string(), SampleGroups { atp: &atp, ionomycin: &iono });
        let out = normalize(&samples, SampleGroups { atp: &pc_atp, ionomycin: &pc_iono });
        let s1 = &out.samples["s1"];
        assert_eq!(s1.ionomycin_normalized, Some(25.0));
        assert_eq!(out.positive_control.ionomycin_normalized, Some(50.0));
        // 25 / 50, not ATP(0.5) / PC ATP(1.0)
        assert_eq!(s1.pc_normalized, Some(50.0));
    }

    #[test]
    fn empty_positive_control_nulls_every_sample() {
        let atp = group("atp", &[("A1", 0.5)]);
        let iono = group("iono", &[("E1", 2.0)]);
        let empty = Group::empty("pc");
        let mut samples = BTreeMap::new();
        samples.insert("s1".to_string(), SampleGroups { atp: &atp, ionomycin: &iono });
        samples.insert("s2".to_string(), SampleGroups { atp: &atp, ionomycin: &iono });
        let out = normalize(&samples, SampleGroups { atp: &empty, ionomycin: &empty });
        for result in out.samples.values() {
            assert_eq!(result.pc_normalized, None);
            assert!(result.message.as_ref().unwrap().contains("positive-control"));
        }
    }
}
