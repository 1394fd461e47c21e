//! Per-sample verdicts from normalized responses and plate-level QC.
//!
//! Any failed QC test invalidates every sample on the plate: the gate is
//! plate-wide, not per-sample.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::config::{DiagnosisConfig, ThresholdType};
use crate::normalize::{NormalizedResult, NormalizedSet};
use crate::qc::QcTestResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Positive,
    Negative,
    Invalid,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Positive => "POSITIVE",
            Verdict::Negative => "NEGATIVE",
            Verdict::Invalid => "INVALID",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosisVerdict {
    pub sample_id: String,
    pub status: Verdict,
    pub normalized_value: Option<f64>,
    pub threshold_type: ThresholdType,
    pub threshold_used: f64,
    pub failed_tests: Vec<String>,
    pub message: String,
}

/// Names of the failed QC tests, in evaluation order.
pub fn failed_tests(qc: &[QcTestResult]) -> Vec<String> {
    qc.iter()
        .filter(|r| !r.passed)
        .map(|r| r.test_name.clone())
        .collect()
}

fn selected_value(result: &NormalizedResult, threshold_type: ThresholdType) -> Option<f64> {
    match threshold_type {
        ThresholdType::Ionomycin => result.ionomycin_normalized,
        ThresholdType::PositiveControl => result.pc_normalized,
    }
}

pub fn diagnose_sample(
    result: &NormalizedResult,
    failed: &[String],
    cfg: &DiagnosisConfig,
) -> DiagnosisVerdict {
    let threshold = cfg.threshold_value;
    let value = selected_value(result, cfg.threshold_type);
    let (status, message) = if !failed.is_empty() {
        let mut message = format!("plate QC failed: {}", failed.join(", "));
        // A missing value keeps its own reason next to the gate.
        if let (None, Some(reason)) = (value, &result.message) {
            message.push_str("; ");
            message.push_str(reason);
        }
        (Verdict::Invalid, message)
    } else {
        match value {
            None => (
                Verdict::Invalid,
                result
                    .message
                    .clone()
                    .unwrap_or_else(|| "normalized value unavailable".to_string()),
            ),
            Some(v) if v <= threshold => (
                Verdict::Positive,
                format!("{:.2}% <= threshold {}%", v, threshold),
            ),
            Some(v) => (
                Verdict::Negative,
                format!("{:.2}% > threshold {}%", v, threshold),
            ),
        }
    };
    DiagnosisVerdict {
        sample_id: result.sample_id.clone(),
        status,
        normalized_value: value,
        threshold_type: cfg.threshold_type,
        threshold_used: threshold,
        failed_tests: failed.to_vec(),
        message,
    }
}

/// One verdict per test sample. The QC gate is applied first, then data
/// availability, then the inclusive threshold.
pub fn diagnose(
    qc: &[QcTestResult],
    normalized: &NormalizedSet,
    cfg: &DiagnosisConfig,
) -> BTreeMap<String, DiagnosisVerdict> {
    let failed = failed_tests(qc);
    normalized
        .samples
        .iter()
        .map(|(id, result)| (id.clone(), diagnose_sample(result, &failed, cfg)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qc::QcCategory;

    fn result(iono: Option<f64>, pc: Option<f64>) -> NormalizedResult {
        NormalizedResult {
            sample_id: "s1".into(),
            atp_peak_mean: Some(1.0),
            ionomycin_peak_mean: Some(1.0),
            ionomycin_normalized: iono,
            pc_normalized: pc,
            message: None,
        }
    }

    fn set(r: NormalizedResult) -> NormalizedSet {
        let mut samples = BTreeMap::new();
        samples.insert(r.sample_id.clone(), r);
        NormalizedSet {
            samples,
            positive_control: result(None, None),
        }
    }

    fn qc(name: &str, passed: bool) -> QcTestResult {
        QcTestResult {
            test_name: name.into(),
            category: QcCategory::Replicates,
            passed,
            message: String::new(),
            measured: Vec::new(),
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let cfg = DiagnosisConfig::default();
        let at = diagnose(&[qc("replicate_cv", true)], &set(result(Some(20.0), None)), &cfg);
        assert_eq!(at["s1"].status, Verdict::Positive);
        let above = diagnose(&[], &set(result(Some(20.01), None)), &cfg);
        assert_eq!(above["s1"].status, Verdict::Negative);
    }

    #[test]
    fn any_failed_test_invalidates_every_sample() {
        let cfg = DiagnosisConfig::default();
        let mut normalized = set(result(Some(5.0), None));
        normalized
            .samples
            .insert("s2".into(), NormalizedResult { sample_id: "s2".into(), ..result(Some(90.0), None) });
        let out = diagnose(
            &[qc("dff_baseline", true), qc("replicate_cv", false)],
            &normalized,
            &cfg,
        );
        for v in out.values() {
            assert_eq!(v.status, Verdict::Invalid);
            assert_eq!(v.failed_tests, vec!["replicate_cv".to_string()]);
        }
    }

    #[test]
    fn failed_gate_keeps_missing_value_reason() {
        let cfg = DiagnosisConfig {
            threshold_type: ThresholdType::PositiveControl,
            ..DiagnosisConfig::default()
        };
        let mut r = result(Some(5.0), None);
        r.message = Some("missing positive-control data for sample 's1'".into());
        let out = diagnose(&[qc("ionomycin_response", false)], &set(r), &cfg);
        let v = &out["s1"];
        assert_eq!(v.status, Verdict::Invalid);
        assert!(v.message.starts_with("plate QC failed: ionomycin_response"));
        assert!(v.message.contains("positive-control"));

        let ok = diagnose(&[qc("replicate_cv", false)], &set(result(Some(5.0), None)), &DiagnosisConfig::default());
        assert_eq!(ok["s1"].message, "plate QC failed: replicate_cv");
    }

    #[test]
    fn missing_value_is_invalid() {
        let cfg = DiagnosisConfig {
            threshold_type: ThresholdType::PositiveControl,
            ..DiagnosisConfig::default()
        };
        let out = diagnose(&[], &set(result(Some(5.0), None)), &cfg);
        assert_eq!(out["s1"].status, Verdict::Invalid);
        assert_eq!(out["s1"].normalized_value, None);
        assert_eq!(out["s1"].threshold_type, ThresholdType::PositiveControl);
    }
}
