use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::ctx::Ctx;
use crate::diagnosis::failed_tests;
use crate::features::Feature;
use crate::groups::{DiagKey, Group, GroupStatus};
use crate::normalize::NormalizedResult;
use crate::schema::v1::{
    DiagnosisRecord, FeatureStats, FliprQcV1, GroupRecord, InputMeta, MeasuredValue,
    NormalizedRecord, Normalization, Parameters, QcRecord, QcSummary, WellRecord,
};

pub fn build_report(ctx: &Ctx) -> Result<FliprQcV1> {
    let store = ctx.store()?;
    let features = ctx.features()?;
    let normalized = ctx.normalized()?;
    let cfg = &ctx.config;

    let input_meta = InputMeta {
        source_file: store.source.clone(),
        data_path: ctx.data_path.as_ref().map(|p| p.display().to_string()),
        layout_path: ctx.layout_path.as_ref().map(|p| p.display().to_string()),
        wells: store.len() as u64,
        labeled_wells: store.labeled_count() as u64,
        frames: store.frame_count() as u64,
        frame_interval: store.frame_interval(),
    };

    let parameters = Parameters {
        artifact_start_frame: cfg.analysis.artifact_start_frame as u64,
        artifact_end_frame: cfg.analysis.artifact_end_frame as u64,
        baseline_frame_count: cfg.analysis.baseline_frame_count as u64,
        peak_start_frame: cfg.analysis.peak_start_frame as u64,
        remove_artifact: cfg.remove_artifact,
        auc_window: cfg.features.auc_window.as_str().to_string(),
        threshold_type: cfg.diagnosis.threshold_type.as_str().to_string(),
        threshold_value: cfg.diagnosis.threshold_value,
    };

    let failures = ctx.traces.as_ref().map(|t| &t.failures);
    let wells = store
        .wells()
        .map(|well| {
            let f = features.get(&well.id).context("well features missing")?;
            let label = well.label.as_ref();
            Ok(WellRecord {
                well: well.id.to_string(),
                agonist: label.map(|l| l.agonist.clone()),
                concentration: label.map(|l| l.concentration.clone()),
                sample_id: label.map(|l| l.sample_id.clone()),
                well_type: label.map(|l| l.well_type.as_str().to_string()),
                issue: failures
                    .and_then(|m| m.get(&well.id))
                    .map(|issue| issue.to_string()),
                f0: f.value(Feature::F0),
                baseline_sd: f.value(Feature::BaselineSd),
                peak_height: f.value(Feature::PeakHeight),
                time_to_peak: f.value(Feature::TimeToPeak),
                auc: f.value(Feature::Auc),
                fwhm: f.value(Feature::Fwhm),
                baseline_deviation: f.value(Feature::BaselineDeviation),
                end_deviation: f.value(Feature::EndDeviation),
                artifact_change: f.value(Feature::ArtifactChange),
                artifact_recovery_frames: f.artifact_recovery_frames.map(|n| n as u64),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let label_groups = ctx
        .label_groups
        .values()
        .map(|g| group_record(g, None))
        .collect();
    let diagnostic_groups = ctx
        .diagnostic_groups
        .iter()
        .map(|(key, g)| group_record(g, Some(key)))
        .collect();

    let normalization = Normalization {
        samples: normalized.samples.values().map(normalized_record).collect(),
        positive_control: Some(normalized_record(&normalized.positive_control)),
    };

    let failed = failed_tests(&ctx.qc_results);
    let qc = QcSummary {
        passed: failed.is_empty(),
        failed_tests: failed,
        results: ctx
            .qc_results
            .iter()
            .map(|r| QcRecord {
                test_name: r.test_name.clone(),
                category: r.category.to_string(),
                passed: r.passed,
                message: r.message.clone(),
                measured: r
                    .measured
                    .iter()
                    .map(|m| MeasuredValue {
                        label: m.label.clone(),
                        value: m.value,
                    })
                    .collect(),
            })
            .collect(),
    };

    let diagnosis = ctx
        .verdicts
        .values()
        .map(|v| DiagnosisRecord {
            sample_id: v.sample_id.clone(),
            status: v.status.to_string(),
            normalized_value: v.normalized_value,
            threshold_type: v.threshold_type.as_str().to_string(),
            threshold_used: v.threshold_used,
            failed_tests: v.failed_tests.clone(),
            message: v.message.clone(),
        })
        .collect();

    Ok(FliprQcV1 {
        tool: "kira-fliprqc".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: "v1".to_string(),
        input_meta,
        parameters: Some(parameters),
        wells,
        label_groups,
        diagnostic_groups,
        normalization,
        qc,
        diagnosis,
        warnings: ctx.warnings.clone(),
    })
}

fn group_record(group: &Group, key: Option<&DiagKey>) -> GroupRecord {
    let status = match group.status {
        GroupStatus::Ok => "ok",
        GroupStatus::NoData => "no_data",
        GroupStatus::NoValidValues => "no_valid_values",
    };
    let features: BTreeMap<String, FeatureStats> = group
        .summaries
        .iter()
        .map(|(feature, s)| {
            (
                feature.as_str().to_string(),
                FeatureStats {
                    n: s.n as u64,
                    mean: s.mean,
                    sd: s.sd,
                    sem: s.sem,
                    cv: s.cv,
                },
            )
        })
        .collect();
    GroupRecord {
        key: group.name.clone(),
        sample: key.map(|k| k.sample.to_string()),
        well_type: key.map(|k| k.well_type.as_str().to_string()),
        status: status.to_string(),
        members: group.members.iter().map(|id| id.to_string()).collect(),
        features,
    }
}

fn normalized_record(r: &NormalizedResult) -> NormalizedRecord {
    NormalizedRecord {
        sample_id: r.sample_id.clone(),
        atp_peak_mean: r.atp_peak_mean,
        ionomycin_peak_mean: r.ionomycin_peak_mean,
        ionomycin_normalized: r.ionomycin_normalized,
        pc_normalized: r.pc_normalized,
        message: r.message.clone(),
    }
}

pub fn write_json(path: &Path, report: &FliprQcV1) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}
