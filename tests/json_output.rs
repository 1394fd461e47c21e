use kira_fliprqc::analyze;
use kira_fliprqc::config::RunConfig;
use kira_fliprqc::io::json_writer::{build_report, write_json};
use kira_fliprqc::plate::{WellDataStore, WellId};
use kira_fliprqc::schema::v1::FliprQcV1;
use tempfile::TempDir;

fn plate() -> WellDataStore {
    let mut store = WellDataStore::new(1.0);
    for (column, atp) in [(1u8, 0.1), (12, 0.4)] {
        for row in 0..8u8 {
            let peak = match row {
                0..=3 => atp,
                4..=5 => 1.0,
                _ => 0.0,
            };
            let mut raw = vec![1000.0; 60];
            raw[33] = 1000.0 * (1.0 + peak);
            store.insert_raw(WellId::new(row, column).unwrap(), raw).unwrap();
        }
    }
    store
}

fn config() -> RunConfig {
    let mut cfg = RunConfig::default();
    cfg.diagnosis.sample_columns = vec![1];
    cfg.diagnosis.positive_control_columns = vec![12];
    cfg
}

#[test]
fn report_covers_every_stage() {
    let ctx = analyze(plate(), config()).unwrap();
    let report = build_report(&ctx).unwrap();

    assert_eq!(report.wells.len(), 16);
    assert_eq!(report.wells[0].well, "A1");
    assert!((report.wells[0].peak_height.unwrap() - 0.1).abs() < 1e-9);
    let params = report.parameters.as_ref().unwrap();
    assert_eq!(params.baseline_frame_count, 15);
    assert_eq!(params.threshold_type, "ionomycin");

    assert!(report.diagnostic_groups.iter().any(|g| g.status == "ok"));
    assert_eq!(report.qc.results.len(), ctx.qc_results.len());
    assert!(report.qc.passed);
    assert_eq!(report.diagnosis.len(), 1);
    assert_eq!(report.diagnosis[0].sample_id, "column 1");
    assert_eq!(report.diagnosis[0].status, "POSITIVE");
    let pc = report.normalization.positive_control.as_ref().unwrap();
    assert!((pc.ionomycin_normalized.unwrap() - 40.0).abs() < 1e-9);
}

#[test]
fn write_json_roundtrips_through_schema() {
    let ctx = analyze(plate(), config()).unwrap();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fliprqc.json");
    // The output stage leaves the finished report on the context.
    let report = &ctx.report;
    assert_eq!(report.wells.len(), 16);
    write_json(&path, report).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let decoded: FliprQcV1 = serde_json::from_str(&text).unwrap();
    assert_eq!(decoded.tool, "kira-fliprqc");
    assert_eq!(decoded.wells.len(), report.wells.len());
    assert_eq!(decoded.diagnosis.len(), 1);
    assert!(text.contains("\"replicate_cv\""));
}

#[test]
fn schema_roundtrip_v1() {
    let report = FliprQcV1::empty("0.0.0-test");
    let json = serde_json::to_string(&report).unwrap();
    let decoded: FliprQcV1 = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded.tool, "kira-fliprqc");
    assert_eq!(decoded.schema_version, "v1");
    assert!(decoded.parameters.is_none());
    assert!(decoded.qc.passed);
}
