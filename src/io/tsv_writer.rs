use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::ctx::Ctx;
use crate::features::Feature;

const COLUMNS: [Feature; 9] = Feature::ALL;

/// One row per well: label columns, then every feature. Nulls are written
/// as `NA`.
pub fn write_tsv(path: &Path, ctx: &Ctx) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut w = BufWriter::new(file);

    let store = ctx.store()?;
    let features = ctx.features()?;

    let header: Vec<&str> = COLUMNS.iter().map(|f| f.as_str()).collect();
    writeln!(
        w,
        "well\tagonist\tconcentration\tsample_id\twell_type\t{}\tartifact_recovery_frames",
        header.join("\t")
    )?;
    for well in store.wells() {
        let f = features.get(&well.id).context("well features missing")?;
        let (agonist, concentration, sample_id, well_type) = match &well.label {
            Some(l) => (
                l.agonist.as_str(),
                l.concentration.as_str(),
                l.sample_id.as_str(),
                l.well_type.as_str(),
            ),
            None => ("", "", "", ""),
        };
        let values: Vec<String> = COLUMNS.iter().map(|c| fmt_value(f.value(*c))).collect();
        let recovery = f
            .artifact_recovery_frames
            .map(|n| n.to_string())
            .unwrap_or_else(|| "NA".to_string());
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            well.id,
            agonist,
            concentration,
            sample_id,
            well_type,
            values.join("\t"),
            recovery
        )?;
    }
    w.flush()?;
    Ok(())
}

fn fmt_value(v: Option<f64>) -> String {
    match v {
        Some(x) => format!("{:.6}", x),
        None => "NA".to_string(),
    }
}
