//! Plate layout JSON: a list of `{well_id, label, concentration, sample_id,
//! color}` records, with an optional explicit `well_type`.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::io::open_maybe_gz;
use crate::plate::{WellDataStore, WellId, WellLabel, WellType};

#[derive(Debug, Clone, Deserialize)]
pub struct LayoutRecord {
    pub well_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub concentration: String,
    #[serde(default)]
    pub sample_id: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub well_type: Option<WellType>,
}

impl LayoutRecord {
    /// `None` when the record carries no label text at all.
    pub fn to_label(&self) -> Option<WellLabel> {
        let blank = |s: &str| s.trim().is_empty();
        if blank(&self.label)
            && blank(&self.concentration)
            && blank(&self.sample_id)
            && self.well_type.is_none()
        {
            return None;
        }
        let well_type = self
            .well_type
            .unwrap_or_else(|| WellType::infer(&self.label));
        Some(WellLabel {
            agonist: self.label.trim().to_string(),
            concentration: self.concentration.trim().to_string(),
            sample_id: self.sample_id.trim().to_string(),
            well_type,
            color: self.color.clone(),
        })
    }
}

#[derive(Debug, Default)]
pub struct Layout {
    pub labels: Vec<(WellId, Option<WellLabel>)>,
    pub warnings: Vec<String>,
}

pub fn parse_layout(content: &str) -> Result<Layout> {
    let records: Vec<LayoutRecord> =
        serde_json::from_str(content).context("layout must be a JSON list of well records")?;
    let mut layout = Layout::default();
    for record in records {
        match record.well_id.trim().parse::<WellId>() {
            Ok(id) => layout.labels.push((id, record.to_label())),
            Err(_) => layout
                .warnings
                .push(format!("layout: unknown well id '{}' skipped", record.well_id)),
        }
    }
    Ok(layout)
}

pub fn read_layout_file(path: &Path) -> Result<Layout> {
    let mut content = String::new();
    open_maybe_gz(path)
        .with_context(|| format!("failed to open layout {}", path.display()))?
        .read_to_string(&mut content)
        .with_context(|| format!("failed to read layout {}", path.display()))?;
    let layout =
        parse_layout(&content).with_context(|| format!("invalid layout {}", path.display()))?;
    info!(
        path = %path.display(),
        labeled = layout.labels.iter().filter(|(_, l)| l.is_some()).count(),
        "layout_loaded"
    );
    Ok(layout)
}

/// Copies labels onto the store. Labels for wells without data are reported,
/// not fatal.
pub fn apply_layout(store: &mut WellDataStore, layout: &Layout) -> Vec<String> {
    let mut warnings = layout.warnings.clone();
    for (id, label) in &layout.labels {
        if let Err(err) = store.set_label(*id, label.clone()) {
            if label.is_some() {
                warnings.push(format!("layout: {}", err));
            }
        }
    }
    warnings
}
