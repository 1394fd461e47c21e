//! Plate model: well coordinates, label records and the raw trace store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

pub const ROWS: u8 = 8;
pub const COLUMNS: u8 = 12;
pub const ROW_LETTERS: [char; 8] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];

/// 96-well coordinate. Row 0 is `A`, column is 1-based. Orders row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WellId {
    row: u8,
    column: u8,
}

impl WellId {
    pub fn new(row: u8, column: u8) -> Result<Self> {
        if row >= ROWS {
            bail!("row index {} out of range (0-7)", row);
        }
        if column == 0 || column > COLUMNS {
            bail!("column {} out of range (1-12)", column);
        }
        Ok(Self { row, column })
    }

    pub fn row(&self) -> u8 {
        self.row
    }

    pub fn column(&self) -> u8 {
        self.column
    }

    pub fn row_letter(&self) -> char {
        ROW_LETTERS[self.row as usize]
    }

    /// Plate position 0..96 in row-major order.
    pub fn index(&self) -> usize {
        self.row as usize * COLUMNS as usize + (self.column as usize - 1)
    }

    pub fn all() -> impl Iterator<Item = WellId> {
        (0..ROWS).flat_map(|row| (1..=COLUMNS).map(move |column| WellId { row, column }))
    }
}

impl fmt::Display for WellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row_letter(), self.column)
    }
}

impl FromStr for WellId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = match chars.next() {
            Some(c) => c.to_ascii_uppercase(),
            None => bail!("empty well id"),
        };
        let row = match ROW_LETTERS.iter().position(|&c| c == letter) {
            Some(r) => r as u8,
            None => bail!("invalid well row in '{}'", s),
        };
        let column: u8 = chars
            .as_str()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid well column in '{}'", s))?;
        WellId::new(row, column)
    }
}

impl Serialize for WellId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WellId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WellType {
    #[serde(rename = "ATP", alias = "atp")]
    Atp,
    #[serde(rename = "Ionomycin", alias = "ionomycin")]
    Ionomycin,
    #[serde(rename = "Buffer", alias = "buffer")]
    Buffer,
    #[serde(rename = "unlabeled")]
    Unlabeled,
}

impl WellType {
    /// Infers the well type from a free-text agonist label.
    pub fn infer(agonist: &str) -> Self {
        let a = agonist.trim().to_ascii_lowercase();
        if a == "atp" || a.starts_with("atp ") {
            WellType::Atp
        } else if a.starts_with("iono") {
            WellType::Ionomycin
        } else if a == "buffer" || a.starts_with("buffer ") {
            WellType::Buffer
        } else {
            WellType::Unlabeled
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WellType::Atp => "ATP",
            WellType::Ionomycin => "Ionomycin",
            WellType::Buffer => "Buffer",
            WellType::Unlabeled => "unlabeled",
        }
    }
}

impl fmt::Display for WellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellLabel {
    pub agonist: String,
    pub concentration: String,
    pub sample_id: String,
    pub well_type: WellType,
    pub color: Option<String>,
}

impl WellLabel {
    pub fn new(agonist: &str, sample_id: &str) -> Self {
        Self {
            agonist: agonist.to_string(),
            concentration: String::new(),
            sample_id: sample_id.to_string(),
            well_type: WellType::infer(agonist),
            color: None,
        }
    }

    pub fn with_type(mut self, well_type: WellType) -> Self {
        self.well_type = well_type;
        self
    }

    pub fn with_concentration(mut self, concentration: &str) -> Self {
        self.concentration = concentration.to_string();
        self
    }
}

#[derive(Debug, Clone)]
pub struct Well {
    pub id: WellId,
    pub raw: Vec<f64>,
    pub label: Option<WellLabel>,
}

/// Raw traces and labels for one plate. Lookup only.
#[derive(Debug, Clone)]
pub struct WellDataStore {
    wells: BTreeMap<WellId, Well>,
    frame_interval: f64,
    frame_count: usize,
    pub source: Option<String>,
}

impl WellDataStore {
    pub fn new(frame_interval: f64) -> Self {
        Self {
            wells: BTreeMap::new(),
            frame_interval,
            frame_count: 0,
            source: None,
        }
    }

    /// Adds a raw trace. Every trace on a plate must have the same length.
    pub fn insert_raw(&mut self, id: WellId, raw: Vec<f64>) -> Result<()> {
        if self.wells.is_empty() {
            self.frame_count = raw.len();
        } else if raw.len() != self.frame_count {
            bail!(
                "well {} has {} frames, plate has {}",
                id,
                raw.len(),
                self.frame_count
            );
        }
        let label = self.wells.remove(&id).and_then(|w| w.label);
        self.wells.insert(id, Well { id, raw, label });
        Ok(())
    }

    pub fn set_label(&mut self, id: WellId, label: Option<WellLabel>) -> Result<()> {
        match self.wells.get_mut(&id) {
            Some(well) => {
                well.label = label;
                Ok(())
            }
            None => bail!("no raw data loaded for well {}", id),
        }
    }

    pub fn get(&self, id: &WellId) -> Option<&Well> {
        self.wells.get(id)
    }

    pub fn raw(&self, id: &WellId) -> Option<&[f64]> {
        self.wells.get(id).map(|w| w.raw.as_slice())
    }

    pub fn label(&self, id: &WellId) -> Option<&WellLabel> {
        self.wells.get(id).and_then(|w| w.label.as_ref())
    }

    pub fn wells(&self) -> impl Iterator<Item = &Well> {
        self.wells.values()
    }

    pub fn len(&self) -> usize {
        self.wells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wells.is_empty()
    }

    pub fn frame_interval(&self) -> f64 {
        self.frame_interval
    }

    pub fn set_frame_interval(&mut self, interval: f64) {
        self.frame_interval = interval;
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn labeled_count(&self) -> usize {
        self.wells.values().filter(|w| w.label.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_id_parse_and_display() {
        let w: WellId = "b07".parse().unwrap();
        assert_eq!(w.to_string(), "B7");
        assert_eq!(w.row(), 1);
        assert_eq!(w.column(), 7);
        assert_eq!(w.index(), 18);
        assert!("I1".parse::<WellId>().is_err());
        assert!("A13".parse::<WellId>().is_err());
        assert!("A0".parse::<WellId>().is_err());
    }

    #[test]
    fn well_ids_cover_plate() {
        let all: Vec<WellId> = WellId::all().collect();
        assert_eq!(all.len(), 96);
        assert_eq!(all[0].to_string(), "A1");
        assert_eq!(all[95].to_string(), "H12");
    }

    #[test]
    fn well_type_inference() {
        assert_eq!(WellType::infer("ATP"), WellType::Atp);
        assert_eq!(WellType::infer("Ionomycin"), WellType::Ionomycin);
        assert_eq!(WellType::infer("iono"), WellType::Ionomycin);
        assert_eq!(WellType::infer(" Buffer "), WellType::Buffer);
        assert_eq!(WellType::infer("carbachol"), WellType::Unlabeled);
    }

    #[test]
    fn store_rejects_ragged_traces() {
        let mut store = WellDataStore::new(1.0);
        store.insert_raw("A1".parse().unwrap(), vec![1.0; 5]).unwrap();
        assert!(store.insert_raw("A2".parse().unwrap(), vec![1.0; 4]).is_err());
        assert_eq!(store.frame_count(), 5);
    }

    #[test]
    fn label_survives_raw_reload() {
        let mut store = WellDataStore::new(1.0);
        let id: WellId = "C3".parse().unwrap();
        store.insert_raw(id, vec![1.0; 3]).unwrap();
        store.set_label(id, Some(WellLabel::new("ATP", "s1"))).unwrap();
        store.insert_raw(id, vec![2.0; 3]).unwrap();
        assert_eq!(store.label(&id).unwrap().sample_id, "s1");
    }
}
