//! FLIPR tab-separated export reader.
//!
//! Header: column 0 is the source file name, columns 5.. are time points.
//! Data rows: column 4 is the well id, columns 5.. are intensities. Values
//! that do not parse become NaN; rows are truncated or NaN-padded to the
//! header's time-point count.

use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::io::open_maybe_gz;
use crate::plate::{WellDataStore, WellId};

const WELL_COLUMN: usize = 4;
const FIRST_VALUE_COLUMN: usize = 5;
const DEFAULT_FRAME_INTERVAL: f64 = 1.0;

#[derive(Debug)]
pub struct PlateRead {
    pub store: WellDataStore,
    pub time_points: Vec<f64>,
    pub warnings: Vec<String>,
}

pub fn read_plate_file(path: &Path) -> Result<PlateRead> {
    let reader = open_maybe_gz(path)
        .with_context(|| format!("failed to open plate file {}", path.display()))?;
    let plate = read_plate(BufReader::new(reader))
        .with_context(|| format!("failed to parse plate file {}", path.display()))?;
    info!(
        path = %path.display(),
        wells = plate.store.len(),
        frames = plate.store.frame_count(),
        frame_interval = plate.store.frame_interval(),
        "plate_loaded"
    );
    Ok(plate)
}

pub fn read_plate<R: BufRead>(reader: R) -> Result<PlateRead> {
    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(line) => line?,
        None => bail!("plate file is empty"),
    };
    let header: Vec<&str> = header.trim_end_matches(['\r', '\n']).split('\t').collect();
    if header.len() <= FIRST_VALUE_COLUMN {
        bail!(
            "header has {} columns; time points start at column {}",
            header.len(),
            FIRST_VALUE_COLUMN + 1
        );
    }
    let source = header[0].trim().to_string();
    let time_points: Vec<f64> = header[FIRST_VALUE_COLUMN..]
        .iter()
        .map(|t| parse_value(t))
        .collect();
    let frame_count = time_points.len();
    let frame_interval = frame_interval_from(&time_points).unwrap_or(DEFAULT_FRAME_INTERVAL);

    let mut store = WellDataStore::new(frame_interval);
    if !source.is_empty() {
        store.source = Some(source);
    }
    let mut warnings = Vec::new();

    for (line_no, line) in lines.enumerate() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() <= WELL_COLUMN {
            continue;
        }
        let row = line_no + 2;
        let id: WellId = match fields[WELL_COLUMN].trim().parse() {
            Ok(id) => id,
            Err(_) => {
                warn!(row, well = fields[WELL_COLUMN], "unparsable well id; row skipped");
                warnings.push(format!(
                    "row {}: unparsable well id '{}' skipped",
                    row, fields[WELL_COLUMN]
                ));
                continue;
            }
        };
        if store.get(&id).is_some() {
            // First occurrence wins.
            warnings.push(format!("row {}: duplicate well {} ignored", row, id));
            continue;
        }
        let mut values: Vec<f64> = fields
            .iter()
            .skip(FIRST_VALUE_COLUMN)
            .take(frame_count)
            .map(|v| parse_value(v))
            .collect();
        if values.len() < frame_count {
            warnings.push(format!(
                "well {}: {} of {} frames present, padded with NaN",
                id,
                values.len(),
                frame_count
            ));
            values.resize(frame_count, f64::NAN);
        }
        store.insert_raw(id, values)?;
    }

    if store.is_empty() {
        bail!("no well rows found");
    }
    Ok(PlateRead {
        store,
        time_points,
        warnings,
    })
}

fn parse_value(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Mean spacing of the header time points, if they are numeric and
/// increasing.
pub fn frame_interval_from(time_points: &[f64]) -> Option<f64> {
    if time_points.len() < 2 || time_points.iter().any(|t| !t.is_finite()) {
        return None;
    }
    let first = time_points[0];
    let last = time_points[time_points.len() - 1];
    let interval = (last - first) / (time_points.len() - 1) as f64;
    if interval > 0.0 { Some(interval) } else { None }
}
