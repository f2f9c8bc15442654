//! Cleaning step: load the harvested table and keep the usable rows.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::NormalizedRecord;

// ---

/// Harvested row reduced to the columns the downstream stages project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanRecord {
    // ---
    pub location_id: i64,
    pub location_name: Option<String>,
    pub parameter: String,
    pub value: f64,
    pub unit: Option<String>,
    pub datetime_utc: DateTime<Utc>,
    /// UTC offset of the local timestamp, e.g. `+05:30`.
    pub timezone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Read every row of the harvested table.
pub fn read_table(path: &Path) -> Result<Vec<NormalizedRecord>> {
    // ---
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening harvested table {}", path.display()))?;
    reader
        .deserialize::<NormalizedRecord>()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("{}: bad row {}", path.display(), i + 1)))
        .collect()
}

/// Drop rows with a missing or negative value, or without a parameter or a
/// parseable UTC timestamp.
pub fn clean(rows: Vec<NormalizedRecord>) -> Vec<CleanRecord> {
    // ---
    let before = rows.len();
    let cleaned: Vec<CleanRecord> = rows
        .into_iter()
        .filter_map(|row| {
            let value = row.value.filter(|v| *v >= 0.0)?;
            let parameter = row.parameter?;
            let datetime_utc = row.datetime_utc.as_deref().and_then(parse_utc)?;
            Some(CleanRecord {
                location_id: row.location_id,
                location_name: row.location_name,
                parameter,
                value,
                unit: row.unit,
                datetime_utc,
                timezone: row.datetime_local.as_deref().and_then(utc_offset),
                latitude: row.latitude,
                longitude: row.longitude,
            })
        })
        .collect();

    debug!(before, after = cleaned.len(), "cleaned harvested rows");
    cleaned
}

/// Write the cleaned subset as CSV, one row per record.
pub fn write_clean(path: &Path, rows: &[CleanRecord]) -> Result<()> {
    // ---
    let mut csv = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

fn parse_utc(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn utc_offset(local: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(local)
        .ok()
        .map(|dt| dt.offset().to_string())
}
