//! Hourly PM2.5 violation rates per location.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use anyhow::{Context, Result};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use super::clean::CleanRecord;

// ---

pub const HEATMAP_PARAMETER: &str = "pm25";

/// Location × hour grid of violation rates in `[0, 1]`.
#[derive(Debug, Default, PartialEq)]
pub struct Heatmap {
    // ---
    /// Column labels, ascending.
    pub hours: Vec<DateTime<Utc>>,
    /// One row per location, ascending by id; `None` where the location has no
    /// reading in that hour.
    pub rows: Vec<(i64, Vec<Option<f64>>)>,
}

/// Bin PM2.5 readings per location and UTC hour and average the violation
/// flag (`value > threshold`) in each bin.
pub fn violation_rates(rows: &[CleanRecord], threshold: f64) -> Heatmap {
    // ---
    let mut bins: BTreeMap<(i64, DateTime<Utc>), (u32, u32)> = BTreeMap::new();

    for row in rows.iter().filter(|r| r.parameter == HEATMAP_PARAMETER) {
        let hour = row
            .datetime_utc
            .duration_trunc(TimeDelta::hours(1))
            .unwrap_or(row.datetime_utc);
        let (violations, total) = bins.entry((row.location_id, hour)).or_default();
        *total += 1;
        if row.value > threshold {
            *violations += 1;
        }
    }

    let hours: Vec<DateTime<Utc>> = bins
        .keys()
        .map(|(_, hour)| *hour)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let column: BTreeMap<DateTime<Utc>, usize> =
        hours.iter().enumerate().map(|(i, h)| (*h, i)).collect();

    let mut grid: BTreeMap<i64, Vec<Option<f64>>> = BTreeMap::new();
    for ((location_id, hour), (violations, total)) in bins {
        let cells = grid
            .entry(location_id)
            .or_insert_with(|| vec![None; hours.len()]);
        cells[column[&hour]] = Some(f64::from(violations) / f64::from(total));
    }

    Heatmap {
        hours,
        rows: grid.into_iter().collect(),
    }
}

/// Write the grid as CSV: `location_id`, then one column per hour.
pub fn write_heatmap(path: &Path, heatmap: &Heatmap) -> Result<()> {
    // ---
    let mut csv = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec!["location_id".to_string()];
    header.extend(heatmap.hours.iter().map(|h| h.format("%Y-%m-%dT%H:%M:%SZ").to_string()));
    csv.write_record(&header)?;

    for (location_id, cells) in &heatmap.rows {
        let mut record = vec![location_id.to_string()];
        record.extend(cells.iter().map(|c| c.map(|v| v.to_string()).unwrap_or_default()));
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}
