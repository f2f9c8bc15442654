//! Wide per-parameter table feeding the dimensionality-reduction step.

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::clean::CleanRecord;

// ---

/// Parameters kept as columns of the wide table, in column order.
pub const PARAMETERS: [&str; 6] = ["pm25", "pm10", "no2", "o3", "temperature", "relativehumidity"];

#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    // ---
    pub datetime_utc: DateTime<Utc>,
    pub location_id: i64,
    pub timezone: Option<String>,
    /// One slot per entry of [`PARAMETERS`].
    pub values: [Option<f64>; PARAMETERS.len()],
}

type Key = (DateTime<Utc>, i64, Option<String>);

/// Pivot long rows into one row per `(datetime_utc, location_id, timezone)`.
///
/// The first value seen for a key and parameter wins. Parameters outside
/// [`PARAMETERS`] are ignored. Rows come back sorted by key.
pub fn pivot(rows: &[CleanRecord]) -> Vec<WideRow> {
    // ---
    let mut table: BTreeMap<Key, [Option<f64>; PARAMETERS.len()]> = BTreeMap::new();

    for row in rows {
        let Some(slot) = PARAMETERS.iter().position(|p| *p == row.parameter) else {
            continue;
        };
        let values = table
            .entry((row.datetime_utc, row.location_id, row.timezone.clone()))
            .or_default();
        values[slot].get_or_insert(row.value);
    }

    table
        .into_iter()
        .map(|((datetime_utc, location_id, timezone), values)| WideRow {
            datetime_utc,
            location_id,
            timezone,
            values,
        })
        .collect()
}

/// Write the wide table as CSV; absent values are empty cells.
pub fn write_wide(path: &Path, rows: &[WideRow]) -> Result<()> {
    // ---
    let mut csv = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec!["datetime_utc", "location_id", "timezone"];
    header.extend(PARAMETERS);
    csv.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.datetime_utc.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            row.location_id.to_string(),
            row.timezone.clone().unwrap_or_default(),
        ];
        record.extend(row.values.iter().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn clean(location_id: i64, hour: u32, parameter: &str, value: f64) -> CleanRecord {
        // ---
        CleanRecord {
            location_id,
            location_name: None,
            parameter: parameter.to_string(),
            value,
            unit: None,
            datetime_utc: Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap(),
            timezone: Some("+00:00".into()),
            latitude: None,
            longitude: None,
        }
    }

    #[test]
    fn test_pivot_groups_by_key_and_keeps_first_value() {
        // ---
        let rows = vec![
            clean(2, 0, "pm25", 10.0),
            clean(1, 0, "no2", 20.0),
            clean(1, 0, "pm25", 30.0),
            clean(1, 0, "pm25", 99.0),
            clean(1, 1, "temperature", 4.5),
            clean(1, 1, "co", 0.3),
        ];

        let wide = pivot(&rows);

        assert_eq!(wide.len(), 3);
        assert_eq!(wide[0].location_id, 1);
        assert_eq!(wide[0].values, [Some(30.0), None, Some(20.0), None, None, None]);
        assert_eq!(wide[1].location_id, 2);
        assert_eq!(wide[1].values[0], Some(10.0));
        assert_eq!(wide[2].values[4], Some(4.5));
    }

    #[test]
    fn test_write_wide_layout() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.csv");

        write_wide(&path, &pivot(&[clean(1, 3, "o3", 0.04)])).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "datetime_utc,location_id,timezone,pm25,pm10,no2,o3,temperature,relativehumidity"
        );
        assert_eq!(lines[1], "2025-01-01T03:00:00Z,1,+00:00,,,,0.04,,");
    }
}
