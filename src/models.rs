//! Data models for the OpenAQ harvest pipeline.
//!
//! The `Location`/`Sensor`/`Measurement` types mirror the JSON the OpenAQ v3
//! API returns. Every nested field is optional so that a sparse station record
//! degrades to empty cells instead of failing the run. `NormalizedRecord` is
//! the flat row written to the harvested table; its field order is the
//! table's column order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// Monitoring station as returned by `GET /locations`.
#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    // ---
    pub id: i64,
    pub name: Option<String>,
    pub locality: Option<String>,
    pub country: Option<Country>,
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub sensors: Vec<Sensor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Country {
    pub code: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Coordinates {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A single measurement stream hosted by a location.
#[derive(Debug, Clone, Deserialize)]
pub struct Sensor {
    // ---
    pub id: i64,
    pub name: Option<String>,
    pub parameter: Option<Parameter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub units: Option<String>,
}

/// Raw hourly measurement from `GET /sensors/{id}/measurements/hourly`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    // ---
    pub value: Option<f64>,
    pub period: Option<Period>,
    pub datetime_last: Option<Timestamp>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub datetime_from: Option<Timestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Timestamp {
    pub utc: Option<String>,
    pub local: Option<String>,
}

impl Measurement {
    /// Timestamp block identifying the hour this reading covers.
    ///
    /// Hourly aggregates carry it in `period.datetimeFrom`; `datetimeLast` is
    /// used when the period block is absent.
    pub fn timestamp(&self) -> Option<&Timestamp> {
        // ---
        self.period
            .as_ref()
            .and_then(|p| p.datetime_from.as_ref())
            .or(self.datetime_last.as_ref())
    }
}

/// Flattened Location + Sensor + Measurement row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    // ---
    pub location_id: i64,
    pub location_name: Option<String>,
    pub locality: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub sensor_id: i64,
    pub sensor_name: Option<String>,
    pub parameter: Option<String>,
    pub parameter_display: Option<String>,
    pub unit: Option<String>,
    pub value: Option<f64>,
    pub datetime_utc: Option<String>,
    pub datetime_local: Option<String>,
}

/// Header of the harvested table, in column order.
pub const TABLE_COLUMNS: [&str; 15] = [
    "location_id",
    "location_name",
    "locality",
    "country",
    "country_code",
    "latitude",
    "longitude",
    "sensor_id",
    "sensor_name",
    "parameter",
    "parameter_display",
    "unit",
    "value",
    "datetime_utc",
    "datetime_local",
];

/// Inclusive `[start, end]` range of UTC instants covering one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Query-string form used by the measurements endpoint.
    pub fn date_from(&self) -> String {
        self.start.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    pub fn date_to(&self) -> String {
        self.end.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.date_from(), self.date_to())
    }
}

/// Everything the paginated fetcher collected for one sensor.
#[derive(Debug, Default)]
pub struct SensorFetch {
    // ---
    pub records: Vec<Measurement>,

    /// Windows whose pagination stopped on a terminal failure. Their data is
    /// at best partial.
    pub failed_windows: Vec<TimeWindow>,
}

/// Counters accumulated over one harvest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    // ---
    pub locations_processed: usize,
    pub sensors_processed: usize,
    pub sensors_with_no_data: usize,
    pub total_measurements: usize,

    /// `(sensor_id, failed window count)` for sensors with incomplete data.
    pub incomplete_sensors: Vec<(i64, usize)>,
}

impl RunSummary {
    pub fn failed_windows(&self) -> usize {
        self.incomplete_sensors.iter().map(|(_, n)| n).sum()
    }
}
