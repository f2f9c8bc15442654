//! End-to-end harvest: catalog → sensors → measurements → table.

use anyhow::{Context, Result};
use tracing::{info, info_span, warn, Instrument};

use super::client::{ApiClient, Sleeper, Transport};
use super::fetcher::{fetch_locations, fetch_measurements};
use super::normalize::normalize;
use super::writer::TableWriter;
use crate::{Config, RunSummary};

// ---

/// Run the full harvest, appending each sensor's rows to `writer` as soon as
/// they are fetched.
///
/// Only a catalog failure or an output I/O error aborts the run; per-window
/// fetch failures are logged and reported in the returned summary.
pub async fn harvest<T: Transport, S: Sleeper>(
    api: &ApiClient<T, S>,
    config: &Config,
    writer: &mut TableWriter,
) -> Result<RunSummary> {
    // ---
    info!("{}", "=".repeat(80));
    info!("Starting OpenAQ extraction for {}", config.year);
    info!("{}", "=".repeat(80));

    let locations = fetch_locations(api, config)
        .await
        .context("enumerating monitoring locations")?;
    info!("Found {} locations to process", locations.len());

    let mut summary = RunSummary::default();
    let total = locations.len();

    for (idx, location) in locations.iter().enumerate() {
        summary.locations_processed += 1;
        let name = location.name.as_deref().unwrap_or("Unknown");
        info!(
            "[{}/{}] Processing location: {} (ID: {})",
            idx + 1,
            total,
            name,
            location.id
        );

        if location.sensors.is_empty() {
            warn!(location_id = location.id, "no sensors found for location");
            continue;
        }
        info!("  Found {} sensors", location.sensors.len());

        for sensor in &location.sensors {
            let parameter = sensor
                .parameter
                .as_ref()
                .and_then(|p| p.name.as_deref())
                .unwrap_or("unknown");
            let span = info_span!("sensor", location_id = location.id, sensor_id = sensor.id, parameter);

            let fetch = fetch_measurements(api, config, sensor.id)
                .instrument(span.clone())
                .await;
            let _entered = span.enter();

            if !fetch.failed_windows.is_empty() {
                warn!(
                    failed_windows = fetch.failed_windows.len(),
                    "sensor data incomplete"
                );
                summary
                    .incomplete_sensors
                    .push((sensor.id, fetch.failed_windows.len()));
            }

            if fetch.records.is_empty() {
                summary.sensors_with_no_data += 1;
                info!("    No measurements found");
                continue;
            }

            let rows = normalize(&fetch.records, location, sensor);
            let written = writer
                .append(&rows)
                .with_context(|| format!("writing rows for sensor {}", sensor.id))?;

            summary.sensors_processed += 1;
            summary.total_measurements += written;
            info!("    Saved {} measurements", written);
        }
    }

    log_summary(&summary, writer);
    Ok(summary)
}

fn log_summary(summary: &RunSummary, writer: &TableWriter) {
    // ---
    info!("{}", "=".repeat(80));
    info!("Extraction Complete!");
    info!("  Locations processed : {}", summary.locations_processed);
    info!("  Sensors processed   : {}", summary.sensors_processed);
    info!("  Sensors with no data: {}", summary.sensors_with_no_data);
    info!("  Total measurements  : {}", summary.total_measurements);
    info!("  Output file         : {}", writer.path().display());
    if !summary.incomplete_sensors.is_empty() {
        warn!(
            "  {} sensors have {} windows with incomplete data",
            summary.incomplete_sensors.len(),
            summary.failed_windows()
        );
        for (sensor_id, windows) in &summary.incomplete_sensors {
            warn!("    sensor {}: {} failed windows", sensor_id, windows);
        }
    }
    info!("{}", "=".repeat(80));
}

#[cfg(test)]
mod tests {
    // ---
    use super::super::client::testing::*;
    use super::super::client::RawResponse;
    use super::*;
    use crate::extract::test_config;
    use crate::NormalizedRecord;

    const CATALOG: &str = r#"{"results":[
        {"id":1,"name":"Alpha","country":{"code":"US","name":"United States"},
         "sensors":[{"id":100,"name":"pm25","parameter":{"name":"pm25","displayName":"PM2.5","units":"µg/m³"}}]},
        {"id":2,"name":"Beta",
         "sensors":[{"id":200,"name":"o3","parameter":{"name":"o3","displayName":"O₃","units":"ppm"}}]}
    ]}"#;

    fn page(values: &[(f64, &str)]) -> String {
        // ---
        let items: Vec<_> = values
            .iter()
            .map(|(v, utc)| serde_json::json!({ "value": v, "period": { "datetimeFrom": { "utc": utc } } }))
            .collect();
        serde_json::json!({ "results": items }).to_string()
    }

    fn route(url: &str, query: &[(&str, String)]) -> Result<RawResponse, String> {
        // ---
        if url.ends_with("/locations") {
            return ok(200, CATALOG);
        }
        if url.contains("/sensors/200/") {
            return ok(404, "");
        }
        match query_value(query, "date_from").unwrap().as_str() {
            "2025-01-01T00:00:00Z" => ok(
                200,
                &page(&[(12.0, "2025-01-05T00:00:00Z"), (40.0, "2025-01-05T01:00:00Z")]),
            ),
            "2025-07-01T00:00:00Z" => ok(200, &page(&[(8.0, "2025-07-04T12:00:00Z")])),
            _ => ok(200, r#"{"results":[]}"#),
        }
    }

    #[tokio::test]
    async fn test_two_locations_one_empty_sensor() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openaq.csv");
        let mut writer = TableWriter::open(&path).unwrap();
        let api = ApiClient::new(FakeTransport::routed(vec![], route), RecordingSleeper::default(), 3);

        let summary = harvest(&api, &test_config(), &mut writer).await.unwrap();

        assert_eq!(
            summary,
            RunSummary {
                locations_processed: 2,
                sensors_processed: 1,
                sensors_with_no_data: 1,
                total_measurements: 3,
                incomplete_sensors: vec![],
            }
        );

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<NormalizedRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.location_id == 1 && r.sensor_id == 100));
        assert_eq!(rows[2].datetime_utc.as_deref(), Some("2025-07-04T12:00:00Z"));
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 4);
    }

    #[tokio::test]
    async fn test_catalog_failure_aborts_before_writing() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openaq.csv");
        let mut writer = TableWriter::open(&path).unwrap();
        let transport = FakeTransport::routed(vec![], |_, _| ok(503, "maintenance"));
        let api = ApiClient::new(transport, RecordingSleeper::default(), 3);

        let err = harvest(&api, &test_config(), &mut writer).await.unwrap_err();

        assert!(format!("{err:#}").contains("Failed to fetch locations"));
        assert!(!path.exists());
        assert_eq!(api.transport().call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_windows_surface_in_summary() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let mut writer = TableWriter::open(dir.path().join("openaq.csv")).unwrap();
        let transport = FakeTransport::routed(vec![], |url, query| {
            if url.ends_with("/locations") {
                return ok(200, CATALOG);
            }
            if url.contains("/sensors/100/")
                && query_value(query, "date_from").as_deref() == Some("2025-02-01T00:00:00Z")
            {
                return ok(500, "boom");
            }
            route(url, query)
        });
        let api = ApiClient::new(transport, RecordingSleeper::default(), 3);

        let summary = harvest(&api, &test_config(), &mut writer).await.unwrap();

        assert_eq!(summary.sensors_processed, 1);
        assert_eq!(summary.total_measurements, 3);
        assert_eq!(summary.incomplete_sensors, vec![(100, 1)]);
        assert_eq!(summary.failed_windows(), 1);
    }

    #[tokio::test]
    async fn test_location_without_sensors_is_counted() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let mut writer = TableWriter::open(dir.path().join("openaq.csv")).unwrap();
        let catalog = r#"{"results":[{"id":5,"sensors":[]}]}"#;
        let api = ApiClient::new(
            FakeTransport::scripted(vec![ok(200, catalog)]),
            RecordingSleeper::default(),
            3,
        );

        let summary = harvest(&api, &test_config(), &mut writer).await.unwrap();

        assert_eq!(summary.locations_processed, 1);
        assert_eq!(summary.sensors_processed + summary.sensors_with_no_data, 0);
    }
}
