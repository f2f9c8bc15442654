//! Catalog enumeration and paginated measurement fetches.

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::client::{ApiClient, Outcome, Sleeper, Transport};
use super::windows::month_ranges;
use crate::{Config, Location, Measurement, SensorFetch, TimeWindow};

// ---

/// Fetch the station catalog: one `GET /locations?limit=N`.
///
/// A 404 yields an empty catalog. Any terminal outcome is an error; there is
/// no useful partial catalog.
pub async fn fetch_locations<T: Transport, S: Sleeper>(
    api: &ApiClient<T, S>,
    config: &Config,
) -> Result<Vec<Location>> {
    // ---
    info!("Fetching locations");
    let url = format!("{}/locations", config.api_url);
    let query = [("limit", config.station_limit.to_string())];

    match api.request(&url, &query).await {
        Outcome::Success(payload) => {
            let (locations, _) = parse_results::<Location>(&payload);
            info!("Found {} locations", locations.len());
            Ok(locations)
        }
        Outcome::EmptyResult => {
            warn!(%url, "location catalog is empty");
            Ok(Vec::new())
        }
        other => Err(anyhow!("Failed to fetch locations from {}: {:?}", url, other)),
    }
}

/// Fetch a full year of hourly measurements for one sensor.
///
/// Walks every month window and every page within it. A terminal failure
/// stops the current window only; the window is recorded in
/// [`SensorFetch::failed_windows`] and the walk moves on.
pub async fn fetch_measurements<T: Transport, S: Sleeper>(
    api: &ApiClient<T, S>,
    config: &Config,
    sensor_id: i64,
) -> SensorFetch {
    // ---
    let url = format!("{}/sensors/{}/measurements/hourly", config.api_url, sensor_id);
    let mut fetch = SensorFetch::default();

    for window in month_ranges(config.year) {
        debug!(sensor_id, %window, "fetching window");
        if let WindowEnd::Failed = fetch_window(api, config, &url, &window, &mut fetch.records).await {
            warn!(
                sensor_id,
                %window,
                records_so_far = fetch.records.len(),
                "window fetch aborted, data for this window may be incomplete"
            );
            fetch.failed_windows.push(window);
        }
    }

    fetch
}

enum WindowEnd {
    Complete,
    Failed,
}

async fn fetch_window<T: Transport, S: Sleeper>(
    api: &ApiClient<T, S>,
    config: &Config,
    url: &str,
    window: &TimeWindow,
    records: &mut Vec<Measurement>,
) -> WindowEnd {
    // ---
    let page_size = config.page_size as usize;
    let mut page = 1u32;

    loop {
        let query = [
            ("date_from", window.date_from()),
            ("date_to", window.date_to()),
            ("limit", config.page_size.to_string()),
            ("page", page.to_string()),
        ];

        let payload = match api.request(url, &query).await {
            Outcome::Success(payload) => payload,
            Outcome::EmptyResult => return WindowEnd::Complete,
            Outcome::RetriesExhausted { attempts } => {
                warn!(page, attempts, "giving up on page after retries");
                return WindowEnd::Failed;
            }
            _ => return WindowEnd::Failed,
        };

        let (parsed, raw_count) = parse_results::<Measurement>(&payload);
        debug!(page, raw_count, parsed = parsed.len(), "page received");
        records.extend(parsed);

        if raw_count < page_size {
            return WindowEnd::Complete;
        }

        page += 1;
        api.sleeper().sleep(config.page_delay).await;
    }
}

/// Deserialize the `results` array, skipping items that do not fit `R`.
///
/// Returns the parsed items and the raw item count.
fn parse_results<R: DeserializeOwned>(payload: &Value) -> (Vec<R>, usize) {
    // ---
    let Some(items) = payload.get("results").and_then(|r| r.as_array()) else {
        debug!("response missing 'results' field or not an array");
        return (Vec::new(), 0);
    };

    let parsed = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value::<R>(item.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Failed to parse item {}: {} - Raw item: {}", i, e, item);
                None
            }
        })
        .collect();

    (parsed, items.len())
}
