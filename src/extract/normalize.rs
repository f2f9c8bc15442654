//! Flattening of Location + Sensor + Measurement into table rows.

use crate::{Location, Measurement, NormalizedRecord, Sensor};

// ---

/// One [`NormalizedRecord`] per measurement, each carrying the full location
/// and sensor context. Absent nested fields become `None`.
pub fn normalize(
    records: &[Measurement],
    location: &Location,
    sensor: &Sensor,
) -> Vec<NormalizedRecord> {
    // ---
    let country = location.country.as_ref();
    let coordinates = location.coordinates.as_ref();
    let parameter = sensor.parameter.as_ref();

    records
        .iter()
        .map(|record| {
            let timestamp = record.timestamp();
            NormalizedRecord {
                location_id: location.id,
                location_name: location.name.clone(),
                locality: location.locality.clone(),
                country: country.and_then(|c| c.name.clone()),
                country_code: country.and_then(|c| c.code.clone()),
                latitude: coordinates.and_then(|c| c.latitude),
                longitude: coordinates.and_then(|c| c.longitude),
                sensor_id: sensor.id,
                sensor_name: sensor.name.clone(),
                parameter: parameter.and_then(|p| p.name.clone()),
                parameter_display: parameter.and_then(|p| p.display_name.clone()),
                unit: parameter.and_then(|p| p.units.clone()),
                value: record.value,
                datetime_utc: timestamp.and_then(|t| t.utc.clone()),
                datetime_local: timestamp.and_then(|t| t.local.clone()),
            }
        })
        .collect()
}
