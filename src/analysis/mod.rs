//! Analysis gateway: cleaning, wide pivot, PCA reduction and violation
//! heatmap over the harvested table.
//!
//! The outputs here are the data contracts the dashboard consumes; the
//! dashboard itself lives outside this crate.

mod clean;
mod heatmap;
mod pivot;
mod reduce;

use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::Config;

/// Files produced by [`run`].
#[derive(Debug)]
pub struct AnalysisReport {
    pub rows_read: usize,
    pub rows_clean: usize,
    pub wide_rows: usize,
    pub pca_components: usize,
    pub heatmap_locations: usize,
    pub heatmap_hours: usize,
}

/// Clean the harvested table, then write `clean.csv`, `wide.csv`, the
/// `pca_*.csv` outputs and `heatmap.csv` into the data directory.
pub fn run(config: &Config) -> Result<AnalysisReport> {
    // ---
    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    let rows = clean::read_table(&config.output_file)?;
    let rows_read = rows.len();
    let cleaned = clean::clean(rows);
    let clean_path = config.data_dir.join("clean.csv");
    clean::write_clean(&clean_path, &cleaned)?;
    info!(file = %clean_path.display(), rows_read, rows_clean = cleaned.len(), "wrote cleaned table");

    let wide = pivot::pivot(&cleaned);
    let wide_path = config.data_dir.join("wide.csv");
    pivot::write_wide(&wide_path, &wide)?;
    info!(file = %wide_path.display(), rows = wide.len(), "wrote wide table");

    let pca_components = match reduce::reduce(&wide, config.pca_components) {
        Some(reduction) => {
            reduce::write_scores(&config.data_dir.join("pca_scores.csv"), &wide, &reduction)?;
            reduce::write_loadings(&config.data_dir.join("pca_loadings.csv"), &reduction)?;
            reduce::write_explained_variance(
                &config.data_dir.join("pca_explained_variance.csv"),
                &reduction,
            )?;
            info!(
                components = reduction.components(),
                explained = ?reduction.explained_variance_ratio,
                "wrote PCA outputs"
            );
            reduction.components()
        }
        None => {
            warn!(rows = wide.len(), "too few wide rows for PCA, skipping");
            0
        }
    };

    let heatmap = heatmap::violation_rates(&cleaned, config.violation_threshold);
    let heatmap_path = config.data_dir.join("heatmap.csv");
    heatmap::write_heatmap(&heatmap_path, &heatmap)?;
    info!(
        file = %heatmap_path.display(),
        locations = heatmap.rows.len(),
        hours = heatmap.hours.len(),
        "wrote violation heatmap"
    );

    Ok(AnalysisReport {
        rows_read,
        rows_clean: cleaned.len(),
        wide_rows: wide.len(),
        pca_components,
        heatmap_locations: heatmap.rows.len(),
        heatmap_hours: heatmap.hours.len(),
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::extract::TableWriter;
    use crate::NormalizedRecord;

    fn row(location_id: i64, parameter: &str, value: f64, utc: &str) -> NormalizedRecord {
        // ---
        NormalizedRecord {
            location_id,
            location_name: None,
            locality: None,
            country: None,
            country_code: None,
            latitude: None,
            longitude: None,
            sensor_id: location_id * 10,
            sensor_name: None,
            parameter: Some(parameter.into()),
            parameter_display: None,
            unit: None,
            value: Some(value),
            datetime_utc: Some(utc.into()),
            datetime_local: None,
        }
    }

    #[test]
    fn test_run_writes_all_outputs() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::extract::test_config();
        config.data_dir = dir.path().join("out");
        config.output_file = dir.path().join("openaq.csv");

        let mut writer = TableWriter::open(&config.output_file).unwrap();
        writer
            .append(&[
                row(1, "pm25", 40.0, "2025-01-01T00:00:00Z"),
                row(1, "pm10", 80.0, "2025-01-01T00:00:00Z"),
                row(2, "pm25", -1.0, "2025-01-01T00:00:00Z"),
                row(1, "pm25", 20.0, "2025-01-01T01:00:00Z"),
            ])
            .unwrap();

        let report = run(&config).unwrap();

        assert_eq!(report.rows_read, 4);
        assert_eq!(report.rows_clean, 3);
        assert_eq!(report.wide_rows, 2);
        assert_eq!(report.pca_components, 2);
        assert_eq!((report.heatmap_locations, report.heatmap_hours), (1, 2));
        for name in [
            "clean.csv",
            "wide.csv",
            "pca_scores.csv",
            "pca_loadings.csv",
            "pca_explained_variance.csv",
            "heatmap.csv",
        ] {
            assert!(config.data_dir.join(name).exists(), "{name}");
        }
    }

    #[test]
    fn test_single_wide_row_skips_pca() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::extract::test_config();
        config.data_dir = dir.path().join("out");
        config.output_file = dir.path().join("openaq.csv");

        TableWriter::open(&config.output_file)
            .unwrap()
            .append(&[row(1, "pm25", 40.0, "2025-01-01T00:00:00Z")])
            .unwrap();

        let report = run(&config).unwrap();

        assert_eq!(report.pca_components, 0);
        assert!(!config.data_dir.join("pca_scores.csv").exists());
        assert!(config.data_dir.join("heatmap.csv").exists());
    }
}
