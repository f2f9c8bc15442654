//! Configuration loader for the `openaq-harvest` pipeline.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). The harvester, the analysis stages and `main.rs`
//! all read from the one [`Config`] snapshot built here instead of calling
//! `env::var` on their own.
//!
use std::{env, path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};

/// Parse an optional environment variable into `$ty`, falling back to a default.
macro_rules! parse_env {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v: String| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($lookup:expr, $var_name:expr) => {
        $lookup($var_name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

pub const DEFAULT_API_URL: &str = "https://api.openaq.org/v3";

/// Years `HARVEST_YEAR` may name.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1970..=9999;

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the run.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// OpenAQ API base URL, without a trailing slash.
    pub api_url: String,

    /// Value sent in the `X-API-Key` header.
    pub api_key: String,

    /// Calendar year to harvest.
    pub year: i32,

    /// `limit` passed to the location catalog request.
    pub station_limit: u32,

    /// Per-request timeout.
    pub request_timeout: Duration,

    /// Attempt ceiling for rate-limited or transport-failed requests.
    pub max_retries: u32,

    /// Measurements requested per page.
    pub page_size: u32,

    /// Pause between consecutive page requests.
    pub page_delay: Duration,

    /// Directory for derived outputs (wide pivot, heatmap).
    pub data_dir: PathBuf,

    /// Append-only harvested table.
    pub output_file: PathBuf,

    /// PM2.5 value above which an hour counts as a violation.
    pub violation_threshold: f64,

    /// Principal components kept by the reduction stage.
    pub pca_components: usize,

    /// Run the cleaning, pivot, reduction and heatmap stages after harvesting.
    pub run_analysis: bool,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `OPENAQ_API_KEY` – OpenAQ API key
///
/// Optional:
/// - `OPENAQ_API_URL` – API base URL (default: `https://api.openaq.org/v3`)
/// - `HARVEST_YEAR` – year to harvest (default: 2025)
/// - `STATION_LIMIT` – catalog size limit (default: 100)
/// - `REQUEST_TIMEOUT_SECS` – per-request timeout (default: 30)
/// - `MAX_RETRIES` – transient attempt ceiling (default: 5)
/// - `PAGE_SIZE` – measurements per page (default: 1000)
/// - `PAGE_DELAY_MS` – delay between pages (default: 200)
/// - `DATA_DIR` – output directory (default: `data`)
/// - `OUTPUT_FILE` – harvested table (default: `{DATA_DIR}/openaq_{YEAR}.csv`)
/// - `VIOLATION_THRESHOLD` – PM2.5 violation threshold (default: 35.0)
/// - `PCA_COMPONENTS` – principal components to keep (default: 2)
/// - `RUN_ANALYSIS` – run analysis stages after harvest (default: true)
///
/// Returns an error if the API key is missing or any value fails to parse.
pub fn load_from_env() -> Result<Config> {
    load_from(|name| env::var(name).ok())
}

/// Build a [`Config`] from any variable source.
pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
    // ---
    let api_key = require_env!(lookup, "OPENAQ_API_KEY");
    let api_url = lookup("OPENAQ_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let year = parse_env!(lookup, "HARVEST_YEAR", i32, 2025);
    let station_limit = parse_env!(lookup, "STATION_LIMIT", u32, 100);
    let timeout_secs = parse_env!(lookup, "REQUEST_TIMEOUT_SECS", u64, 30);
    let max_retries = parse_env!(lookup, "MAX_RETRIES", u32, 5);
    let page_size = parse_env!(lookup, "PAGE_SIZE", u32, 1000);
    let page_delay_ms = parse_env!(lookup, "PAGE_DELAY_MS", u64, 200);
    let data_dir = PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| "data".to_string()));
    let output_file = lookup("OUTPUT_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join(format!("openaq_{year}.csv")));
    let violation_threshold = parse_env!(lookup, "VIOLATION_THRESHOLD", f64, 35.0);
    let pca_components = parse_env!(lookup, "PCA_COMPONENTS", usize, 2);
    let run_analysis = parse_env!(lookup, "RUN_ANALYSIS", bool, true);

    if !YEAR_RANGE.contains(&year) {
        return Err(anyhow!(
            "Invalid HARVEST_YEAR: {} is outside {}..={}",
            year,
            YEAR_RANGE.start(),
            YEAR_RANGE.end()
        ));
    }
    if max_retries == 0 {
        return Err(anyhow!("Invalid MAX_RETRIES: must be at least 1"));
    }
    if page_size == 0 {
        return Err(anyhow!("Invalid PAGE_SIZE: must be at least 1"));
    }
    if pca_components == 0 {
        return Err(anyhow!("Invalid PCA_COMPONENTS: must be at least 1"));
    }

    Ok(Config {
        api_url: api_url.trim_end_matches('/').to_string(),
        api_key,
        year,
        station_limit,
        request_timeout: Duration::from_secs(timeout_secs),
        max_retries,
        page_size,
        page_delay: Duration::from_millis(page_delay_ms),
        data_dir,
        output_file,
        violation_threshold,
        pca_components,
        run_analysis,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the API key while showing all other values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  OPENAQ_API_URL       : {}", self.api_url);
        tracing::info!("  OPENAQ_API_KEY       : {}", mask_secret(&self.api_key));
        tracing::info!("  HARVEST_YEAR         : {}", self.year);
        tracing::info!("  STATION_LIMIT        : {}", self.station_limit);
        tracing::info!("  REQUEST_TIMEOUT_SECS : {}", self.request_timeout.as_secs());
        tracing::info!("  MAX_RETRIES          : {}", self.max_retries);
        tracing::info!("  PAGE_SIZE            : {}", self.page_size);
        tracing::info!("  PAGE_DELAY_MS        : {}", self.page_delay.as_millis());
        tracing::info!("  DATA_DIR             : {}", self.data_dir.display());
        tracing::info!("  OUTPUT_FILE          : {}", self.output_file.display());
        tracing::info!("  VIOLATION_THRESHOLD  : {}", self.violation_threshold);
        tracing::info!("  PCA_COMPONENTS       : {}", self.pca_components);
        tracing::info!("  RUN_ANALYSIS         : {}", self.run_analysis);
    }
}

/// Keep the last four characters of a secret, star out the rest.
fn mask_secret(secret: &str) -> String {
    // ---
    let visible = 4;
    let len = secret.chars().count();
    if len <= visible {
        return "****".to_string();
    }
    let tail: String = secret.chars().skip(len - visible).collect();
    format!("****{tail}")
}
