//! Application entry point for the `openaq-harvest` pipeline.
//!
//! This binary orchestrates one full pipeline run:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Harvesting a year of hourly OpenAQ measurements into the append-only
//!   table via the `extract` gateway (EMBP pattern)
//! - Running the cleaning, wide-pivot, PCA and heatmap stages via `analysis`
//!
//! # Environment Variables
//! - `OPENAQ_API_KEY` (**required**) – OpenAQ API key
//! - `HARVEST_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `HARVEST_SPAN_EVENTS` (optional) – span event mode for tracing
//! - see `config.rs` for the harvest settings
//!
//! This module follows the Explicit Module Boundary Pattern (EMBP) by
//! delegating configuration parsing to `config`, the harvest to `extract`
//! and the downstream tables to `analysis`.
use std::env;

use is_terminal::IsTerminal;

use dotenvy::dotenv;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

mod analysis;
mod config;
mod extract;
mod models;

pub use config::Config;

// Re-exported so extract/*.rs and analysis/*.rs depend on the crate root,
// not on models.rs directly.
pub use models::{
    Location, Measurement, NormalizedRecord, RunSummary, Sensor, SensorFetch, TimeWindow,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let transport = extract::HttpTransport::new(&cfg)?;
    let api = extract::ApiClient::new(transport, extract::TokioSleeper, cfg.max_retries);
    let mut writer = extract::TableWriter::open(&cfg.output_file)?;

    let summary = extract::harvest(&api, &cfg, &mut writer).await?;

    if !cfg.run_analysis {
        tracing::info!("RUN_ANALYSIS disabled, skipping analysis stages");
        return Ok(());
    }
    if summary.total_measurements == 0 && !cfg.output_file.exists() {
        tracing::warn!("No measurements harvested, skipping analysis stages");
        return Ok(());
    }

    let report = analysis::run(&cfg)?;
    tracing::info!(
        rows_read = report.rows_read,
        rows_clean = report.rows_clean,
        wide_rows = report.wide_rows,
        pca_components = report.pca_components,
        heatmap_locations = report.heatmap_locations,
        heatmap_hours = report.heatmap_hours,
        "Pipeline complete"
    );

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `HARVEST_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: no span events (default)
/// - Log level controlled by the `HARVEST_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("HARVEST_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::NONE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to HARVEST_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("HARVEST_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},reqwest=warn,hyper=warn,hyper_util=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
