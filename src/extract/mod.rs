//! Extraction gateway: everything needed to harvest a year of OpenAQ
//! measurements into the append-only table.
//!
//! Sibling modules stay private; `main.rs` only sees the items re-exported
//! here (EMBP).

mod client;
mod fetcher;
mod harvest;
mod normalize;
mod windows;
mod writer;

pub use client::{ApiClient, HttpTransport, TokioSleeper};
pub use harvest::harvest;
pub use writer::TableWriter;

#[cfg(test)]
pub(crate) fn test_config() -> crate::Config {
    // ---
    use std::time::Duration;

    crate::Config {
        api_url: "http://api.test/v3".to_string(),
        api_key: "test-key".to_string(),
        year: 2025,
        station_limit: 100,
        request_timeout: Duration::from_secs(30),
        max_retries: 5,
        page_size: 1000,
        page_delay: Duration::from_millis(200),
        data_dir: "data".into(),
        output_file: "data/openaq_2025.csv".into(),
        violation_threshold: 35.0,
        pca_components: 2,
        run_analysis: false,
    }
}
