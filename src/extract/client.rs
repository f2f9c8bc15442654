//! HTTP access to the OpenAQ API with bounded retries.
//!
//! Expected API conditions (404, 429, other statuses) come back as
//! [`Outcome`] values. Only transport faults are `Err` at the [`Transport`]
//! seam, and [`ApiClient::request`] folds those into `Outcome` as well.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::Config;

// ---

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// A single GET, with the API key and timeout already applied.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<RawResponse, String>;
}

/// Blocking wait used between retries and between pages.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Result of a request after the retry loop has run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    // ---
    /// HTTP 200 with a JSON body.
    Success(Value),
    /// HTTP 404.
    EmptyResult,
    /// HTTP 429.
    RateLimited,
    /// Any other status, or a 200 whose body is not JSON.
    Failure { status: u16, body: String },
    /// Connect or timeout error.
    TransportError(String),
    /// Every attempt was rate limited or hit a transport error.
    RetriesExhausted { attempts: u32 },
}

impl Outcome {
    fn is_transient(&self) -> bool {
        matches!(self, Outcome::RateLimited | Outcome::TransportError(_))
    }
}

/// Map one HTTP exchange to an [`Outcome`] without retrying.
pub fn classify(response: Result<RawResponse, String>) -> Outcome {
    // ---
    match response {
        Err(cause) => Outcome::TransportError(cause),
        Ok(RawResponse { status: 200, body }) => match serde_json::from_str(&body) {
            Ok(payload) => Outcome::Success(payload),
            Err(e) => Outcome::Failure {
                status: 200,
                body: format!("invalid JSON body: {e}"),
            },
        },
        Ok(RawResponse { status: 404, .. }) => Outcome::EmptyResult,
        Ok(RawResponse { status: 429, .. }) => Outcome::RateLimited,
        Ok(RawResponse { status, body }) => Outcome::Failure { status, body },
    }
}

/// Wait before retry number `attempt + 1`: `2^attempt` seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

// ---

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client that sends `X-API-Key` on every request and gives up
    /// after `config.request_timeout`.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        // ---
        let mut headers = reqwest::header::HeaderMap::new();
        let mut key = reqwest::header::HeaderValue::from_str(&config.api_key)
            .map_err(|e| anyhow::anyhow!("OPENAQ_API_KEY is not a valid header value: {}", e))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);

        let client = reqwest::Client::builder()
            .user_agent(concat!("openaq-harvest/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<RawResponse, String> {
        // ---
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(RawResponse { status, body })
    }
}

/// Real wall-clock sleeps.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---

/// API client: a transport plus the retry policy.
pub struct ApiClient<T, S> {
    transport: T,
    sleeper: S,
    max_retries: u32,
}

impl<T: Transport, S: Sleeper> ApiClient<T, S> {
    pub fn new(transport: T, sleeper: S, max_retries: u32) -> Self {
        Self {
            transport,
            sleeper,
            max_retries: max_retries.max(1),
        }
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Issue a GET, retrying rate limits and transport errors with
    /// exponential backoff. Any other status returns immediately.
    pub async fn request(&self, url: &str, query: &[(&str, String)]) -> Outcome {
        // ---
        for attempt in 0..self.max_retries {
            debug!(%url, ?query, attempt, "GET");
            let outcome = classify(self.transport.get(url, query).await);

            match &outcome {
                Outcome::RateLimited => warn!(%url, attempt, "rate limited"),
                Outcome::TransportError(cause) => {
                    warn!(%url, attempt, error = %cause, "request failed")
                }
                Outcome::EmptyResult => debug!(%url, ?query, "no data found"),
                Outcome::Failure { status, body } => {
                    error!(%url, ?query, status, %body, "request rejected")
                }
                _ => {}
            }

            if !outcome.is_transient() {
                return outcome;
            }

            if attempt + 1 < self.max_retries {
                let wait = backoff_delay(attempt);
                warn!(%url, wait_secs = wait.as_secs(), "backing off");
                self.sleeper.sleep(wait).await;
            }
        }

        error!(%url, ?query, max_retries = self.max_retries, "max retries exceeded");
        Outcome::RetriesExhausted {
            attempts: self.max_retries,
        }
    }
}

// ---


#[cfg(test)]
mod tests {
    // ---
    use super::testing::*;
    use super::*;

    fn client(responses: Vec<Result<RawResponse, String>>) -> ApiClient<FakeTransport, RecordingSleeper> {
        ApiClient::new(FakeTransport::scripted(responses), RecordingSleeper::default(), 5)
    }

    #[test]
    fn test_classify_statuses() {
        // ---
        assert_eq!(
            classify(ok(200, r#"{"results":[]}"#)),
            Outcome::Success(serde_json::json!({ "results": [] }))
        );
        assert_eq!(classify(ok(404, "not found")), Outcome::EmptyResult);
        assert_eq!(classify(ok(429, "slow down")), Outcome::RateLimited);
        assert_eq!(
            classify(ok(500, "boom")),
            Outcome::Failure { status: 500, body: "boom".into() }
        );
        assert!(matches!(classify(ok(200, "<html>")), Outcome::Failure { status: 200, .. }));
        assert_eq!(
            classify(Err("timed out".into())),
            Outcome::TransportError("timed out".into())
        );
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        // ---
        let api = client(vec![
            ok(429, ""),
            Err("connection reset".into()),
            ok(429, ""),
            ok(200, r#"{"results":[{"value":1.0}]}"#),
        ]);

        let outcome = api.request("http://api/x", &[]).await;

        assert_eq!(outcome, Outcome::Success(serde_json::json!({ "results": [{ "value": 1.0 }] })));
        assert_eq!(
            api.sleeper().recorded(),
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert_eq!(api.transport().call_count(), 4);
    }

    #[tokio::test]
    async fn test_success_on_final_attempt() {
        // ---
        let mut responses: Vec<_> = (0..4).map(|_| ok(429, "")).collect();
        responses.push(ok(200, "{}"));
        let api = client(responses);

        let outcome = api.request("http://api/x", &[]).await;

        assert_eq!(outcome, Outcome::Success(serde_json::json!({})));
        assert_eq!(api.transport().call_count(), 5);
        assert_eq!(
            api.sleeper().recorded(),
            [1, 2, 4, 8].map(Duration::from_secs).to_vec()
        );
    }

    #[tokio::test]
    async fn test_all_transport_errors_exhaust_retries() {
        // ---
        let api = client((0..10).map(|_| Err("connection refused".to_string())).collect());

        let outcome = api.request("http://api/x", &[]).await;

        assert_eq!(outcome, Outcome::RetriesExhausted { attempts: 5 });
        assert_eq!(api.transport().call_count(), 5);
        assert_eq!(
            api.sleeper().recorded(),
            [1, 2, 4, 8].map(Duration::from_secs).to_vec()
        );
    }

    #[tokio::test]
    async fn test_immediate_success_never_sleeps() {
        // ---
        let api = client(vec![ok(200, "{}")]);
        assert_eq!(api.request("http://api/x", &[]).await, Outcome::Success(serde_json::json!({})));
        assert!(api.sleeper().recorded().is_empty());
    }

    #[tokio::test]
    async fn test_all_rate_limited_is_terminal() {
        // ---
        let api = client((0..10).map(|_| ok(429, "")).collect());

        let outcome = api.request("http://api/x", &[]).await;

        assert_eq!(outcome, Outcome::RetriesExhausted { attempts: 5 });
        assert_eq!(api.transport().call_count(), 5);
        assert_eq!(api.sleeper().recorded().len(), 4);
    }

    #[tokio::test]
    async fn test_failure_is_not_retried() {
        // ---
        let api = client(vec![ok(500, "internal"), ok(200, "{}")]);

        let outcome = api.request("http://api/x", &[]).await;

        assert_eq!(outcome, Outcome::Failure { status: 500, body: "internal".into() });
        assert_eq!(api.transport().call_count(), 1);
        assert!(api.sleeper().recorded().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_is_empty_result() {
        // ---
        let api = client(vec![ok(404, "")]);
        assert_eq!(api.request("http://api/x", &[]).await, Outcome::EmptyResult);
        assert_eq!(api.transport().call_count(), 1);
    }
}
