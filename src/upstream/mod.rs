//! # Upstream Exchange-Rates Client
//!
//! Retrying client for the upstream HTTPS API
//! (`GET {base_url}?access_key={key}` returning
//! `{success, timestamp, base, date, rates}`).
//!
//! Providers are an enum: `Http` (reqwest) for production and `Static`
//! (scripted outcomes, call counting, optional artificial delay) for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{RetryConfig, UpstreamConfig};
use crate::error::{RelayError, RelayResult};

/// Payload of the upstream `latest` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamRates {
    pub success: bool,
    #[serde(default)]
    pub timestamp: Option<i64>,
    pub base: String,
    pub date: String,
    pub rates: HashMap<String, f64>,
}

impl UpstreamRates {
    /// A successful payload from parts (test/builder convenience).
    pub fn of(base: &str, date: &str, rates: HashMap<String, f64>) -> Self {
        Self {
            success: true,
            timestamp: None,
            base: base.to_string(),
            date: date.to_string(),
            rates,
        }
    }
}

/// The configured upstream backend.
#[derive(Debug)]
pub enum UpstreamProvider {
    Http(HttpUpstreamClient),
    Static(StaticUpstream),
}

impl UpstreamProvider {
    pub fn new_http(config: &UpstreamConfig) -> RelayResult<Self> {
        Ok(Self::Http(HttpUpstreamClient::new(config)?))
    }

    /// A static upstream answering every call with the same payload.
    pub fn new_static(rates: UpstreamRates) -> Self {
        Self::Static(StaticUpstream::always(rates))
    }

    /// One fetch attempt, no retries.
    pub async fn fetch_latest(&self) -> RelayResult<UpstreamRates> {
        match self {
            Self::Http(client) => client.fetch_latest().await,
            Self::Static(stub) => stub.fetch_latest().await,
        }
    }

    /// Fetch under the configured backoff policy. A payload flagged
    /// unsuccessful or carrying no rates counts as a failed attempt. After
    /// the final attempt the error is
    /// [`RelayError::UpstreamUnavailable`].
    pub async fn fetch_latest_with_retry(
        &self,
        retry: &RetryConfig,
    ) -> RelayResult<UpstreamRates> {
        let mut last_error = String::new();
        for attempt in 0..retry.max_attempts {
            match self.fetch_latest().await {
                Ok(payload) if payload.success && !payload.rates.is_empty() => {
                    return Ok(payload);
                }
                Ok(_) => {
                    last_error = "upstream answered without usable rates".to_string();
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }

            if attempt + 1 < retry.max_attempts {
                let delay = retry.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "upstream attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
        Err(RelayError::upstream_unavailable(format!(
            "{} attempts exhausted: {last_error}",
            retry.max_attempts
        )))
    }

    /// Number of fetch attempts observed (static provider only).
    pub fn call_count(&self) -> u64 {
        match self {
            Self::Http(_) => 0,
            Self::Static(stub) => stub.call_count(),
        }
    }

    /// Access the static backend (test hooks).
    pub fn as_static(&self) -> Option<&StaticUpstream> {
        match self {
            Self::Static(stub) => Some(stub),
            _ => None,
        }
    }
}

/// reqwest-backed upstream client.
#[derive(Debug)]
pub struct HttpUpstreamClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpUpstreamClient {
    pub fn new(config: &UpstreamConfig) -> RelayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RelayError::configuration(format!("upstream client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn fetch_latest(&self) -> RelayResult<UpstreamRates> {
        let url = format!("{}?access_key={}", self.base_url, self.api_key);
        debug!(url = %self.base_url, "fetching upstream rates");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RelayError::upstream_unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| RelayError::upstream_unavailable(e.to_string()))?;

        response
            .json::<UpstreamRates>()
            .await
            .map_err(|e| RelayError::upstream_unavailable(format!("malformed payload: {e}")))
    }
}

/// One scripted outcome for the static upstream.
#[derive(Debug, Clone)]
pub enum StaticOutcome {
    Reply(UpstreamRates),
    Failure(String),
}

/// Scripted upstream for tests: consumes a queue of outcomes, then falls
/// back to a default payload (or failure if none is set).
#[derive(Debug, Default)]
pub struct StaticUpstream {
    script: Mutex<VecDeque<StaticOutcome>>,
    fallback: Mutex<Option<UpstreamRates>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicU64,
}

impl StaticUpstream {
    /// Answer every call with the same payload.
    pub fn always(rates: UpstreamRates) -> Self {
        let stub = Self::default();
        *stub
            .fallback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(rates);
        stub
    }

    /// Queue an outcome ahead of the fallback.
    pub fn push_outcome(&self, outcome: StaticOutcome) {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(outcome);
    }

    /// Replace the fallback payload.
    pub fn set_fallback(&self, rates: UpstreamRates) {
        *self
            .fallback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(rates);
    }

    /// Delay every call by the given duration (deadline scenarios).
    pub fn set_delay(&self, delay: Duration) {
        *self
            .delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(delay);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    async fn fetch_latest(&self) -> RelayResult<UpstreamRates> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let delay = *self
            .delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match scripted {
            Some(StaticOutcome::Reply(rates)) => Ok(rates),
            Some(StaticOutcome::Failure(message)) => {
                Err(RelayError::upstream_unavailable(message))
            }
            None => {
                let fallback = self
                    .fallback
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone();
                fallback.ok_or_else(|| {
                    RelayError::upstream_unavailable("static upstream has no payload")
                })
            }
        }
    }
}
