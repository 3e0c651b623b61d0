//! Upload of ADIF records to the Wavelog QSO API.
//!
//! Each record is posted as JSON to `{wavelog_url}/api/qso`. Transport
//! failures (timeouts, refused or reset connections) are retried with
//! exponential backoff; an HTTP error status is treated as a final answer
//! from the server and is not retried.

use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::report::{RelayEvent, Reporter};

/// Path of the QSO import endpoint, relative to the Wavelog base URL.
pub const API_PATH: &str = "/api/qso";

/// Default per-attempt request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Default number of attempts per record.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry; doubled for each later retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Where and as whom records are uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavelogTarget {
    /// Base URL of the Wavelog installation.
    pub base_url: String,

    /// Wavelog API key.
    pub api_key: String,

    /// Station profile the QSOs are logged against.
    pub station_profile_id: String,
}

impl WavelogTarget {
    /// Full URL of the QSO import endpoint.
    pub fn qso_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), API_PATH)
    }
}

/// JSON body of a QSO import request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QsoRequest {
    pub key: String,
    pub station_profile_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub string: String,
}

impl QsoRequest {
    /// Wrap an ADIF string for the given target.
    pub fn adif(target: &WavelogTarget, record: &str) -> Self {
        Self {
            key: target.api_key.clone(),
            station_profile_id: target.station_profile_id.clone(),
            kind: "adif".to_string(),
            string: record.to_string(),
        }
    }
}

/// A transport-level failure. All variants are considered transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Short failure category for diagnostics.
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Timeout => "timeout",
            TransportError::Connect(_) => "connection",
            TransportError::Request(_) => "request",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// The server's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResponse {
    pub status: u16,
    pub body: String,
}

impl EndpointResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something QSO requests can be posted to.
pub trait Endpoint: Send + Sync {
    /// Send one request. Only transport failures are errors; any HTTP
    /// status comes back as a response.
    fn post(
        &self,
        request: &QsoRequest,
    ) -> impl Future<Output = Result<EndpointResponse, TransportError>> + Send;
}

impl<T: Endpoint> Endpoint for Arc<T> {
    fn post(
        &self,
        request: &QsoRequest,
    ) -> impl Future<Output = Result<EndpointResponse, TransportError>> + Send {
        (**self).post(request)
    }
}

/// HTTP endpoint backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
}

impl HttpEndpoint {
    /// Create an endpoint for the target's QSO URL with a per-request timeout.
    pub fn new(target: &WavelogTarget, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: target.qso_url(),
        })
    }

    /// The URL requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Endpoint for HttpEndpoint {
    async fn post(&self, request: &QsoRequest) -> Result<EndpointResponse, TransportError> {
        let body =
            serde_json::to_vec(request).map_err(|e| TransportError::Request(e.to_string()))?;

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(EndpointResponse { status, body })
    }
}

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Wait before the first retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Wait after the failed attempt with 0-based index `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Result of delivering one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The server accepted the record.
    Delivered { status: u16, attempts: u32 },

    /// The server answered with an error status. Not retried.
    Rejected { status: u16, body: String },

    /// Every attempt failed at the transport level, or shutdown cut the
    /// retry sequence short.
    Exhausted {
        attempts: u32,
        last_error: Option<TransportError>,
    },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Uploads records to Wavelog with retry and backoff.
pub struct WavelogClient<E> {
    endpoint: E,
    target: WavelogTarget,
    policy: RetryPolicy,
    reporter: Arc<dyn Reporter>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<E: Endpoint> WavelogClient<E> {
    /// Create a client posting through `endpoint`.
    pub fn new(
        endpoint: E,
        target: WavelogTarget,
        policy: RetryPolicy,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            endpoint,
            target,
            policy,
            reporter,
            shutdown: None,
        }
    }

    /// Let a shutdown signal interrupt backoff waits.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Deliver one ADIF (or other terminal-format) record.
    pub async fn deliver(&self, record: &str) -> DeliveryOutcome {
        let request = QsoRequest::adif(&self.target, record);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;
        let mut attempts = 0;

        while attempts < max_attempts {
            attempts += 1;
            let started = Instant::now();

            match self.endpoint.post(&request).await {
                Ok(response) if response.is_success() => {
                    self.reporter.report(&RelayEvent::Delivered {
                        status: response.status,
                        attempt: attempts,
                        latency: started.elapsed(),
                    });
                    return DeliveryOutcome::Delivered {
                        status: response.status,
                        attempts,
                    };
                }
                Ok(response) => {
                    self.reporter.report(&RelayEvent::Rejected {
                        status: response.status,
                        body: response.body.clone(),
                    });
                    return DeliveryOutcome::Rejected {
                        status: response.status,
                        body: response.body,
                    };
                }
                Err(error) => {
                    self.reporter.report(&RelayEvent::AttemptFailed {
                        attempt: attempts,
                        max_attempts,
                        error: error.clone(),
                    });
                    last_error = Some(error);
                }
            }

            if attempts < max_attempts {
                let delay = self.policy.backoff(attempts - 1);
                debug!("Retrying in {:?}", delay);
                if !self.wait(delay).await {
                    debug!("Shutdown requested, abandoning retries");
                    break;
                }
            }
        }

        self.reporter.report(&RelayEvent::Exhausted {
            attempts,
            max_attempts,
            last_error: last_error.clone(),
        });

        DeliveryOutcome::Exhausted {
            attempts,
            last_error,
        }
    }

    /// Sleep for `delay`. Returns false if shutdown fired first.
    async fn wait(&self, delay: Duration) -> bool {
        let Some(shutdown) = &self.shutdown else {
            tokio::time::sleep(delay).await;
            return true;
        };

        let mut shutdown = shutdown.clone();
        let stop_requested = async move { shutdown.wait_for(|stop| *stop).await.is_ok() };

        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            true = stop_requested => false,
        }
    }
}
