//! Outbound metric push.
//!
//! # Responsibilities
//! - Serialize a [`MetricBatch`] and POST it to the ingest endpoint
//! - Authenticate with `Authorization: Bearer <api key>`
//! - Log failures with the metric name and the backend's response body
//!
//! # Design Decisions
//! - Best effort: no retry, no queue, failures end at the log line
//! - `push` never blocks; the request runs on its own tokio task
//! - Outstanding pushes are capped by a semaphore. When the cap is reached the
//!   new push is dropped instead of piling up behind a dead backend
//! - Every push has a timeout so a hanging backend cannot hold a permit forever

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::MetricsConfig;
use crate::telemetry::encoder::MetricBatch;

/// Errors that can occur while pushing one batch.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to serialize metric batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid ingest endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("ingest endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("{limit} pushes already in flight")]
    Saturated { limit: usize },

    #[error("no tokio runtime available to run the push")]
    NoRuntime,

    #[error("push task failed: {0}")]
    Task(String),
}

/// Handle to a push that was handed to a transport.
///
/// Callers on the request path drop this immediately. Tests await it.
#[derive(Debug)]
pub enum Dispatch {
    /// The push is running on a spawned task.
    InFlight(JoinHandle<Result<(), TransportError>>),
    /// The push already finished (or was refused) synchronously.
    Completed(Result<(), TransportError>),
}

impl Dispatch {
    /// Wait for the outcome.
    pub async fn outcome(self) -> Result<(), TransportError> {
        match self {
            Dispatch::InFlight(handle) => handle
                .await
                .map_err(|e| TransportError::Task(e.to_string()))?,
            Dispatch::Completed(result) => result,
        }
    }
}

/// Sink for encoded metric batches.
pub trait Transport: Send + Sync + 'static {
    /// Start pushing `batch`. Must not block.
    fn push(&self, batch: MetricBatch) -> Dispatch;
}

/// Transport used when metric push is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransport;

impl Transport for NoopTransport {
    fn push(&self, _batch: MetricBatch) -> Dispatch {
        Dispatch::Completed(Ok(()))
    }
}

/// Transport that keeps every batch in memory.
///
/// Used by tests and by local runs that want to inspect what would be pushed.
/// With `failing` set every push is recorded and then reported as rejected.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    batches: Mutex<Vec<MetricBatch>>,
    failing: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    /// Every batch pushed so far, oldest first.
    pub fn batches(&self) -> Vec<MetricBatch> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Batches pushed for the metric `name`.
    pub fn named(&self, name: &str) -> Vec<MetricBatch> {
        self.batches()
            .into_iter()
            .filter(|b| b.metric_name() == Some(name))
            .collect()
    }

    /// Value of the most recent push for `name`.
    pub fn last_value(&self, name: &str) -> Option<i64> {
        self.named(name).last().and_then(|b| {
            b.metrics()
                .next()
                .and_then(|m| m.data_points().first())
                .map(|p| p.as_int)
        })
    }
}

impl Transport for MemoryTransport {
    fn push(&self, batch: MetricBatch) -> Dispatch {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(batch);
        if self.failing {
            Dispatch::Completed(Err(TransportError::Rejected {
                status: 503,
                body: "ingest unavailable".to_string(),
            }))
        } else {
            Dispatch::Completed(Ok(()))
        }
    }
}

/// OTLP/HTTP JSON push over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Arc<str>,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    dropped: Arc<AtomicU64>,
}

impl HttpTransport {
    /// Build a transport from validated metrics settings.
    pub fn from_config(config: &MetricsConfig) -> Result<Self, TransportError> {
        Self::from_builder(reqwest::Client::builder(), config)
    }

    /// Like [`from_config`](Self::from_config), starting from a caller's
    /// client builder. The push timeout is always applied.
    pub fn from_builder(
        builder: reqwest::ClientBuilder,
        config: &MetricsConfig,
    ) -> Result<Self, TransportError> {
        let endpoint = Url::parse(&config.url)?;
        let client = builder
            .timeout(Duration::from_secs(config.push_timeout_secs))
            .build()?;

        Ok(Self::new(client, endpoint, &config.api_key, config.max_in_flight))
    }

    pub fn new(client: reqwest::Client, endpoint: Url, api_key: &str, max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            client,
            endpoint,
            api_key: Arc::from(api_key),
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Pushes refused because the in-flight cap was reached.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Pushes currently running.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    fn refuse(&self, name: &str, err: TransportError) -> Dispatch {
        tracing::warn!(metric = %name, error = %err, "Dropping metric push");
        Dispatch::Completed(Err(err))
    }
}

impl Transport for HttpTransport {
    fn push(&self, batch: MetricBatch) -> Dispatch {
        let name = batch.metric_name().unwrap_or("<empty>").to_string();

        let body = match serde_json::to_vec(&batch) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(metric = %name, error = %e, "Failed to serialize metric batch");
                return Dispatch::Completed(Err(e.into()));
            }
        };

        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return self.refuse(
                    &name,
                    TransportError::Saturated {
                        limit: self.max_in_flight,
                    },
                );
            }
        };

        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => return self.refuse(&name, TransportError::NoRuntime),
        };

        let request = self
            .client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        Dispatch::InFlight(runtime.spawn(async move {
            let _permit = permit;
            let result = send(request).await;
            match &result {
                Ok(()) => tracing::debug!(metric = %name, "Pushed metric"),
                Err(e) => tracing::error!(metric = %name, error = %e, "Failed to push metric"),
            }
            result
        }))
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<(), TransportError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Rejected {
        status: status.as_u16(),
        body,
    })
}
