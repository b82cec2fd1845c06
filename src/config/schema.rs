//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the pizza service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Request handling limits.
    pub http: HttpConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,

    /// Telemetry push settings.
    pub metrics: MetricsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Request handling limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Largest request body the service (and the order instrumentation) will buffer.
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Remote metrics push configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Push metrics to the remote backend. Off until an endpoint and key are
    /// configured.
    pub enabled: bool,

    /// Source label, exported as the `service.name` resource attribute.
    pub source: String,

    /// OTLP/HTTP JSON ingest endpoint.
    pub url: String,

    /// Bearer credential for the ingest endpoint.
    pub api_key: String,

    /// Periodic export interval in seconds.
    pub period_secs: u64,

    /// Timeout for a single push in seconds.
    pub push_timeout_secs: u64,

    /// Maximum number of pushes in flight at once. Extra pushes are dropped.
    pub max_in_flight: usize,

    /// Clear the active user set after every periodic export.
    pub clear_active_users: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source: "jwt-pizza-service".to_string(),
            url: "http://localhost:4318/v1/metrics".to_string(),
            api_key: String::new(),
            period_secs: 10,
            push_timeout_secs: 10,
            max_in_flight: 64,
            clear_active_users: false,
        }
    }
}
