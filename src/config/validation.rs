//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Metric push settings are only checked when pushing is enabled

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("max_body_bytes must be greater than 0")]
    ZeroBodyLimit,

    #[error("invalid metrics url '{url}': {reason}")]
    MetricsUrl { url: String, reason: String },

    #[error("metrics api_key is empty")]
    MissingApiKey,

    #[error("metrics period_secs must be greater than 0")]
    ZeroPeriod,

    #[error("metrics push_timeout_secs must be greater than 0")]
    ZeroPushTimeout,

    #[error("metrics max_in_flight must be greater than 0")]
    ZeroInFlight,
}

/// Validate a loaded configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.http.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    let metrics = &config.metrics;
    if metrics.enabled {
        match Url::parse(&metrics.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::MetricsUrl {
                url: metrics.url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError::MetricsUrl {
                url: metrics.url.clone(),
                reason: e.to_string(),
            }),
        }
        if metrics.api_key.trim().is_empty() {
            errors.push(ValidationError::MissingApiKey);
        }
        if metrics.period_secs == 0 {
            errors.push(ValidationError::ZeroPeriod);
        }
        if metrics.push_timeout_secs == 0 {
            errors.push(ValidationError::ZeroPushTimeout);
        }
        if metrics.max_in_flight == 0 {
            errors.push(ValidationError::ZeroInFlight);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
