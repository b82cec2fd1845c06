//! Startup orchestration.
//!
//! Builds the telemetry pieces from config in dependency order: registry,
//! transport, emitter, then the request instrumentation and periodic exporter
//! that share them.

use axum::http::Method;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::http::{HttpServer, ORDER_ROUTE};
use crate::telemetry::encoder::Encoder;
use crate::telemetry::exporter::PeriodicExporter;
use crate::telemetry::host::{HostSampler, SystemSampler};
use crate::telemetry::middleware::{OrderEndpoint, RequestInstrumentation};
use crate::telemetry::registry::MetricRegistry;
use crate::telemetry::transport::{HttpTransport, NoopTransport, Transport, TransportError};
use crate::telemetry::MetricEmitter;

/// Everything `main` needs to run.
pub struct Services {
    pub registry: Arc<MetricRegistry>,
    pub server: HttpServer,
    /// `None` when metric push is disabled.
    pub exporter: Option<PeriodicExporter>,
}

impl Services {
    /// Wire services with the real HTTP transport and host sampler.
    pub fn build(config: ServiceConfig) -> Result<Self, TransportError> {
        let transport: Arc<dyn Transport> = if config.metrics.enabled {
            Arc::new(HttpTransport::from_config(&config.metrics)?)
        } else {
            Arc::new(NoopTransport)
        };
        Ok(Self::with_parts(config, transport, Arc::new(SystemSampler::new())))
    }

    /// Wire services around a given transport and sampler.
    pub fn with_parts(
        config: ServiceConfig,
        transport: Arc<dyn Transport>,
        sampler: Arc<dyn HostSampler>,
    ) -> Self {
        tracing::info!(
            enabled = config.metrics.enabled,
            source = %config.metrics.source,
            url = %config.metrics.url,
            period_secs = config.metrics.period_secs,
            "Metrics initialized"
        );

        let registry = Arc::new(MetricRegistry::new());
        let emitter = MetricEmitter::new(Encoder::new(config.metrics.source.clone()), transport);

        let instrumentation = Arc::new(
            RequestInstrumentation::new(
                registry.clone(),
                emitter.clone(),
                OrderEndpoint::new(Method::POST, ORDER_ROUTE),
            )
            .max_body_bytes(config.http.max_body_bytes),
        );

        let exporter = config.metrics.enabled.then(|| {
            PeriodicExporter::new(
                registry.clone(),
                emitter,
                sampler,
                Duration::from_secs(config.metrics.period_secs),
            )
            .clear_active_users(config.metrics.clear_active_users)
        });

        let server = HttpServer::new(config, instrumentation);

        Self {
            registry,
            server,
            exporter,
        }
    }
}
