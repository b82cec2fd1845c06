//! Encoder + transport, the single entry point for pushing a reading.

use std::sync::Arc;

use crate::telemetry::encoder::Encoder;
use crate::telemetry::series::MetricReading;
use crate::telemetry::transport::{Dispatch, Transport};

/// Encodes readings and hands them to a [`Transport`]. Cheap to clone.
#[derive(Clone)]
pub struct MetricEmitter {
    encoder: Encoder,
    transport: Arc<dyn Transport>,
}

impl MetricEmitter {
    pub fn new(encoder: Encoder, transport: Arc<dyn Transport>) -> Self {
        Self { encoder, transport }
    }

    /// Push one reading. Returns immediately; the outcome is only logged
    /// unless the caller decides to await the returned [`Dispatch`].
    pub fn emit(&self, reading: &MetricReading) -> Dispatch {
        let batch = self.encoder.encode_now(reading);
        self.transport.push(batch)
    }
}

impl std::fmt::Debug for MetricEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricEmitter")
            .field("encoder", &self.encoder)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::series;
    use crate::telemetry::transport::MemoryTransport;

    #[tokio::test]
    async fn test_emit_encodes_and_pushes() {
        let transport = Arc::new(MemoryTransport::new());
        let emitter = MetricEmitter::new(Encoder::new("test"), transport.clone());

        emitter
            .emit(&MetricReading::gauge(series::ACTIVE_USERS, 4, series::UNIT_USERS))
            .outcome()
            .await
            .unwrap();

        assert_eq!(transport.last_value(series::ACTIVE_USERS), Some(4));
    }

    #[tokio::test]
    async fn test_failed_push_is_a_value() {
        let transport = Arc::new(MemoryTransport::failing());
        let emitter = MetricEmitter::new(Encoder::default(), transport.clone());

        let outcome = emitter
            .emit(&MetricReading::counter(series::PIZZA_PURCHASES_TOTAL, 1))
            .outcome()
            .await;
        assert!(outcome.is_err());
        assert_eq!(transport.batches().len(), 1);
    }
}
