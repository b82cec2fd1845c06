//! Telemetry subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → middleware.rs (counters, active users, order totals)   ─┐
//!                                                               ├→ registry.rs
//! every period                                                  │
//!     → exporter.rs (host.rs sample + registry aggregates)     ─┘
//!
//! both then, without waiting:
//!     → emitter.rs → encoder.rs (one OTLP JSON envelope per reading)
//!                  → transport.rs (spawned POST to the ingest endpoint)
//! ```
//!
//! # Design Decisions
//! - The registry is constructed once in `main` and shared via `Arc`
//! - Nothing on the request path waits on network I/O
//! - Push failures are logged and dropped; there is no retry queue
//! - In-flight pushes are capped so an outage cannot grow them without bound

pub mod emitter;
pub mod encoder;
pub mod exporter;
pub mod host;
pub mod middleware;
pub mod registry;
pub mod series;
pub mod transport;

pub use emitter::MetricEmitter;
pub use encoder::{Encoder, MetricBatch};
pub use exporter::{CycleReport, PeriodicExporter};
pub use host::{HostSampler, SystemSampler};
pub use middleware::{track_requests, OrderEndpoint, RequestInstrumentation};
pub use registry::{MetricRegistry, RegistrySnapshot, RouteKey};
pub use series::{MetricKind, MetricReading};
pub use transport::{Dispatch, HttpTransport, MemoryTransport, NoopTransport, Transport, TransportError};
