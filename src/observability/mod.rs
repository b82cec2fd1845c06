//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → crate::telemetry (pushed metrics)
//! ```

pub mod logging;
