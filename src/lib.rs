//! JWT Pizza service with push-based telemetry.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod telemetry;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{Services, Shutdown};
pub use telemetry::MetricRegistry;
