//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → telemetry::middleware (instrumentation, every route + fallback)
//!     → handlers.rs (stand-ins for the order/franchise/auth collaborators)
//!     → error.rs (JSON error bodies)
//! ```

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use handlers::ORDER_ROUTE;
pub use server::{AppState, HttpServer};
