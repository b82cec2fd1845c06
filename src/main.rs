//! JWT Pizza service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request     ┌──────────────────────────────────────────────┐
//!     ───────────────────┼─▶ trace / request-id / panic / timeout        │
//!                        │        │                                     │
//!                        │        ▼                                     │
//!                        │  ┌───────────────┐      ┌───────────────┐    │
//!                        │  │ instrumentation│────▶│   registry    │    │
//!                        │  └──────┬────────┘      └──────┬────────┘    │
//!                        │         ▼                      │             │
//!     Client Response    │  ┌───────────────┐             ▼             │
//!     ◀──────────────────┼──│   handlers    │      ┌───────────────┐    │
//!                        │  └───────────────┘      │   periodic    │    │
//!                        │                         │   exporter    │    │
//!                        │  completion pushes      └──────┬────────┘    │
//!                        │         │                      │             │
//!                        │         ▼                      ▼             │
//!                        │  ┌────────────────────────────────────┐      │
//!                        │  │  emitter → encoder → transport     │──────┼──▶ OTLP ingest
//!                        │  └────────────────────────────────────┘      │
//!                        └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use pizza_service::config::load_config;
use pizza_service::lifecycle::signals::wait_for_signal;
use pizza_service::lifecycle::{Services, Shutdown};
use pizza_service::observability::logging;

#[derive(Parser)]
#[command(name = "pizza-service")]
#[command(about = "JWT Pizza service with push-based telemetry", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    logging::init(&config.observability);

    tracing::info!("pizza-service v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.http.request_timeout_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let services = Services::build(config)?;
    let shutdown = Shutdown::new();

    let exporter_task = services.exporter.map(|exporter| {
        let rx = shutdown.subscribe();
        tokio::spawn(exporter.run(rx))
    });

    let server_shutdown = shutdown.subscribe();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.trigger();
    });

    services.server.run(listener, server_shutdown).await?;

    if let Some(task) = exporter_task {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
