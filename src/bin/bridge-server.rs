//! # Integration Bridge Server
//!
//! Standalone bridge runtime: loads configuration, starts the bootstrap scheduler and
//! serves `GET /health`.
//!
//! ## Usage
//!
//! ```bash
//! # Run with config/bridge.toml or defaults
//! cargo run --bin bridge-server
//!
//! # Run with an explicit file and environment
//! BRIDGE_CONFIG=/etc/bridge/bridge.toml BRIDGE_ENV=production cargo run --bin bridge-server
//! ```
//!
//! Integration modules are discovered by the embedding application; this binary runs the
//! bridge with the configured service probes only.

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use integration_bridge::bridge::IntegrationBridgeBuilder;
use integration_bridge::config::ConfigManager;
use integration_bridge::logging;
use integration_bridge::web;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();

    info!("Starting Integration Bridge Server...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let manager = ConfigManager::load().context("failed to load bridge configuration")?;
    info!("   Environment: {}", manager.environment());
    match manager.source() {
        Some(path) => info!("   Configuration: {}", path.display()),
        None => info!("   Configuration: built-in defaults"),
    }

    let bridge = IntegrationBridgeBuilder::new(manager.config().clone())
        .build()
        .context("failed to assemble integration bridge")?;
    bridge.start().context("failed to start integration bridge")?;

    let bind_address = manager.config().web.bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind to {bind_address}"))?;
    info!("   Health endpoint: http://{bind_address}/health");
    info!("   Press Ctrl+C to shutdown gracefully");

    let app = web::create_app(bridge.health_manager().clone());
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Health server error: {}", e);
    }

    info!("Shutdown signal received, stopping bridge...");
    bridge.shutdown().await;
    info!("Integration Bridge Server shutdown complete");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
