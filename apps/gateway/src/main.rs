//! Relay gateway server
//!
//! Serves the tunnel attach path, the daemon register endpoint and the
//! forwarding fallback until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use http_relay_common::constants::SESSION_SWEEP_INTERVAL_SECS;
use http_relay_gateway::config::{Args, Config};
use http_relay_gateway::handlers::spawn_cleanup;
use http_relay_gateway::{AppState, SessionRegistry, build_router};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("HTTP Relay Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_args(args)?;
    let listen = config.listen;
    info!(
        max_sessions = config.max_sessions,
        request_timeout = ?config.request_timeout,
        "Gateway configured"
    );

    let state = AppState::new(config);
    let cleanup = spawn_cleanup(
        state.registry.clone(),
        Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS),
    );

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    info!("Listening on {}", listen);

    axum::serve(listener, build_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal(state.registry.clone()))
        .await
        .context("Server error")?;

    cleanup.abort();
    info!("Gateway stopped");
    Ok(())
}

/// Resolve on Ctrl-C after telling attached daemons to go away
async fn shutdown_signal(registry: Arc<SessionRegistry>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }

    info!("Received Ctrl-C, shutting down gracefully...");
    registry.shutdown();
}
