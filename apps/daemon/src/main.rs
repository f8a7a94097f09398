use anyhow::Result;
use clap::Parser;
use http_relay_daemon::{Args, Config, TunnelEndpoint};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("HTTP Relay Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Local service: {}", args.local);
    info!("Tunnel endpoint: {}", args.endpoint);

    // Build configuration
    let config = Config::from_args(args)?;

    let endpoint = TunnelEndpoint::new(config)?;

    // Run until interrupted
    tokio::select! {
        result = endpoint.run() => {
            error!("Tunnel endpoint exited: {:?}", result);
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down gracefully...");
        }
    }

    Ok(())
}
