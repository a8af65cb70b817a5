use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use glacier_api::{create_router, AppState, ClientHub};
use glacier_core::{
    bootstrap::{init_services, load_config},
    logging,
};

/// Relay Mastodon hashtag streams to browser walls
#[derive(Debug, Parser)]
#[command(name = "glacier", version, about)]
struct Args {
    /// Path to a YAML config file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration (validated, fails fast)
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Glacier starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Wire services around the wall hub
    let hub = ClientHub::new();
    let services = init_services(&config, Arc::new(hub.clone()))?;
    let router = create_router(AppState::new(&services, hub, &config));

    // 4. Serve until a shutdown signal arrives
    let listener = tokio::net::TcpListener::bind(config.http_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.http_address()))?;
    info!("HTTP server listening on {}", config.http_address());

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("HTTP server error: {}", e);
    }

    // 5. Stop upstream listeners and pending disconnect timers
    services.shutdown();
    info!("Glacier stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C, shutting down"); }
        () = terminate => { info!("Received SIGTERM, shutting down"); }
    }
}
