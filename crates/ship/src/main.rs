use clap::Parser;
use sealink_ship::{serve, Cli, ShipError};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> sealink_ship::Result<()> {
    let config = cli.config();

    info!(
        "sealink-ship v{} - offshore peer {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.offshore_host,
        config.offshore_port
    );

    // Fail fast on a host that will never resolve. Transient resolution and
    // connection trouble at runtime is the reconnect loop's job.
    tokio::net::lookup_host((config.offshore_host.as_str(), config.offshore_port))
        .await
        .map_err(|e| ShipError::Resolve {
            host: config.offshore_host.clone(),
            source: e,
        })?;

    let listener = TcpListener::bind(("0.0.0.0", cli.listen_port)).await?;
    info!("HTTP proxy listening on port {}", cli.listen_port);

    tokio::select! {
        result = serve(listener, config) => result,
        _ = shutdown_signal() => {
            info!("Received shutdown signal, shutting down...");
            Ok(())
        }
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
