use clap::Parser;
use sealink_shore::{serve, Cli};
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

async fn run(cli: Cli) -> sealink_shore::Result<()> {
    let config = cli.config();

    info!("sealink-shore v{}", env!("CARGO_PKG_VERSION"));

    let listener = TcpListener::bind((cli.bind.as_str(), cli.listen_port)).await?;
    info!("link listener on {}:{}", cli.bind, cli.listen_port);

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
