use std::process::ExitCode;
use std::sync::Arc;

use mentor_relay::{serve, RelayConfig, RelayState};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = RelayConfig::from_env();

    // RUST_LOG wins over MENTOR_RELAY_LOG
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    let listener = match TcpListener::bind(&config.addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %config.addr, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    if config.access_token.is_none() {
        warn!("MENTOR_RELAY_TOKEN not set, accepting any connect frame");
    }
    info!(
        addr = %config.addr,
        max_pending = config.max_pending,
        "Mentor relay listening"
    );

    let state = Arc::new(RelayState::from_config(&config));
    serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    })
    .await;

    ExitCode::SUCCESS
}
