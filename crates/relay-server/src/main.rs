use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod auth;
mod config;
mod server;
mod telemetry;

use config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init()?;

    info!("Relay server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env()?;
    config.log_config();

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    server::start(config, shutdown).await?;

    Ok(())
}
