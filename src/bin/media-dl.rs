//! Server binary: loads configuration from the environment and serves the
//! REST API until SIGTERM/SIGINT.

use media_dl::{Config, Dispatcher};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present, before reading any configuration
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let dispatcher = Arc::new(Dispatcher::new(config).await?);

    let api_handle = dispatcher.spawn_api_server();

    media_dl::run_with_shutdown(&dispatcher).await;

    // The server task holds its own dispatcher clone, stop it explicitly
    api_handle.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
