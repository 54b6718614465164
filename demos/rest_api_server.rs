//! REST API server example
//!
//! This example shows how to run media-dl with the REST API enabled,
//! allowing control via HTTP endpoints.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:8000/swagger-ui
//! - Submit downloads via POST http://localhost:8000/download
//! - Poll progress via GET http://localhost:8000/download/status/{id}
//! - Stream events via GET http://localhost:8000/events

use media_dl::api::start_api_server;
use media_dl::{Config, Dispatcher};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // tracing_subscriber::fmt::init();

    // Build configuration
    let mut config = Config::default();
    config.download.download_dir = "downloads".into();
    config.api.bind_address = "127.0.0.1:8000".parse::<SocketAddr>()?;
    config.api.swagger_ui = true;

    // Create dispatcher instance
    let dispatcher = Arc::new(Dispatcher::new(config).await?);

    println!("🚀 Starting media-dl REST API server");
    println!("📖 Swagger UI: http://localhost:8000/swagger-ui");
    println!("🔄 Events stream: http://localhost:8000/events");
    println!();
    println!("Example commands:");
    println!("  # Submit a download");
    println!("  curl -X POST http://localhost:8000/download \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"url\": \"https://www.youtube.com/watch?v=abc\", \"format\": \"mp4\"}}'");
    println!();
    println!("  # Poll its status");
    println!("  curl http://localhost:8000/download/status/<downloadId>");
    println!();
    println!("  # Stream events (Server-Sent Events)");
    println!("  curl -N http://localhost:8000/events");

    // Start the API server (runs indefinitely)
    start_api_server(dispatcher.clone(), dispatcher.get_config()).await?;

    Ok(())
}
