//! Basic download example
//!
//! This example demonstrates the core functionality of media-dl:
//! - Building a configuration in code
//! - Creating a dispatcher instance
//! - Subscribing to lifecycle events
//! - Submitting a download
//! - Polling until the job reaches a terminal state
//!
//! Requires a `yt-dlp` binary on PATH.

use media_dl::{Config, Dispatcher, Event, SubmitRequest};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // tracing_subscriber::fmt::init();

    // Build configuration
    let mut config = Config::default();
    config.download.download_dir = "downloads".into();
    config.download.max_concurrent_fetches = 2;

    // Create dispatcher instance
    let dispatcher = Arc::new(Dispatcher::new(config).await?);

    // Subscribe to events
    let mut events = dispatcher.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Queued { id, url } => {
                    println!("✓ Queued download {}: {}", id, url);
                }
                Event::Started { id } => {
                    println!("▶ Download {} started", id);
                }
                Event::Progress { id, percent } => {
                    println!("⬇ Download {}: {:.1}%", id, percent);
                }
                Event::Finished { id, artifact_path } => {
                    println!("✓ Finished {}: {:?}", id, artifact_path);
                }
                Event::Failed { id, error } => {
                    println!("✗ Failed {}: {}", id, error);
                }
                Event::Shutdown => break,
            }
        }
    });

    // Submit a download
    let job = dispatcher
        .submit(SubmitRequest {
            url: "https://www.youtube.com/watch?v=jNQXAC9IVRw".to_string(),
            format: "mp4".to_string(),
            filename: None,
        })
        .await?;

    println!("Submitted download with ID: {}", job.id);

    // Poll until the job reaches a terminal state
    loop {
        let job = dispatcher.status(&job.id).await?;
        if job.state.is_terminal() {
            println!("Final state: {}", job.state);
            if let Some(path) = job.artifact_path {
                println!("Artifact: {:?}", path);
            }
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    dispatcher.shutdown().await;
    Ok(())
}
