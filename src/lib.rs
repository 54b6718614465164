//! # media-dl
//!
//! Backend service for asynchronous media downloads driven by yt-dlp.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Asynchronous** - Submission returns immediately, work happens in the background
//! - **Bounded** - A fixed number of downloads run concurrently, the rest wait their turn
//! - **Backend-agnostic** - Jobs run on a local worker pool, or on a remote task broker
//!   when one is reachable at startup
//! - **Event-driven** - Consumers subscribe to lifecycle events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, Dispatcher, SubmitRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let dispatcher = Arc::new(Dispatcher::new(config).await?);
//!
//!     // Serve the REST API in the background
//!     let api_handle = dispatcher.spawn_api_server();
//!
//!     // Subscribe to lifecycle events
//!     let mut events = dispatcher.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Submit a download directly through the library API
//!     let job = dispatcher
//!         .submit(SubmitRequest {
//!             url: "https://example.com/watch?v=abc".to_string(),
//!             format: "best".to_string(),
//!             filename: None,
//!         })
//!         .await?;
//!     println!("queued {}", job.id);
//!
//!     // Run until SIGTERM/SIGINT, then drain gracefully
//!     media_dl::run_with_shutdown(&dispatcher).await;
//!     api_handle.abort();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Job dispatch across execution backends
pub mod dispatcher;
/// Error types
pub mod error;
/// Media fetching via external tools
pub mod fetcher;
/// In-memory job store
pub mod store;
/// Core types and events
pub mod types;
/// Request validation
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{
    ApiError, BrokerError, Error, ErrorDetail, FetchError, JobError, Result, ToHttpStatus,
};
pub use fetcher::{FetchRequest, MediaFetcher, YtDlpFetcher, resolve_produced_file};
pub use store::JobStore;
pub use types::{
    Event, FormatOption, HealthStatus, Job, JobId, JobInfo, JobState, PreviewInfo, PreviewRequest,
    StatusResponse, SubmitRequest, SubmitResponse,
};

/// Helper function to run the dispatcher with graceful signal handling.
///
/// Waits for a termination signal and then calls the dispatcher's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, Dispatcher, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let dispatcher = Dispatcher::new(config).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(&dispatcher).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(dispatcher: &Dispatcher) {
    wait_for_signal().await;
    dispatcher.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
