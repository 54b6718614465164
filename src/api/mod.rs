//! REST API server module
//!
//! Provides the REST API for submitting downloads, polling their state,
//! and retrieving finished files.

use crate::{Config, Dispatcher, Result};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Downloads
/// - `POST /download` - Submit a media URL for download
/// - `GET /download/status/:download_id` - Get download state
/// - `GET /download/file/:download_id` - Retrieve the finished file
/// - `POST /preview` - Retrieve media metadata without downloading
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
/// - `POST /shutdown` - Graceful shutdown
pub fn create_router(dispatcher: Arc<Dispatcher>, config: Arc<Config>) -> Router {
    let state = AppState::new(dispatcher, config.clone());

    // Build the router with all routes
    let router = Router::new()
        // Downloads
        .route("/download", post(routes::submit_download))
        .route("/download/status/:download_id", get(routes::download_status))
        .route("/download/file/:download_id", get(routes::download_file))
        .route("/preview", post(routes::preview_media))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream))
        .route("/shutdown", post(routes::shutdown));

    // Merge Swagger UI routes if enabled in config (before applying state).
    // The UI serves its own copy of the spec under /api-docs so the plain
    // /openapi.json route above stays available even with the UI disabled.
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    // Add state to all routes, then request tracing as the outermost layer
    router.with_state(state).layer(TraceLayer::new_for_http())
}

/// Start the API server on the configured bind address.
///
/// This function creates a TCP listener, binds it to the configured address,
/// and starts serving the API router. It runs until the server is shut down.
///
/// # Arguments
///
/// * `dispatcher` - Arc-wrapped Dispatcher instance to handle API requests
/// * `config` - Arc-wrapped Config containing API configuration
///
/// # Returns
///
/// Returns a Result<()> that completes when the server stops, either due to
/// an error or graceful shutdown.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, Dispatcher};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let dispatcher = Arc::new(Dispatcher::new(config.clone()).await?);
///
/// // Start API server (blocks until shutdown)
/// media_dl::api::start_api_server(dispatcher, Arc::new(config)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(dispatcher: Arc<Dispatcher>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    // Create the router with all routes
    let app = create_router(dispatcher, config);

    // Bind TCP listener to the configured address
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    // Serve the API using the listener
    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
