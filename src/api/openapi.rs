//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the media-dl REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the media-dl REST API
///
/// This struct is used to generate the OpenAPI 3.1 specification that describes
/// all available endpoints, request/response types, and API behavior.
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-dl REST API",
        version = "0.1.0",
        description = "REST API for submitting media URLs and retrieving downloaded files asynchronously",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server")
    ),
    paths(
        // Downloads
        crate::api::routes::submit_download,
        crate::api::routes::download_status,
        crate::api::routes::download_file,
        crate::api::routes::preview_media,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
        crate::api::routes::shutdown,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::JobId,
        crate::types::JobState,
        crate::types::JobInfo,
        crate::types::SubmitRequest,
        crate::types::SubmitResponse,
        crate::types::StatusResponse,
        crate::types::PreviewRequest,
        crate::types::PreviewInfo,
        crate::types::FormatOption,
        crate::types::HealthStatus,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "downloads", description = "Download management - Submit URLs, poll status, retrieve artifacts"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events, shutdown"),
    )
)]
pub struct ApiDoc;
