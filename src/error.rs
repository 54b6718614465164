//! Error types for media-dl
//!
//! This module provides comprehensive error handling for the library, including:
//! - Domain-specific error types (Job, Fetch, Broker, etc.)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes
//! - Context information (job id, timeout, exit status, etc.)

use crate::types::{JobId, JobState};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "DOWNLOAD_DIR")
        key: Option<String>,
    },

    /// Request rejected before a job was created
    ///
    /// The message is surfaced to the client verbatim, so it carries no prefix.
    #[error("{0}")]
    Validation(String),

    /// Job lifecycle error
    #[error("download error: {0}")]
    Job(#[from] JobError),

    /// Media fetch error
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// External queue backend error
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Job lifecycle errors
#[derive(Debug, Error)]
pub enum JobError {
    /// Job not found in the store
    #[error("download {id} not found")]
    NotFound {
        /// The job id that was not found
        id: JobId,
    },

    /// Attempted state transition the lifecycle forbids
    ///
    /// Terminal states are frozen. Re-asserting the outcome a job already
    /// has is not an error; only a contradicting transition is.
    #[error("cannot move download {id} from {from} to {to}")]
    InvalidTransition {
        /// The job id whose transition was rejected
        id: JobId,
        /// The state the job is currently in
        from: JobState,
        /// The state the caller tried to move it to
        to: JobState,
    },
}

/// Media fetch errors (yt-dlp invocation, timeout, output resolution)
#[derive(Debug, Error)]
pub enum FetchError {
    /// The fetcher binary could not be found
    #[error("media fetcher not available: {0}")]
    ToolMissing(String),

    /// The fetcher process exited with a failure status
    #[error("media fetcher failed: {stderr}")]
    ToolFailed {
        /// Process exit code, when the process was not killed by a signal
        exit_code: Option<i32>,
        /// Tail of the process standard error output
        stderr: String,
    },

    /// The fetch exceeded the configured time limit
    #[error("download timed out after {seconds} seconds")]
    TimedOut {
        /// The configured per-fetch timeout in seconds
        seconds: u64,
    },

    /// The fetcher reported success but no output file could be located
    #[error("no output file found for download {id} in {}", .dir.display())]
    OutputNotFound {
        /// The job whose output is missing
        id: JobId,
        /// The directory that was searched
        dir: PathBuf,
    },

    /// The fetcher produced metadata that could not be parsed
    #[error("invalid metadata from fetcher: {0}")]
    InvalidMetadata(String),

    /// I/O error while spawning or reading the fetcher process
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// External queue backend errors
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The startup availability probe failed
    #[error("broker probe failed: {0}")]
    ProbeFailed(String),

    /// Task submission was rejected or unreachable
    #[error("task submission failed: {0}")]
    SubmitFailed(String),

    /// Task status query was rejected or unreachable
    #[error("task status query failed: {0}")]
    StatusFailed(String),

    /// The broker returned a payload that could not be interpreted
    #[error("unexpected broker response: {0}")]
    InvalidResponse(String),
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
/// It follows a standard format with machine-readable error codes,
/// human-readable messages, and optional contextual details.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "download_not_found",
///     "message": "download error: download abc-123 not found",
///     "details": {
///       "downloadId": "abc-123"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    ///
    /// Clients can use this for programmatic error handling.
    pub code: String,

    /// Human-readable error message
    ///
    /// This is suitable for displaying to end users.
    pub message: String,

    /// Optional additional context about the error
    ///
    /// This can include fields like downloadId, timeout values, exit codes, etc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create a "not ready" error for artifacts requested before completion
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::new("not_ready", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Create a "service unavailable" error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("service_unavailable", message)
    }
}

/// Convert errors to HTTP status codes for API responses
///
/// This trait maps domain errors to appropriate HTTP status codes.
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::Validation(_) => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Job(JobError::NotFound { .. }) => 404,
            Error::Fetch(FetchError::OutputNotFound { .. }) => 404,

            // 409 Conflict - Lifecycle violation
            Error::Job(JobError::InvalidTransition { .. }) => 409,

            // 422 Unprocessable Entity - Semantic errors
            Error::Fetch(FetchError::InvalidMetadata(_)) => 422,

            // 500 Internal Server Error - Server-side issues
            Error::Io(_) => 500,
            Error::Fetch(FetchError::Io(_)) => 500,
            Error::ApiServerError(_) => 500,
            Error::Serialization(_) => 500,

            // 502 Bad Gateway - External service or tool errors
            Error::Fetch(FetchError::ToolFailed { .. }) => 502,
            Error::Broker(_) => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
            Error::Fetch(FetchError::ToolMissing(_)) => 503,

            // 504 Gateway Timeout
            Error::Fetch(FetchError::TimedOut { .. }) => 504,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::Job(e) => match e {
                JobError::NotFound { .. } => "download_not_found",
                JobError::InvalidTransition { .. } => "invalid_transition",
            },
            Error::Fetch(e) => match e {
                FetchError::ToolMissing(_) => "fetch_tool_missing",
                FetchError::ToolFailed { .. } => "fetch_failed",
                FetchError::TimedOut { .. } => "fetch_timeout",
                FetchError::OutputNotFound { .. } => "output_not_found",
                FetchError::InvalidMetadata(_) => "invalid_metadata",
                FetchError::Io(_) => "io_error",
            },
            Error::Broker(e) => match e {
                BrokerError::ProbeFailed(_) => "broker_probe_failed",
                BrokerError::SubmitFailed(_) => "broker_submit_failed",
                BrokerError::StatusFailed(_) => "broker_status_failed",
                BrokerError::InvalidResponse(_) => "broker_invalid_response",
            },
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        // Add contextual details for specific error types
        let details = match &error {
            Error::Job(JobError::NotFound { id }) => Some(serde_json::json!({
                "downloadId": id,
            })),
            Error::Job(JobError::InvalidTransition { id, from, to }) => Some(serde_json::json!({
                "downloadId": id,
                "from": from.as_str(),
                "to": to.as_str(),
            })),
            Error::Fetch(FetchError::TimedOut { seconds }) => Some(serde_json::json!({
                "timeoutSeconds": seconds,
            })),
            Error::Fetch(FetchError::ToolFailed { exit_code, stderr }) => {
                Some(serde_json::json!({
                    "exitCode": exit_code,
                    "stderr": stderr,
                }))
            }
            Error::Fetch(FetchError::OutputNotFound { id, dir }) => Some(serde_json::json!({
                "downloadId": id,
                "directory": dir,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
