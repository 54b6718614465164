//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`downloads`] - Submission, status, artifact retrieval, preview
//! - [`system`] - Health, events, OpenAPI, shutdown

mod downloads;
mod system;

// Re-export all handlers so `routes::function_name` continues to work
pub use downloads::*;
pub use system::*;
