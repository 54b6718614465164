//! Application state for the API server

use crate::{Config, Dispatcher};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clone) and provides
/// access to the dispatcher instance and configuration.
#[derive(Clone)]
pub struct AppState {
    /// The main Dispatcher instance
    pub dispatcher: Arc<Dispatcher>,

    /// Configuration (read access only, the dispatcher holds its own copy)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(dispatcher: Arc<Dispatcher>, config: Arc<Config>) -> Self {
        Self { dispatcher, config }
    }
}
