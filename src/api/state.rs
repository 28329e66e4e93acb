//! Application state for the API server

use crate::{Config, ExportManager};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request; both fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// The export manager
    pub manager: ExportManager,

    /// Configuration the manager was built with
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(manager: ExportManager) -> Self {
        let config = manager.config.clone();
        Self { manager, config }
    }
}
