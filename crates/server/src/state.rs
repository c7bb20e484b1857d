//! Application state shared across handlers.

use crate::engine::BlobEngine;
use hoard_core::config::AppConfig;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Blob engine; not ready until the backend connects.
    pub engine: BlobEngine,
}

impl AppState {
    /// Create state with an engine behind a closed gate.
    pub fn new(config: AppConfig) -> Self {
        let engine = BlobEngine::new(config.blob.clone());
        Self {
            config: Arc::new(config),
            engine,
        }
    }
}
