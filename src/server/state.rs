//! Application state shared across HTTP handlers

use crate::config::Config;
use crate::core::engine::BatchEngine;
use crate::core::metrics::EngineMetrics;
use std::sync::Arc;

/// HTTP server state shared across handlers
///
/// Contains the shared resources every request handler needs: the read-only
/// configuration, the batching engine handle and the engine metrics.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration (shared read-only)
    pub config: Arc<Config>,
    /// Dynamic batching engine handle
    pub engine: BatchEngine,
    /// Engine counters
    pub metrics: Arc<EngineMetrics>,
}

impl AppState {
    /// Create a new AppState with shared resources
    pub fn new(config: Config, engine: BatchEngine, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            metrics,
        }
    }

    /// Get gateway configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
