//! # batchgate
//!
//! A dynamic request-batching inference gateway. Individual inference
//! requests are admitted over HTTP, coalesced into batches under a
//! size/time policy, executed against an injectable downstream backend with
//! bounded concurrency, and routed back to the originating callers.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use batchgate::{Config, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let gateway = Gateway::new(config)?;
//!     gateway.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Embedding the engine
//!
//! The batching core is usable without the HTTP layer: implement
//! [`InferenceBackend`] for your model and drive [`BatchEngine`] directly.

#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod server;
pub mod utils;

// Re-export main types
pub use config::{BatchingConfig, Config, ServerConfig};
pub use core::backend::{EchoBackend, InferenceBackend};
pub use core::engine::{BatchEngine, CompletedInference};
pub use core::metrics::{EngineMetrics, MetricsSnapshot};
pub use utils::error::{GatewayError, Result};

use tracing::info;

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// A batching inference gateway: configuration plus HTTP server
pub struct Gateway {
    server: server::HttpServer,
}

impl Gateway {
    /// Create a new gateway instance with the default echo backend
    pub fn new(config: Config) -> Result<Self> {
        info!("Creating new gateway instance");

        let server = server::HttpServer::new(&config)?;

        Ok(Self { server })
    }

    /// Create a gateway around a custom inference backend
    pub fn with_backend(
        config: Config,
        backend: std::sync::Arc<dyn InferenceBackend>,
    ) -> Result<Self> {
        let server = server::HttpServer::with_backend(&config, backend)?;
        Ok(Self { server })
    }

    /// Run the gateway server until it stops
    pub async fn run(self) -> Result<()> {
        info!("Starting batchgate");

        self.server.start().await
    }
}
