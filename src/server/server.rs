//! HTTP server core implementation
//!
//! Builds the actix-web application around the shared [`AppState`] and the
//! batch engine, and runs it until the process is stopped.

use crate::config::{Config, ServerConfig};
use crate::core::backend::{EchoBackend, InferenceBackend};
use crate::core::engine::BatchEngine;
use crate::core::metrics::EngineMetrics;
use crate::server::routes;
use crate::server::state::AppState;
use crate::utils::error::{GatewayError, Result};
use actix_cors::Cors;
use actix_web::{
    App, HttpServer as ActixHttpServer,
    middleware::{DefaultHeaders, Logger},
    web,
};
use std::sync::Arc;
use tracing::info;

/// HTTP server
pub struct HttpServer {
    /// Server configuration
    config: ServerConfig,
    /// Application state
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the default echo backend
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_backend(config, Arc::new(EchoBackend::new()))
    }

    /// Create a new HTTP server around an injected inference backend
    pub fn with_backend(config: &Config, backend: Arc<dyn InferenceBackend>) -> Result<Self> {
        info!("Creating HTTP server");

        let metrics = Arc::new(EngineMetrics::new());
        let engine = BatchEngine::spawn(config.batching.clone(), backend, Arc::clone(&metrics));
        let state = AppState::new(config.clone(), engine, metrics);

        Ok(Self {
            config: config.server.clone(),
            state,
        })
    }

    /// Create the Actix-web application
    fn create_app(
        state: web::Data<AppState>,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(state)
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .wrap(DefaultHeaders::new().add(("Server", "batchgate")))
            .configure(routes::infer::configure_routes)
            .configure(routes::health::configure_routes)
    }

    /// Start the HTTP server.
    ///
    /// Blocks until the server stops, then drains the batch engine so
    /// in-flight batches complete and final counters are logged.
    pub async fn start(self) -> Result<()> {
        let bind_addr = self.config.address();
        let workers = self.config.worker_count();

        info!("Starting HTTP server on {}", bind_addr);

        let state = web::Data::new(self.state);
        let engine = state.engine.clone();

        let server = ActixHttpServer::new({
            let state = state.clone();
            move || Self::create_app(state.clone())
        })
        .workers(workers)
        .bind(&bind_addr)
        .map_err(|e| GatewayError::server(format!("Failed to bind {}: {}", bind_addr, e)))?
        .run();

        info!("HTTP server listening on {}", bind_addr);

        let outcome = server
            .await
            .map_err(|e| GatewayError::server(format!("Server error: {}", e)));

        engine.shutdown().await;
        info!("HTTP server stopped");
        outcome
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get application state
    pub fn state(&self) -> &AppState {
        &self.state
    }
}
