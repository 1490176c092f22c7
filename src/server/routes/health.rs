//! Health, metrics and configuration endpoints
//!
//! Read-only introspection of the gateway: a liveness probe, the engine
//! counters and the effective batching configuration. None of these have
//! side effects.

use crate::server::routes::ApiResponse;
use crate::server::state::AppState;
use actix_web::{HttpResponse, Result as ActixResult, web};
use std::borrow::Cow;
use tracing::debug;

/// Configure health check routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/healthz", web::get().to(health_check))
        .route("/metrics", web::get().to(metrics))
        .route("/config", web::get().to(get_config))
        .route("/version", web::get().to(version_info));
}

/// Basic health check endpoint
///
/// Returns a simple health status indicating the service is running. Used
/// by load balancers and readiness probes.
pub async fn health_check(_state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    debug!("Health check requested");

    let health_status = HealthStatus {
        status: Cow::Borrowed("ok"),
        timestamp: chrono::Utc::now(),
        version: Cow::Borrowed(env!("CARGO_PKG_VERSION")),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(health_status)))
}

/// Engine metrics endpoint
///
/// Reports the monotone counters of the batch engine: successes, failures,
/// batches formed and the average batch processing time (zero before any
/// batch has run).
pub async fn metrics(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    debug!("Metrics requested");

    let snapshot = state.metrics.snapshot();
    Ok(HttpResponse::Ok().json(ApiResponse::success(snapshot)))
}

/// Effective configuration endpoint
///
/// Exposes the batching parameters the engine was started with. They are
/// immutable for the process lifetime.
pub async fn get_config(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    debug!("Config requested");

    Ok(HttpResponse::Ok().json(ApiResponse::success(state.config.batching().clone())))
}

/// Version information endpoint
pub async fn version_info() -> ActixResult<HttpResponse> {
    debug!("Version info requested");

    let version_info = VersionInfo {
        version: Cow::Borrowed(env!("CARGO_PKG_VERSION")),
        build_time: Cow::Borrowed(env!("BUILD_TIME")),
        git_hash: Cow::Borrowed(env!("GIT_HASH")),
        rust_version: Cow::Borrowed(env!("RUST_VERSION")),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(version_info)))
}

/// Basic health status
#[derive(Debug, Clone, serde::Serialize)]
struct HealthStatus {
    status: Cow<'static, str>,
    timestamp: chrono::DateTime<chrono::Utc>,
    version: Cow<'static, str>,
}

/// Version information
#[derive(Debug, Clone, serde::Serialize)]
struct VersionInfo {
    version: Cow<'static, str>,
    build_time: Cow<'static, str>,
    git_hash: Cow<'static, str>,
    rust_version: Cow<'static, str>,
}
