//! Inference endpoint
//!
//! `POST /infer` is the admission/response boundary: it accepts one input
//! payload, hands it to the batch engine and awaits the routed result. The
//! per-request timeout surfaces as HTTP 504, a downstream batch failure as
//! HTTP 500 and invalid input as HTTP 400 (see the `ResponseError` impl on
//! `GatewayError`).

use crate::server::state::AppState;
use crate::utils::error::GatewayError;
use actix_web::{HttpResponse, Result as ActixResult, web};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Inference request body
#[derive(Debug, Clone, Deserialize)]
pub struct InferRequest {
    /// Opaque input payload
    pub input_text: String,
}

/// Inference response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferResponse {
    /// Output produced by the downstream backend
    pub result: String,
    /// End-to-end latency measured from admission to resolution
    pub latency_ms: f64,
}

/// Configure inference routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/infer", web::post().to(infer));
}

/// Submit one request for batched inference and await its result
pub async fn infer(
    state: web::Data<AppState>,
    request: web::Json<InferRequest>,
) -> ActixResult<HttpResponse, GatewayError> {
    let request = request.into_inner();
    let input_length = request.input_text.len();

    let completed = state.engine.submit(request.input_text).await?;
    let latency_ms = completed.latency.as_secs_f64() * 1000.0;

    info!(
        event = "model_inference",
        input_text_length = input_length,
        latency_ms,
        "inference completed"
    );

    Ok(HttpResponse::Ok().json(InferResponse {
        result: completed.output,
        latency_ms,
    }))
}
