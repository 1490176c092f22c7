//! Core batching engine
//!
//! This module contains the dynamic request-batching machinery: the
//! downstream backend trait, the pending request queue, the batch engine
//! (formation scheduler, concurrency limiter, worker pool, result router)
//! and the engine metrics.

pub mod backend;
pub mod engine;
pub mod metrics;
pub mod queue;

pub use backend::{EchoBackend, InferenceBackend};
pub use engine::{BatchEngine, CompletedInference};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use queue::{PendingQueue, PendingRequest};
