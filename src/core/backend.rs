//! Downstream inference backend
//!
//! The batch engine is agnostic to how a batch is actually computed; it
//! only requires an implementation of [`InferenceBackend`]. The contract is
//! strict: one output per input, in the same order, or a failure for the
//! whole call. Partial results are not modeled at this layer.

use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A downstream compute step that turns a batch of inputs into a batch of
/// outputs of equal length.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run inference for a whole batch.
    ///
    /// Returns one output per input, positionally, or an error for the
    /// entire batch.
    async fn batch_infer(&self, inputs: Vec<String>) -> Result<Vec<String>>;
}

/// Echo backend used as the default stand-in for a real model.
///
/// Simulates batched inference by sleeping proportionally to the batch size
/// and returning `echo:<input>` for each item.
#[derive(Debug, Clone, Default)]
pub struct EchoBackend {
    /// Simulated per-item processing time
    pub per_item_delay: Option<Duration>,
}

impl EchoBackend {
    /// Create an echo backend with the default 1 ms per-item delay
    pub fn new() -> Self {
        Self::default()
    }

    fn delay_for(&self, items: usize) -> Duration {
        self.per_item_delay
            .unwrap_or(Duration::from_millis(1))
            .saturating_mul(items as u32)
    }
}

#[async_trait]
impl InferenceBackend for EchoBackend {
    async fn batch_infer(&self, inputs: Vec<String>) -> Result<Vec<String>> {
        tokio::time::sleep(self.delay_for(inputs.len())).await;
        Ok(inputs.into_iter().map(|s| format!("echo:{}", s)).collect())
    }
}
