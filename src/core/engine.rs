//! Batch engine: formation scheduler, concurrency limiter, worker pool and
//! result router
//!
//! The engine runs a fixed pool of symmetric worker tasks. Each worker waits
//! for the queue to signal new work, acquires a concurrency permit, sleeps a
//! fixed formation delay so more requests can accumulate, then atomically
//! drains up to the configured batch size and executes the batch against the
//! downstream backend. Results are routed back positionally through each
//! request's result slot; a whole-batch failure resolves every slot in the
//! batch with the same cause. Workers never die on a downstream failure.

use crate::config::BatchingConfig;
use crate::core::backend::InferenceBackend;
use crate::core::metrics::EngineMetrics;
use crate::core::queue::{PendingQueue, PendingRequest};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::utils::error::{GatewayError, Result};

/// How long an idle worker waits on the work signal before re-checking the
/// queue and the shutdown flag.
const WORK_RECHECK_INTERVAL: Duration = Duration::from_millis(50);

/// A successfully resolved inference, as observed by the admitting caller
#[derive(Debug, Clone)]
pub struct CompletedInference {
    /// Output produced by the downstream backend for this request
    pub output: String,
    /// End-to-end latency measured from admission to resolution
    pub latency: Duration,
}

/// Cloneable handle to the dynamic batching engine.
///
/// Callers submit individual requests through [`BatchEngine::submit`]; the
/// worker pool owned by the engine coalesces them into batches behind the
/// scenes.
#[derive(Clone)]
pub struct BatchEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: BatchingConfig,
    queue: PendingQueue,
    limiter: Semaphore,
    metrics: Arc<EngineMetrics>,
    shutdown: AtomicBool,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl BatchEngine {
    /// Start the engine: spawns one worker task per allowed concurrent batch
    /// and returns a handle for submitting requests.
    pub fn spawn(
        config: BatchingConfig,
        backend: Arc<dyn InferenceBackend>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let worker_count = config.max_concurrent_batches;
        let inner = Arc::new(EngineInner {
            limiter: Semaphore::new(config.max_concurrent_batches),
            config,
            queue: PendingQueue::new(),
            metrics,
            shutdown: AtomicBool::new(false),
            workers: parking_lot::Mutex::new(Vec::with_capacity(worker_count)),
        });

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let inner = Arc::clone(&inner);
            let backend = Arc::clone(&backend);
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, inner, backend).await;
            }));
        }
        *inner.workers.lock() = handles;

        info!(workers = worker_count, "batch engine started");

        Self { inner }
    }

    /// Admit one request and await its result.
    ///
    /// The input is validated, a result slot is created, the request is
    /// enqueued and the scheduler signaled, then the caller waits for
    /// resolution up to the configured per-request timeout. A timed-out
    /// request is not retracted from the queue; if a batch later resolves
    /// it, the result lands in a dropped receiver and is discarded.
    pub async fn submit(&self, input: String) -> Result<CompletedInference> {
        if input.is_empty() {
            return Err(GatewayError::validation("input_text must not be empty"));
        }

        let submitted_at = Instant::now();
        let (slot, receiver) = oneshot::channel();
        self.inner.queue.enqueue(PendingRequest {
            input,
            submitted_at,
            slot,
        });

        match tokio::time::timeout(self.inner.config.request_timeout(), receiver).await {
            Ok(Ok(Ok(output))) => Ok(CompletedInference {
                output,
                latency: submitted_at.elapsed(),
            }),
            // Downstream failure: already counted by the worker that owned
            // the batch, so the counter moves by exactly the batch size.
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_recv)) => {
                self.inner.metrics.record_failures(1);
                Err(GatewayError::internal(
                    "request dropped before a batch resolved it",
                ))
            }
            Err(_elapsed) => {
                self.inner.metrics.record_failures(1);
                error!("inference timeout");
                Err(GatewayError::timeout("inference timeout"))
            }
        }
    }

    /// Effective batching configuration
    pub fn config(&self) -> &BatchingConfig {
        &self.inner.config
    }

    /// Engine metrics handle
    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.inner.metrics
    }

    /// Current number of requests waiting to be batched
    pub fn queue_depth(&self) -> usize {
        self.inner.queue.len()
    }

    /// Stop the worker pool gracefully.
    ///
    /// No new batches are formed after this call; batches already executing
    /// run to completion. Requests still queued are never claimed, so their
    /// callers run into the per-request timeout. Final counters are logged
    /// once every worker has exited.
    pub async fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.queue.wake_all();

        let handles: Vec<JoinHandle<()>> = self.inner.workers.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "batch worker terminated abnormally");
            }
        }

        let snapshot = self.inner.metrics.snapshot();
        info!(
            inferences = snapshot.inference_count,
            errors = snapshot.error_count,
            batches = snapshot.batch_count,
            "batch engine stopped"
        );
    }
}

/// The loop each symmetric batch worker runs for the process lifetime.
async fn worker_loop(
    worker_id: usize,
    inner: Arc<EngineInner>,
    backend: Arc<dyn InferenceBackend>,
) {
    debug!(worker_id, "batch worker started");

    loop {
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        // Park until work is signaled, with a periodic re-check so a missed
        // wakeup or a shutdown request never strands the worker.
        if inner.queue.is_empty() {
            let _ = tokio::time::timeout(WORK_RECHECK_INTERVAL, inner.queue.wait_for_work()).await;
            continue;
        }

        // The permit covers the formation delay plus the downstream call, so
        // at most max_concurrent_batches formation+execution cycles run in
        // parallel. Holding it is what pauses queue drainage under load.
        let permit = match inner.limiter.acquire().await {
            Ok(permit) => permit,
            Err(_closed) => break,
        };

        if inner.shutdown.load(Ordering::Acquire) {
            drop(permit);
            break;
        }

        // Fixed formation window: let more requests accumulate before the
        // batch is closed. Constant regardless of arrival rate.
        tokio::time::sleep(inner.config.formation_delay()).await;

        let batch = inner.queue.drain(inner.config.max_batch_size);
        if batch.is_empty() {
            // Another worker drained the queue first; go back to waiting.
            drop(permit);
            continue;
        }

        execute_batch(worker_id, &inner, backend.as_ref(), batch).await;
        drop(permit);
    }

    debug!(worker_id, "batch worker stopped");
}

/// Run one batch against the backend and route every item's outcome back to
/// its caller.
async fn execute_batch(
    worker_id: usize,
    inner: &EngineInner,
    backend: &dyn InferenceBackend,
    batch: Vec<PendingRequest>,
) {
    let batch_id = inner.metrics.begin_batch();
    let batch_size = batch.len();
    info!(worker_id, batch_id, batch_size, "processing batch");

    let inputs: Vec<String> = batch.iter().map(|r| r.input.clone()).collect();
    let batch_start = Instant::now();
    let outcome = backend.batch_infer(inputs).await;
    let processing_time = batch_start.elapsed();
    inner.metrics.record_batch_time(processing_time);

    match outcome {
        Ok(outputs) if outputs.len() == batch_size => {
            inner.metrics.record_successes(batch_size as u64);

            let processing_time_ms = processing_time.as_secs_f64() * 1000.0;
            info!(
                batch_id,
                batch_size,
                processing_time_ms,
                avg_latency_per_item_ms = processing_time_ms / batch_size as f64,
                "batch processed"
            );

            for (request, output) in batch.into_iter().zip(outputs) {
                // A closed slot means the caller already timed out; the late
                // result is discarded.
                let _ = request.slot.send(Ok(output));
            }
        }
        Ok(outputs) => {
            // Backend broke its contract; treat it as a whole-batch failure.
            inner.metrics.record_failures(batch_size as u64);
            error!(
                batch_id,
                expected = batch_size,
                got = outputs.len(),
                "backend returned wrong number of outputs"
            );
            let message = format!(
                "backend returned {} outputs for a batch of {}",
                outputs.len(),
                batch_size
            );
            fail_batch(batch, &message);
        }
        Err(e) => {
            inner.metrics.record_failures(batch_size as u64);
            error!(batch_id, error = %e, "inference error in batch");
            fail_batch(batch, &e.to_string());
        }
    }
}

/// Resolve every request in a failed batch with the same failure cause.
fn fail_batch(batch: Vec<PendingRequest>, message: &str) {
    for request in batch {
        let _ = request
            .slot
            .send(Err(GatewayError::inference(message.to_string())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::EchoBackend;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn test_config(
        max_batch_size: usize,
        batch_timeout_secs: f64,
        max_concurrent_batches: usize,
        request_timeout_secs: f64,
    ) -> BatchingConfig {
        BatchingConfig {
            max_batch_size,
            batch_timeout_secs,
            max_concurrent_batches,
            request_timeout_secs,
        }
    }

    fn spawn_engine(config: BatchingConfig, backend: Arc<dyn InferenceBackend>) -> BatchEngine {
        BatchEngine::spawn(config, backend, Arc::new(EngineMetrics::new()))
    }

    /// Backend that fails every call with the same message.
    struct FailingBackend;

    #[async_trait]
    impl InferenceBackend for FailingBackend {
        async fn batch_infer(&self, _inputs: Vec<String>) -> crate::utils::error::Result<Vec<String>> {
            Err(GatewayError::inference("model unavailable"))
        }
    }

    /// Backend that records every batch it receives, in arrival order.
    #[derive(Default)]
    struct RecordingBackend {
        batches: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl InferenceBackend for RecordingBackend {
        async fn batch_infer(&self, inputs: Vec<String>) -> crate::utils::error::Result<Vec<String>> {
            self.batches.lock().push(inputs.clone());
            Ok(inputs.into_iter().map(|s| format!("echo:{}", s)).collect())
        }
    }

    /// Backend that tracks the maximum number of concurrent calls.
    #[derive(Default)]
    struct ConcurrencyProbeBackend {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl InferenceBackend for ConcurrencyProbeBackend {
        async fn batch_infer(&self, inputs: Vec<String>) -> crate::utils::error::Result<Vec<String>> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(inputs)
        }
    }

    /// Backend that never completes within any reasonable test window.
    struct StalledBackend;

    #[async_trait]
    impl InferenceBackend for StalledBackend {
        async fn batch_infer(&self, inputs: Vec<String>) -> crate::utils::error::Result<Vec<String>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(inputs)
        }
    }

    #[tokio::test]
    async fn test_single_request_echo() {
        let engine = spawn_engine(
            test_config(4, 0.0, 1, 1.0),
            Arc::new(EchoBackend {
                per_item_delay: Some(Duration::ZERO),
            }),
        );

        let completed = engine.submit("hello".to_string()).await.unwrap();
        assert_eq!(completed.output, "echo:hello");
        assert!(completed.latency > Duration::ZERO);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_three_requests_two_batches() {
        // Scenario: batch size 2, no formation delay, one batch in flight at
        // a time. Three near-simultaneous requests must land in a batch of
        // two and a batch of one, all succeeding.
        let backend = Arc::new(RecordingBackend::default());
        let engine = spawn_engine(test_config(2, 0.0, 1, 1.0), backend.clone());

        let (a, b, c) = tokio::join!(
            engine.submit("a".to_string()),
            engine.submit("b".to_string()),
            engine.submit("c".to_string()),
        );
        assert_eq!(a.unwrap().output, "echo:a");
        assert_eq!(b.unwrap().output, "echo:b");
        assert_eq!(c.unwrap().output, "echo:c");

        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.inference_count, 3);
        assert_eq!(snapshot.error_count, 0);

        // No batch may exceed the configured maximum, and concatenating the
        // batches must preserve overall submission coverage.
        let batches = backend.batches.lock();
        assert!(batches.iter().all(|b| b.len() <= 2));
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 3);
        assert_eq!(snapshot.batch_count, batches.len() as u64);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_batch_failure_reaches_every_caller() {
        let engine = spawn_engine(test_config(8, 0.01, 1, 1.0), Arc::new(FailingBackend));

        let (a, b, c) = tokio::join!(
            engine.submit("a".to_string()),
            engine.submit("b".to_string()),
            engine.submit("c".to_string()),
        );
        for outcome in [a, b, c] {
            match outcome {
                Err(GatewayError::Inference(message)) => {
                    assert!(message.contains("model unavailable"))
                }
                other => panic!("expected inference error, got {:?}", other.map(|c| c.output)),
            }
        }

        // Failure counter moves by exactly the number of affected requests.
        assert_eq!(engine.metrics().error_count(), 3);
        assert_eq!(engine.metrics().inference_count(), 0);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_respected() {
        let backend = Arc::new(ConcurrencyProbeBackend::default());
        let engine = spawn_engine(test_config(1, 0.0, 2, 5.0), backend.clone());

        let submissions = (0..8).map(|i| engine.submit(format!("req-{}", i)));
        let results = futures::future::join_all(submissions).await;
        assert!(results.iter().all(|r| r.is_ok()));

        assert!(
            backend.peak.load(Ordering::SeqCst) <= 2,
            "more than max_concurrent_batches downstream calls in flight"
        );

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_request_timeout_is_caller_local() {
        let engine = spawn_engine(test_config(4, 0.0, 1, 0.1), Arc::new(StalledBackend));

        let before = Instant::now();
        let outcome = engine.submit("slow".to_string()).await;
        assert!(matches!(outcome, Err(GatewayError::Timeout(_))));
        // The caller came back at its own timeout, not the backend's.
        assert!(before.elapsed() < Duration::from_secs(5));
        assert_eq!(engine.metrics().error_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_rejected_before_enqueue() {
        let engine = spawn_engine(
            test_config(4, 0.0, 1, 1.0),
            Arc::new(EchoBackend {
                per_item_delay: Some(Duration::ZERO),
            }),
        );

        let outcome = engine.submit(String::new()).await;
        assert!(matches!(outcome, Err(GatewayError::Validation(_))));
        assert_eq!(engine.queue_depth(), 0);
        // Invalid input never reaches the queue, so no counters move.
        assert_eq!(engine.metrics().error_count(), 0);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_oversized_burst_stays_fifo_across_cycles() {
        // A formation window long enough that all requests are queued before
        // the first drain, with batches of at most 2 formed by one worker.
        let backend = Arc::new(RecordingBackend::default());
        let engine = spawn_engine(test_config(2, 0.05, 1, 5.0), backend.clone());

        let submissions = (0..6).map(|i| engine.submit(i.to_string()));
        let results = futures::future::join_all(submissions).await;
        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap().output, format!("echo:{}", i));
        }

        let batches = backend.batches.lock();
        assert!(batches.iter().all(|b| b.len() <= 2));
        let flattened: Vec<String> = batches.iter().flatten().cloned().collect();
        let expected: Vec<String> = (0..6).map(|i| i.to_string()).collect();
        assert_eq!(flattened, expected, "head-of-queue order not preserved");

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_worker_survives_downstream_failure() {
        // Fail once, then verify the pool still forms and executes batches.
        struct FlakyBackend {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl InferenceBackend for FlakyBackend {
            async fn batch_infer(
                &self,
                inputs: Vec<String>,
            ) -> crate::utils::error::Result<Vec<String>> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(GatewayError::inference("transient failure"))
                } else {
                    Ok(inputs.into_iter().map(|s| format!("echo:{}", s)).collect())
                }
            }
        }

        let engine = spawn_engine(
            test_config(4, 0.0, 1, 1.0),
            Arc::new(FlakyBackend {
                calls: AtomicUsize::new(0),
            }),
        );

        assert!(engine.submit("first".to_string()).await.is_err());
        let completed = engine.submit("second".to_string()).await.unwrap();
        assert_eq!(completed.output, "echo:second");

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_reports_final_counters() {
        let engine = spawn_engine(
            test_config(4, 0.0, 2, 1.0),
            Arc::new(EchoBackend {
                per_item_delay: Some(Duration::ZERO),
            }),
        );

        engine.submit("x".to_string()).await.unwrap();
        engine.shutdown().await;

        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.inference_count, 1);

        // After shutdown no new batches form; a late submission times out or
        // observes a dropped slot rather than hanging forever.
        let outcome = engine.submit("late".to_string()).await;
        assert!(outcome.is_err());
    }
}
