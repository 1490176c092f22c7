//! Engine metrics
//!
//! Process-wide counters updated atomically by the batch workers and the
//! admission path. All counters are monotonically non-decreasing for the
//! life of the process; they reset only on restart.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared counters and accumulators for the batch engine
pub struct EngineMetrics {
    inference_count: AtomicU64,
    error_count: AtomicU64,
    batch_count: AtomicU64,
    total_batch_time_micros: AtomicU64,
    started_at: Instant,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a fresh set of counters, anchored at process start
    pub fn new() -> Self {
        Self {
            inference_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            batch_count: AtomicU64::new(0),
            total_batch_time_micros: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Claim the next batch id, incrementing the batch counter.
    ///
    /// Returns the 1-based id of the claimed batch.
    pub fn begin_batch(&self) -> u64 {
        self.batch_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record the processing time of an executed batch
    pub fn record_batch_time(&self, elapsed: Duration) {
        self.total_batch_time_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record `count` successful inferences
    pub fn record_successes(&self, count: u64) {
        self.inference_count.fetch_add(count, Ordering::Relaxed);
    }

    /// Record `count` failed inferences
    pub fn record_failures(&self, count: u64) {
        self.error_count.fetch_add(count, Ordering::Relaxed);
    }

    /// Total successful inferences so far
    pub fn inference_count(&self) -> u64 {
        self.inference_count.load(Ordering::Relaxed)
    }

    /// Total failed inferences so far
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Total batches formed so far
    pub fn batch_count(&self) -> u64 {
        self.batch_count.load(Ordering::Relaxed)
    }

    /// Read-only snapshot of all counters.
    ///
    /// The average batch processing time is cumulative time divided by the
    /// batch count, reported as zero before any batch has been processed.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let batch_count = self.batch_count.load(Ordering::Relaxed);
        let total_micros = self.total_batch_time_micros.load(Ordering::Relaxed);
        let avg_batch_processing_time_ms = if batch_count > 0 {
            (total_micros as f64 / batch_count as f64) / 1000.0
        } else {
            0.0
        };

        MetricsSnapshot {
            inference_count: self.inference_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            batch_count,
            avg_batch_processing_time_ms,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }
}

/// Point-in-time view of the engine counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Total successful inferences
    pub inference_count: u64,
    /// Total failed inferences (downstream failures and caller timeouts)
    pub error_count: u64,
    /// Total batches formed
    pub batch_count: u64,
    /// Average batch processing time in milliseconds, zero before any batch
    pub avg_batch_processing_time_ms: f64,
    /// Seconds since the engine started
    pub uptime_seconds: u64,
}
