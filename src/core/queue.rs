//! Pending request queue
//!
//! A shared FIFO buffer of admitted-but-not-yet-batched requests, drained
//! by the batch workers. Enqueue and drain are mutually exclusive under a
//! single queue-local lock, so no request is ever handed to two batches and
//! submission order is preserved across formation cycles.

use crate::utils::error::GatewayError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::{Notify, oneshot};

/// A single admitted request waiting to be claimed by a batch.
///
/// The `slot` is the request's result slot: a single-assignment channel
/// resolved at most once by the worker that owns the batch containing this
/// request, and observed by exactly one waiter (the admission call).
pub struct PendingRequest {
    /// Opaque input payload
    pub input: String,
    /// Admission timestamp, used for end-to-end latency
    pub submitted_at: Instant,
    /// Result slot resolved by the batch worker
    pub slot: oneshot::Sender<Result<String, GatewayError>>,
}

/// Ordered, lock-protected buffer of pending requests with a wakeup signal
/// for idle batch workers.
#[derive(Default)]
pub struct PendingQueue {
    entries: Mutex<VecDeque<PendingRequest>>,
    work_available: Notify,
}

impl PendingQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request at the tail and wake one idle worker.
    ///
    /// Non-blocking: the lock is held only for the push. `notify_one` wakes
    /// a single waiter (or stores a permit when none is waiting), so a burst
    /// of enqueues does not stampede every idle worker at once.
    pub fn enqueue(&self, request: PendingRequest) {
        self.entries.lock().push_back(request);
        self.work_available.notify_one();
    }

    /// Atomically remove and return up to `max_items` requests from the head.
    ///
    /// If requests remain after the drain, one more worker is woken so the
    /// remainder is picked up in the next formation cycle without waiting
    /// for another enqueue.
    pub fn drain(&self, max_items: usize) -> Vec<PendingRequest> {
        let mut entries = self.entries.lock();
        let take = max_items.min(entries.len());
        let drained: Vec<PendingRequest> = entries.drain(..take).collect();
        if !entries.is_empty() {
            self.work_available.notify_one();
        }
        drained
    }

    /// Current queue depth
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the queue holds no pending requests
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Wait until new work is signaled
    pub async fn wait_for_work(&self) {
        self.work_available.notified().await;
    }

    /// Wake every waiting worker (used during shutdown)
    pub fn wake_all(&self) {
        self.work_available.notify_waiters();
    }
}
