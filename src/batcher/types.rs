//! Batcher request lifecycle types and statistics.

use std::time::Instant;

use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::services::ExtractedDocument;
use crate::task::Priority;

/// Errors resolved to a batched request's caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BatchError {
    /// Admission rejected: the queue already holds its configured maximum.
    #[error("Request queue is full")]
    QueueFull,

    /// The queue was cleared while this request was pending.
    #[error("Request queue was cleared before processing")]
    Cleared,

    /// All retries failed. Terminal.
    #[error("Extraction failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// The batcher dropped the request without resolving it. Indicates a
    /// bug, surfaced instead of hanging the caller.
    #[error("Request was dropped without a result")]
    Dropped,
}

/// Completion sink for one request.
pub(crate) type Responder = oneshot::Sender<Result<ExtractedDocument, BatchError>>;

/// A queued single-document request awaiting batched processing.
///
/// Owned by the priority queue while pending, moved into an in-flight
/// batch during execution, and consumed on terminal success or failure.
pub struct BatchRequest {
    pub id: Uuid,
    pub payload: Vec<u8>,
    pub fingerprint: String,
    pub priority: Priority,
    pub retry_count: u32,
    pub enqueued_at: Instant,
    pub(crate) responder: Responder,
}

impl BatchRequest {
    pub(crate) fn new(
        payload: Vec<u8>,
        fingerprint: String,
        priority: Priority,
        responder: Responder,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            fingerprint,
            priority,
            retry_count: 0,
            enqueued_at: Instant::now(),
            responder,
        }
    }

    /// Resolve the caller. A dropped receiver means the caller gave up.
    pub(crate) fn resolve(self, result: Result<ExtractedDocument, BatchError>) {
        let _ = self.responder.send(result);
    }
}

/// Point-in-time batcher statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BatcherStats {
    pub total_requests: u64,
    pub processed: u64,
    pub failed: u64,
    pub retried: u64,
    /// Requests currently waiting in the queue.
    pub queued: usize,
    pub active_batches: usize,
    /// Rolling average over the last 100 flushed batches.
    pub average_batch_size: f64,
    /// Rolling average queue wait over the last 100 dequeued requests.
    pub average_wait_ms: f64,
    /// Flush attempts deferred by the rate limiter.
    pub rate_limit_hits: u64,
}
