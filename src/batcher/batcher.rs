//! The request batcher: admission, flush scheduling, rate-limited batch
//! execution, and per-item retry with exponential backoff.
//!
//! Request lifecycle: queued → in-batch → succeeded, or back to queued (at
//! high priority, after a backoff delay) until retries are exhausted.
//! Batches form on a timer armed by the first enqueue, or when the
//! background poller sees capacity: a free batch slot, a non-empty queue,
//! and the rate limiter admitting a request.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::queue::PriorityQueue;
use super::types::{BatchError, BatchRequest, BatcherStats};
use crate::config::{BatchingConfig, RetryConfig};
use crate::limiter::RateLimiter;
use crate::services::{ExtractedDocument, ExtractionService};
use crate::task::Priority;

/// Rolling sample window for batch-size and wait-time averages.
const STAT_WINDOW: usize = 100;

// ═══════════════════════════════════════════════════════════
// RequestBatcher
// ═══════════════════════════════════════════════════════════

/// Batches single-document extraction requests.
pub struct RequestBatcher {
    shared: Arc<Shared>,
    poller: JoinHandle<()>,
}

struct Shared {
    queue: Mutex<PriorityQueue>,
    limiter: Arc<Mutex<RateLimiter>>,
    service: Arc<dyn ExtractionService>,
    batching: BatchingConfig,
    retry: RetryConfig,
    active_batches: AtomicUsize,
    timer_armed: AtomicBool,
    stats: Mutex<StatCounters>,
}

#[derive(Default)]
struct StatCounters {
    total_requests: u64,
    processed: u64,
    failed: u64,
    retried: u64,
    rate_limit_hits: u64,
    batch_sizes: VecDeque<usize>,
    wait_times_ms: VecDeque<u64>,
}

impl RequestBatcher {
    /// Create the batcher and start its background poller.
    pub fn new(
        service: Arc<dyn ExtractionService>,
        limiter: Arc<Mutex<RateLimiter>>,
        batching: BatchingConfig,
        retry: RetryConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(PriorityQueue::new()),
            limiter,
            service,
            batching,
            retry,
            active_batches: AtomicUsize::new(0),
            timer_armed: AtomicBool::new(false),
            stats: Mutex::new(StatCounters::default()),
        });

        let poller = {
            let shared = Arc::clone(&shared);
            let period = Duration::from_millis(shared.batching.poll_interval_ms.max(1));
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(period).await;
                    try_flush(&shared);
                }
            })
        };

        Self { shared, poller }
    }

    /// Submit one document and await its batched extraction.
    ///
    /// Rejects immediately with `QueueFull` when the queue is at capacity.
    pub async fn add_request(
        &self,
        payload: Vec<u8>,
        fingerprint: String,
        priority: Priority,
    ) -> Result<ExtractedDocument, BatchError> {
        let (tx, rx) = oneshot::channel();
        let request = BatchRequest::new(payload, fingerprint, priority, tx);

        if enqueue(&self.shared, request).is_err() {
            return Err(BatchError::QueueFull);
        }
        lock(&self.shared.stats).total_requests += 1;

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(BatchError::Dropped),
        }
    }

    /// Drop all queued (not in-flight) requests, resolving their callers
    /// with `Cleared`.
    pub fn clear_queue(&self) {
        let drained = lock(&self.shared.queue).drain_all();
        if !drained.is_empty() {
            tracing::info!(cleared = drained.len(), "Clearing request queue");
        }
        for request in drained {
            request.resolve(Err(BatchError::Cleared));
        }
    }

    /// Requests currently waiting in the queue.
    pub fn queue_len(&self) -> usize {
        lock(&self.shared.queue).len()
    }

    /// Snapshot of batcher statistics.
    pub fn stats(&self) -> BatcherStats {
        let queued = lock(&self.shared.queue).len();
        let stats = lock(&self.shared.stats);
        BatcherStats {
            total_requests: stats.total_requests,
            processed: stats.processed,
            failed: stats.failed,
            retried: stats.retried,
            queued,
            active_batches: self.shared.active_batches.load(Ordering::SeqCst),
            average_batch_size: average_usize(&stats.batch_sizes),
            average_wait_ms: average_u64(&stats.wait_times_ms),
            rate_limit_hits: stats.rate_limit_hits,
        }
    }

    /// Stop the background poller. Queued requests stay queued; in-flight
    /// batches run to completion.
    pub fn shutdown(&self) {
        self.poller.abort();
    }
}

impl Drop for RequestBatcher {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

// ═══════════════════════════════════════════════════════════
// Internals
// ═══════════════════════════════════════════════════════════

/// Queue a request, arming the batch timer when none is armed.
/// Hands the request back on a full queue.
fn enqueue(shared: &Arc<Shared>, request: BatchRequest) -> Result<(), BatchRequest> {
    {
        let mut queue = lock(&shared.queue);
        if queue.len() >= shared.batching.max_queue_size {
            return Err(request);
        }
        queue.push(request);
    }
    arm_timer(shared);
    Ok(())
}

fn arm_timer(shared: &Arc<Shared>) {
    if shared.timer_armed.swap(true, Ordering::SeqCst) {
        return;
    }
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(shared.batching.batch_timeout_ms)).await;
        shared.timer_armed.store(false, Ordering::SeqCst);
        try_flush(&shared);
    });
}

/// Form and dispatch one batch if capacity and rate limits allow.
fn try_flush(shared: &Arc<Shared>) {
    if shared.active_batches.load(Ordering::SeqCst) >= shared.batching.max_concurrent_batches {
        return;
    }

    let items = {
        let mut queue = lock(&shared.queue);
        if queue.is_empty() {
            return;
        }

        {
            let mut limiter = lock(&shared.limiter);
            // Token headroom: once the minute budget is spent, batches
            // wait for the window to slide open again.
            if !limiter.can_make_request() || !limiter.can_use_tokens(1) {
                drop(limiter);
                lock(&shared.stats).rate_limit_hits += 1;
                return;
            }
            limiter.record_request();
        }

        let mut items = Vec::with_capacity(shared.batching.max_batch_size);
        while items.len() < shared.batching.max_batch_size {
            match queue.pop() {
                Some(request) => items.push(request),
                None => break,
            }
        }
        items
    };

    {
        let mut stats = lock(&shared.stats);
        push_capped(&mut stats.batch_sizes, items.len());
        for request in &items {
            let waited = request.enqueued_at.elapsed().as_millis() as u64;
            push_capped(&mut stats.wait_times_ms, waited);
        }
    }

    tracing::debug!(batch_size = items.len(), "Flushing extraction batch");
    shared.active_batches.fetch_add(1, Ordering::SeqCst);
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        execute_batch(&shared, items).await;
        shared.active_batches.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Run every item of a batch with per-item isolation: one item failing
/// never fails its siblings.
async fn execute_batch(shared: &Arc<Shared>, items: Vec<BatchRequest>) {
    let jobs = items
        .into_iter()
        .map(|request| process_item(shared, request));
    join_all(jobs).await;
}

async fn process_item(shared: &Arc<Shared>, mut request: BatchRequest) {
    match shared.service.extract(&request.payload).await {
        Ok(document) => {
            lock(&shared.limiter).record_token_usage(document.tokens_used);
            lock(&shared.stats).processed += 1;
            request.resolve(Ok(document));
        }
        Err(error) => {
            request.retry_count += 1;
            if request.retry_count <= shared.retry.max_retries {
                let delay_ms = shared.retry.backoff_ms(request.retry_count);
                lock(&shared.stats).retried += 1;
                tracing::debug!(
                    request_id = %request.id,
                    retry = request.retry_count,
                    delay_ms,
                    error = %error,
                    "Extraction failed, scheduling retry"
                );
                schedule_retry(shared, request, delay_ms);
            } else {
                lock(&shared.stats).failed += 1;
                let attempts = request.retry_count;
                tracing::warn!(
                    request_id = %request.id,
                    attempts,
                    error = %error,
                    "Extraction failed terminally"
                );
                request.resolve(Err(BatchError::RetriesExhausted {
                    attempts,
                    last_error: error.to_string(),
                }));
            }
        }
    }
}

/// Re-enqueue a failed request after its backoff delay. Retries jump to
/// high priority so they don't starve behind new low-priority work.
fn schedule_retry(shared: &Arc<Shared>, mut request: BatchRequest, delay_ms: u64) {
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        request.priority = Priority::High;
        request.enqueued_at = Instant::now();
        if let Err(rejected) = enqueue(&shared, request) {
            lock(&shared.stats).failed += 1;
            rejected.resolve(Err(BatchError::QueueFull));
        }
    });
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn push_capped<T>(window: &mut VecDeque<T>, value: T) {
    if window.len() >= STAT_WINDOW {
        window.pop_front();
    }
    window.push_back(value);
}

fn average_usize(window: &VecDeque<usize>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().sum::<usize>() as f64 / window.len() as f64
}

fn average_u64(window: &VecDeque<u64>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().sum::<u64>() as f64 / window.len() as f64
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
