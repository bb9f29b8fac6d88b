//! Bounded-parallelism executor shared by extraction and upload stages.
//!
//! Admits at most `max_concurrency` jobs at a time; the rest wait in FIFO
//! order on the semaphore. Priority ordering across tiers is the caller's
//! responsibility; the pipeline pre-sorts its task list before chunking.
//! One job failing (or panicking) releases its slot and never blocks or
//! cancels its siblings.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Errors from the concurrency controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConcurrencyError {
    /// The pending queue was cleared before this job was admitted.
    #[error("Pending work was cleared before admission")]
    Cleared,
}

/// FIFO-bounded executor for async jobs.
pub struct ConcurrencyController {
    semaphore: Arc<Semaphore>,
    active: AtomicUsize,
    pending: AtomicUsize,
    /// Bumped by `clear()`; jobs admitted under an older generation are
    /// rejected instead of run.
    generation: AtomicU64,
    max_concurrency: usize,
}

impl ConcurrencyController {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            active: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Run `job` as soon as a slot frees up, FIFO among waiters.
    ///
    /// Returns `Err(Cleared)` if `clear()` was called while the job was
    /// still waiting for admission. In-flight jobs are never interrupted.
    pub async fn execute<F, T>(&self, job: F) -> Result<T, ConcurrencyError>
    where
        F: Future<Output = T>,
    {
        let admitted_generation = self.generation.load(Ordering::SeqCst);

        let permit = {
            let _waiting = CountGuard::increment(&self.pending);
            match self.semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return Err(ConcurrencyError::Cleared),
            }
        };

        if self.generation.load(Ordering::SeqCst) != admitted_generation {
            // Cleared while this job was queued. Permit drops here and
            // admits the next waiter.
            return Err(ConcurrencyError::Cleared);
        }

        let _running = CountGuard::increment(&self.active);
        let result = job.await;
        drop(permit);
        Ok(result)
    }

    /// Jobs currently running.
    pub fn current_concurrency(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Jobs waiting for a slot.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Drop all pending (not yet admitted) jobs.
    ///
    /// Their callers receive `Err(Cleared)` as a cancellation signal, not a
    /// resolution. In-flight jobs run to completion.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Increments a counter, decrements on drop. Keeps the active/pending
/// counts honest even when a job panics.
struct CountGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> CountGuard<'a> {
    fn increment(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
