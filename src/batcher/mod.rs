//! Priority request batching for the extraction service.
//!
//! Converts a stream of single-document requests into periodically flushed
//! batches, gated by the sliding-window rate limiter, with per-item retry
//! and exponential backoff.

mod batcher;
mod queue;
mod types;

pub use batcher::RequestBatcher;
pub use queue::PriorityQueue;
pub use types::{BatchError, BatchRequest, BatcherStats};
