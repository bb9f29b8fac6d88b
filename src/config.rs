//! Pipeline configuration: every tunable of the extraction pipeline with
//! production defaults.
//!
//! All limits live here so that callers construct one `PipelineConfig`,
//! adjust what they need, and hand it to `DocumentPipeline::new`. Nested
//! structs group the knobs by component (cache, batching, rate limits,
//! retry, monitor thresholds).

use serde::{Deserialize, Serialize};

use crate::cache::EvictionStrategy;

// ═══════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════

/// Configuration for the whole document pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum concurrent extraction operations.
    pub max_concurrency: usize,
    /// Maximum concurrent result uploads (separate pool from extraction).
    pub upload_concurrency: usize,
    /// Tasks per chunk; chunks run sequentially, tasks within a chunk
    /// concurrently.
    pub chunk_size: usize,
    /// Pause between chunks to bound burst load.
    pub chunk_pause_ms: u64,
    /// Hard wall-clock budget for one `process_parallel` run.
    pub run_timeout_ms: u64,
    pub cache: CacheConfig,
    pub batching: BatchingConfig,
    pub rate: RateLimitConfig,
    pub retry: RetryConfig,
    pub monitor: MonitorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            upload_concurrency: 3,
            chunk_size: 10,
            chunk_pause_ms: 100,
            run_timeout_ms: 300_000,
            cache: CacheConfig::default(),
            batching: BatchingConfig::default(),
            rate: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject configurations that cannot drive the pipeline.
    ///
    /// Run-level misconfiguration is an error to the caller, unlike
    /// per-task failures which are returned as data.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be at least 1".into());
        }
        if self.upload_concurrency == 0 {
            return Err("upload_concurrency must be at least 1".into());
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be at least 1".into());
        }
        if self.batching.max_batch_size == 0 {
            return Err("max_batch_size must be at least 1".into());
        }
        if self.batching.max_queue_size == 0 {
            return Err("max_queue_size must be at least 1".into());
        }
        if self.batching.max_concurrent_batches == 0 {
            return Err("max_concurrent_batches must be at least 1".into());
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be >= 1.0".into());
        }
        if self.rate.requests_per_second == 0 || self.rate.requests_per_minute == 0 {
            return Err("rate limits must be at least 1 request".into());
        }
        if !(0.0..=1.0).contains(&self.monitor.thresholds.min_cache_hit_rate) {
            return Err("min_cache_hit_rate must be within 0.0..=1.0".into());
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Cache
// ═══════════════════════════════════════════════════════════

/// Result cache limits and behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Byte budget for all live entries combined.
    pub max_size_bytes: u64,
    /// Entry-count budget.
    pub max_entries: usize,
    /// Entries older than this are expired regardless of access pattern.
    pub ttl_seconds: u64,
    /// Which entry to evict when a budget is hit.
    pub eviction_strategy: EvictionStrategy,
    /// Gzip entries larger than `compression_threshold_bytes`.
    pub enable_compression: bool,
    /// Minimum serialized size before compression kicks in.
    pub compression_threshold_bytes: u64,
    /// Background sweep interval for expired entries.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 100 * 1024 * 1024,
            max_entries: 1000,
            ttl_seconds: 3600,
            eviction_strategy: EvictionStrategy::Lru,
            enable_compression: true,
            compression_threshold_bytes: 10 * 1024,
            sweep_interval_secs: 60,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Batching
// ═══════════════════════════════════════════════════════════

/// Request batcher limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Maximum items dequeued into one batch.
    pub max_batch_size: usize,
    /// A batch is flushed at most this long after the first enqueue.
    pub batch_timeout_ms: u64,
    /// Admission ceiling: `add_request` rejects beyond this queue depth.
    pub max_queue_size: usize,
    /// Batches allowed in flight simultaneously.
    pub max_concurrent_batches: usize,
    /// Background poller interval for capacity-driven flushes.
    pub poll_interval_ms: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 5,
            batch_timeout_ms: 2000,
            max_queue_size: 100,
            max_concurrent_batches: 3,
            poll_interval_ms: 500,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Rate limits
// ═══════════════════════════════════════════════════════════

/// Sliding-window ceilings for the extraction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: usize,
    pub requests_per_minute: usize,
    /// Token budget per sliding minute (LLM-backed extraction cost unit).
    pub tokens_per_minute: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5,
            requests_per_minute: 100,
            tokens_per_minute: 100_000,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Retry
// ═══════════════════════════════════════════════════════════

/// Retry policy for failed extraction items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the initial attempt (3 → 4 attempts total).
    pub max_retries: u32,
    /// Base delay before the first retry.
    pub retry_delay_ms: u64,
    /// Delay grows by this factor per retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff delay in milliseconds before retry number `retry_count`
    /// (1-based).
    pub fn backoff_ms(&self, retry_count: u32) -> u64 {
        let exp = retry_count.saturating_sub(1);
        let factor = self.backoff_multiplier.powi(exp as i32);
        (self.retry_delay_ms as f64 * factor) as u64
    }
}

// ═══════════════════════════════════════════════════════════
// Monitor
// ═══════════════════════════════════════════════════════════

/// Performance monitor behavior and alert thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Completed-request records kept for reporting (oldest dropped).
    pub history_size: usize,
    /// Response-time samples used for average/p95/p99.
    pub response_window: usize,
    /// Resource sampling interval.
    pub sample_interval_secs: u64,
    /// Cost charged per 1000 extraction tokens.
    pub cost_per_1k_tokens: f64,
    pub thresholds: MonitorThresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_size: 1000,
            response_window: 500,
            sample_interval_secs: 30,
            cost_per_1k_tokens: 0.01,
            thresholds: MonitorThresholds::default(),
        }
    }
}

/// Per-request and rolling limits that trigger violation notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorThresholds {
    pub max_response_time_ms: u64,
    pub max_tokens_per_request: u64,
    pub max_cost_per_request: f64,
    /// Rolling hit rate below this raises a violation (evaluated once a
    /// meaningful number of requests has been recorded).
    pub min_cache_hit_rate: f64,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            max_response_time_ms: 30_000,
            max_tokens_per_request: 10_000,
            max_cost_per_request: 0.5,
            min_cache_hit_rate: 0.3,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
