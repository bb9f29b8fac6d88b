//! docpipe: bounded-concurrency document extraction pipeline.
//!
//! Orchestrates structured-data extraction from uploaded PDF documents:
//! priority-sorted chunked processing through two bounded concurrency
//! pools (extraction and upload), a content-addressed result cache with
//! pluggable eviction, a priority request batcher with sliding-window
//! rate limiting and exponential-backoff retry, and a performance monitor
//! tracking latency percentiles, token/cost accounting, and threshold
//! violations.
//!
//! The extraction and upload services themselves are opaque collaborators
//! behind traits (see `services`); this crate only coordinates them.

pub mod batcher;
pub mod cache;
pub mod concurrency;
pub mod config;
pub mod fingerprint;
pub mod limiter;
pub mod monitor;
pub mod processor;
pub mod services;
pub mod task;

pub use config::PipelineConfig;
pub use processor::{
    DocumentPipeline, ExtractOptions, ExtractionOutcome, PipelineError, ProcessingReport,
    ProgressEvent, TaskOutcome,
};
pub use task::{DocumentTask, Priority};

use tracing_subscriber::EnvFilter;

/// Default log filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "docpipe=info"
}

/// Initialize tracing for binaries embedding the pipeline.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter())),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn default_filter_scopes_to_crate() {
        assert!(default_log_filter().starts_with("docpipe"));
    }
}
