//! Document pipeline orchestrator.
//!
//! Single entry point that drives the full performance subsystem:
//! prioritize → chunk → cache lookup → batched extraction → cache write →
//! result upload → monitoring. Uses trait-based DI for both external
//! services so the pipeline remains fully testable with mock
//! implementations.
//!
//! Every component instance is owned here and shared by reference
//! (explicit dependency injection instead of process-global singletons),
//! so tests can run any number of isolated pipelines.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::batcher::{BatchError, RequestBatcher};
use crate::cache::{CacheStore, SweeperHandle};
use crate::concurrency::ConcurrencyController;
use crate::config::PipelineConfig;
use crate::fingerprint::fingerprint;
use crate::limiter::RateLimiter;
use crate::monitor::{PerformanceMetrics, PerformanceMonitor, RequestMetadata, SamplerHandle};
use crate::services::{ExtractedDocument, ExtractionService, UploadService};
use crate::task::{DocumentTask, Priority};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Run-level pipeline errors. Per-task failures are returned as data in
/// `TaskOutcome`, never as an `Err` from `process_parallel`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Processing run exceeded its {0}ms wall-clock budget")]
    Timeout(u64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] BatchError),
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Outcome of one task. Failures carry their reason instead of aborting
/// sibling tasks.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub success: bool,
    pub document: Option<ExtractedDocument>,
    pub cache_hit: bool,
    /// Location of the stored result, when the upload step ran and
    /// succeeded.
    pub stored_url: Option<String>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Aggregate result of a `process_parallel` run.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    /// True when the run produced at least one successful task (always
    /// true for an empty task list).
    pub success: bool,
    pub results: Vec<TaskOutcome>,
    pub metrics: PerformanceMetrics,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Progress notifications emitted during a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    Started {
        total_tasks: usize,
        chunk_count: usize,
    },
    ChunkCompleted {
        chunk_index: usize,
        completed: usize,
        total: usize,
        metrics: PerformanceMetrics,
        /// Accumulated error strings across all chunks so far.
        errors: Vec<String>,
    },
    Completed {
        succeeded: usize,
        failed: usize,
        duration_ms: u64,
        metrics: PerformanceMetrics,
    },
}

/// Per-call options for single-document extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub priority: Priority,
    /// Skip the cache lookup (the result is still written back).
    pub bypass_cache: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            bypass_cache: false,
        }
    }
}

/// Result of a single-document extraction.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutcome {
    pub document: ExtractedDocument,
    pub fingerprint: String,
    pub cache_hit: bool,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// DocumentPipeline
// ---------------------------------------------------------------------------

/// The top-level orchestrator.
///
/// Owns one cache, one batcher (with its rate limiter), two concurrency
/// pools (extraction and upload), and one performance monitor. Background
/// tasks (cache sweep, resource sampling, batch polling) stop when the
/// pipeline is dropped.
pub struct DocumentPipeline {
    config: PipelineConfig,
    cache: Arc<CacheStore>,
    batcher: Arc<RequestBatcher>,
    extraction_pool: Arc<ConcurrencyController>,
    upload_pool: Arc<ConcurrencyController>,
    monitor: Arc<PerformanceMonitor>,
    uploader: Arc<dyn UploadService>,
    progress_tx: broadcast::Sender<ProgressEvent>,
    _sweeper: SweeperHandle,
    _sampler: SamplerHandle,
}

impl DocumentPipeline {
    /// Build a pipeline around the given external services.
    pub fn new(
        config: PipelineConfig,
        extractor: Arc<dyn ExtractionService>,
        uploader: Arc<dyn UploadService>,
    ) -> Result<Self, PipelineError> {
        config.validate().map_err(PipelineError::InvalidConfig)?;

        let limiter = Arc::new(Mutex::new(RateLimiter::new(config.rate.clone())));
        let cache = Arc::new(CacheStore::new(config.cache.clone()));
        let monitor = Arc::new(PerformanceMonitor::new(config.monitor.clone()));
        let batcher = Arc::new(RequestBatcher::new(
            extractor,
            limiter,
            config.batching.clone(),
            config.retry.clone(),
        ));
        let (progress_tx, _) = broadcast::channel(64);

        let sweeper = cache.spawn_sweeper();
        let sampler = monitor.spawn_sampler();

        Ok(Self {
            extraction_pool: Arc::new(ConcurrencyController::new(config.max_concurrency)),
            upload_pool: Arc::new(ConcurrencyController::new(config.upload_concurrency)),
            config,
            cache,
            batcher,
            monitor,
            uploader,
            progress_tx,
            _sweeper: sweeper,
            _sampler: sampler,
        })
    }

    /// Subscribe to progress notifications.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn batcher(&self) -> &Arc<RequestBatcher> {
        &self.batcher
    }

    /// Drop all not-yet-started work: queued batch requests and jobs
    /// waiting for a pool slot. In-flight operations finish normally.
    pub fn clear_pending(&self) {
        self.extraction_pool.clear();
        self.upload_pool.clear();
        self.batcher.clear_queue();
    }

    /// Process a list of document tasks with bounded concurrency.
    ///
    /// Tasks are sorted by priority (stable), split into chunks, and each
    /// chunk runs concurrently through the extraction pool. Every task's
    /// outcome is captured independently; the whole run is bounded by the
    /// configured wall-clock timeout.
    pub async fn process_parallel(
        &self,
        tasks: Vec<DocumentTask>,
    ) -> Result<ProcessingReport, PipelineError> {
        let budget = Duration::from_millis(self.config.run_timeout_ms);
        match tokio::time::timeout(budget, self.run(tasks)).await {
            Ok(report) => Ok(report),
            Err(_) => {
                tracing::error!(
                    budget_ms = self.config.run_timeout_ms,
                    "Processing run timed out; abandoning remaining results"
                );
                Err(PipelineError::Timeout(self.config.run_timeout_ms))
            }
        }
    }

    /// Extract one document through the cache → batcher path.
    ///
    /// The upload step is not part of this entry point.
    pub async fn extract_document(
        &self,
        payload: &[u8],
        name: &str,
        options: ExtractOptions,
    ) -> Result<ExtractionOutcome, PipelineError> {
        let start = Instant::now();
        let fp = fingerprint(payload);

        if !options.bypass_cache {
            if let Some(document) = self.cache.get(&fp) {
                tracing::debug!(name, fingerprint = %fp, "Extraction served from cache");
                self.record(name, &fp, payload.len(), 0, start, true, None);
                return Ok(ExtractionOutcome {
                    document,
                    fingerprint: fp,
                    cache_hit: true,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
        }

        let result = self
            .batcher
            .add_request(payload.to_vec(), fp.clone(), options.priority)
            .await;

        match result {
            Ok(document) => {
                self.cache.set(&fp, &document);
                self.record(
                    name,
                    &fp,
                    payload.len(),
                    document.tokens_used,
                    start,
                    false,
                    None,
                );
                Ok(ExtractionOutcome {
                    document,
                    fingerprint: fp,
                    cache_hit: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
            Err(error) => {
                self.record(
                    name,
                    &fp,
                    payload.len(),
                    0,
                    start,
                    false,
                    Some(error.to_string()),
                );
                Err(error.into())
            }
        }
    }

    // ── Run internals ───────────────────────────────────────

    async fn run(&self, mut tasks: Vec<DocumentTask>) -> ProcessingReport {
        let started = Instant::now();
        let total = tasks.len();

        // Stable sort: FIFO preserved within a tier.
        tasks.sort_by_key(|task| task.priority.rank());

        let chunk_size = self.config.chunk_size;
        let chunk_count = total.div_ceil(chunk_size);

        tracing::info!(total, chunk_count, "Parallel processing started");
        self.emit(ProgressEvent::Started {
            total_tasks: total,
            chunk_count,
        });

        let mut results: Vec<TaskOutcome> = Vec::with_capacity(total);
        let mut errors: Vec<String> = Vec::new();

        for (chunk_index, chunk) in tasks.chunks(chunk_size).enumerate() {
            let outcomes = join_all(chunk.iter().map(|task| self.process_one(task))).await;

            for outcome in outcomes {
                if let Some(error) = &outcome.error {
                    errors.push(format!("task {}: {}", outcome.task_id, error));
                }
                results.push(outcome);
            }

            self.emit(ProgressEvent::ChunkCompleted {
                chunk_index,
                completed: results.len(),
                total,
                metrics: self.monitor.metrics(),
                errors: errors.clone(),
            });

            if chunk_index + 1 < chunk_count && self.config.chunk_pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.chunk_pause_ms)).await;
            }
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        let duration_ms = started.elapsed().as_millis() as u64;
        let metrics = self.monitor.metrics();

        tracing::info!(succeeded, failed, duration_ms, "Parallel processing complete");
        self.emit(ProgressEvent::Completed {
            succeeded,
            failed,
            duration_ms,
            metrics: metrics.clone(),
        });

        ProcessingReport {
            success: results.is_empty() || succeeded > 0,
            results,
            metrics,
            errors,
            duration_ms,
        }
    }

    /// One task through the extraction pool. Never panics the run: every
    /// failure becomes a `TaskOutcome` with `success: false`.
    async fn process_one(&self, task: &DocumentTask) -> TaskOutcome {
        let start = Instant::now();
        match self.extraction_pool.execute(self.extract_and_store(task)).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(task_id = %task.id, error = %error, "Task dropped before admission");
                failure_outcome(task, start, false, None, error.to_string())
            }
        }
    }

    async fn extract_and_store(&self, task: &DocumentTask) -> TaskOutcome {
        let start = Instant::now();
        let fp = fingerprint(&task.payload);

        let (document, cache_hit) = match self.cache.get(&fp) {
            Some(document) => (document, true),
            None => {
                let extracted = self
                    .batcher
                    .add_request(task.payload.clone(), fp.clone(), task.priority)
                    .await;
                match extracted {
                    Ok(document) => {
                        self.cache.set(&fp, &document);
                        (document, false)
                    }
                    Err(error) => {
                        tracing::warn!(task_id = %task.id, error = %error, "Task extraction failed");
                        self.record(
                            &task.id,
                            &fp,
                            task.payload.len(),
                            0,
                            start,
                            false,
                            Some(error.to_string()),
                        );
                        return failure_outcome(task, start, false, None, error.to_string());
                    }
                }
            }
        };

        // Second stage: persist the structured result through the
        // separate upload pool.
        let upload = self.upload_result(task, &document).await;

        let tokens_used = if cache_hit { 0 } else { document.tokens_used };
        let (stored_url, upload_error) = match upload {
            Ok(url) => (Some(url), None),
            Err(error) => (None, Some(error)),
        };

        self.record(
            &task.id,
            &fp,
            task.payload.len(),
            tokens_used,
            start,
            cache_hit,
            upload_error.clone(),
        );

        match upload_error {
            None => TaskOutcome {
                task_id: task.id.clone(),
                success: true,
                document: Some(document),
                cache_hit,
                stored_url,
                duration_ms: start.elapsed().as_millis() as u64,
                error: None,
            },
            Some(error) => {
                tracing::warn!(task_id = %task.id, error = %error, "Task upload failed");
                failure_outcome(task, start, cache_hit, Some(document), error)
            }
        }
    }

    /// Upload the serialized extraction result. Upload failures surface
    /// per-task and are not retried.
    async fn upload_result(
        &self,
        task: &DocumentTask,
        document: &ExtractedDocument,
    ) -> Result<String, String> {
        let bytes = serde_json::to_vec(document).map_err(|e| e.to_string())?;
        let name = format!("{}.json", task.name);

        match self
            .upload_pool
            .execute(self.uploader.store(&bytes, &name))
            .await
        {
            Ok(Ok(url)) => Ok(url),
            Ok(Err(error)) => Err(error.to_string()),
            Err(cleared) => Err(cleared.to_string()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        request_id: &str,
        fp: &str,
        file_size: usize,
        tokens_used: u64,
        start: Instant,
        cache_hit: bool,
        error: Option<String>,
    ) {
        let cost = tokens_used as f64 / 1000.0 * self.config.monitor.cost_per_1k_tokens;
        self.monitor.record_request(RequestMetadata {
            request_id: request_id.to_string(),
            fingerprint: fp.to_string(),
            file_size_bytes: file_size as u64,
            tokens_used,
            response_time_ms: start.elapsed().as_millis() as u64,
            cache_hit,
            cost,
            error,
        });
    }

    fn emit(&self, event: ProgressEvent) {
        // No subscribers is fine.
        let _ = self.progress_tx.send(event);
    }
}

fn failure_outcome(
    task: &DocumentTask,
    start: Instant,
    cache_hit: bool,
    document: Option<ExtractedDocument>,
    error: String,
) -> TaskOutcome {
    TaskOutcome {
        task_id: task.id.clone(),
        success: false,
        document,
        cache_hit,
        stored_url: None,
        duration_ms: start.elapsed().as_millis() as u64,
        error: Some(error),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchingConfig, RetryConfig};
    use crate::services::{MockExtractionService, MockUploadService};

    /// Config with timings tightened for test speed.
    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            chunk_pause_ms: 5,
            run_timeout_ms: 10_000,
            batching: BatchingConfig {
                batch_timeout_ms: 20,
                poll_interval_ms: 10,
                ..Default::default()
            },
            retry: RetryConfig {
                max_retries: 0,
                retry_delay_ms: 5,
                backoff_multiplier: 2.0,
            },
            ..Default::default()
        }
    }

    fn pipeline_with(
        config: PipelineConfig,
        extractor: Arc<MockExtractionService>,
        uploader: Arc<MockUploadService>,
    ) -> DocumentPipeline {
        DocumentPipeline::new(config, extractor, uploader).unwrap()
    }

    fn tasks(count: usize) -> Vec<DocumentTask> {
        (0..count)
            .map(|i| {
                DocumentTask::new(
                    format!("task-{i}"),
                    format!("doc-{i}.pdf"),
                    format!("%PDF document body {i}").into_bytes(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn processes_all_tasks_successfully() {
        let extractor = Arc::new(MockExtractionService::new("GRN data"));
        let uploader = Arc::new(MockUploadService::new());
        let pipeline = pipeline_with(fast_config(), extractor, Arc::clone(&uploader));

        let report = pipeline.process_parallel(tasks(5)).await.unwrap();

        assert!(report.success);
        assert_eq!(report.results.len(), 5);
        assert!(report.results.iter().all(|r| r.success));
        assert!(report.errors.is_empty());
        assert_eq!(uploader.call_count(), 5);
        assert_eq!(report.metrics.total_requests, 5);
    }

    #[tokio::test]
    async fn empty_task_list_is_a_successful_noop() {
        let pipeline = pipeline_with(
            fast_config(),
            Arc::new(MockExtractionService::new("unused")),
            Arc::new(MockUploadService::new()),
        );

        let report = pipeline.process_parallel(Vec::new()).await.unwrap();
        assert!(report.success);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn high_priority_tasks_processed_first() {
        let mut config = fast_config();
        config.chunk_size = 1;
        config.chunk_pause_ms = 0;
        let pipeline = pipeline_with(
            config,
            Arc::new(MockExtractionService::new("ok")),
            Arc::new(MockUploadService::new()),
        );

        let submitted = vec![
            DocumentTask::new("low-1", "a.pdf", b"low one".to_vec())
                .with_priority(Priority::Low),
            DocumentTask::new("high-1", "b.pdf", b"high one".to_vec())
                .with_priority(Priority::High),
            DocumentTask::new("normal-1", "c.pdf", b"normal one".to_vec()),
            DocumentTask::new("high-2", "d.pdf", b"high two".to_vec())
                .with_priority(Priority::High),
        ];

        let report = pipeline.process_parallel(submitted).await.unwrap();
        let order: Vec<&str> = report.results.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(order, vec!["high-1", "high-2", "normal-1", "low-1"]);
    }

    #[tokio::test]
    async fn one_poisoned_task_does_not_abort_siblings() {
        let extractor =
            Arc::new(MockExtractionService::new("ok").failing_payload_containing("poison"));
        let pipeline = pipeline_with(fast_config(), extractor, Arc::new(MockUploadService::new()));

        let mut submitted = tasks(2);
        submitted.insert(
            1,
            DocumentTask::new("task-bad", "bad.pdf", b"poison pill".to_vec()),
        );

        let report = pipeline.process_parallel(submitted).await.unwrap();

        assert_eq!(report.results.len(), 3);
        let failed: Vec<&TaskOutcome> =
            report.results.iter().filter(|r| !r.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].task_id, "task-bad");
        assert!(report.success, "run succeeds when any task succeeded");
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("task-bad"));
    }

    #[tokio::test]
    async fn duplicate_payload_served_from_cache() {
        let extractor = Arc::new(MockExtractionService::new("cached result"));
        let mut config = fast_config();
        config.chunk_size = 1; // second task starts after the first finished
        config.chunk_pause_ms = 0;
        let pipeline =
            pipeline_with(config, Arc::clone(&extractor), Arc::new(MockUploadService::new()));

        let submitted = vec![
            DocumentTask::new("first", "a.pdf", b"same bytes".to_vec()),
            DocumentTask::new("second", "b.pdf", b"same bytes".to_vec()),
        ];

        let report = pipeline.process_parallel(submitted).await.unwrap();

        assert!(report.results.iter().all(|r| r.success));
        assert_eq!(extractor.call_count(), 1, "second task must hit the cache");
        assert!(report.results[1].cache_hit);
        assert_eq!(report.metrics.cache_hits, 1);
        assert_eq!(report.metrics.cache_misses, 1);
    }

    #[tokio::test]
    async fn upload_failure_surfaces_per_task() {
        let uploader = Arc::new(MockUploadService::new().failing_names(&["doc-1"]));
        let pipeline = pipeline_with(
            fast_config(),
            Arc::new(MockExtractionService::new("ok")),
            uploader,
        );

        let report = pipeline.process_parallel(tasks(3)).await.unwrap();

        let failed: Vec<&TaskOutcome> =
            report.results.iter().filter(|r| !r.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].task_id, "task-1");
        // Extraction succeeded: the document is still attached.
        assert!(failed[0].document.is_some());
        assert!(failed[0].stored_url.is_none());
        assert!(report.success);
    }

    #[tokio::test]
    async fn run_times_out_as_a_run_level_error() {
        let extractor = Arc::new(MockExtractionService::new("slow").with_delay_ms(500));
        let mut config = fast_config();
        config.run_timeout_ms = 100;
        let pipeline = pipeline_with(config, extractor, Arc::new(MockUploadService::new()));

        let result = pipeline.process_parallel(tasks(1)).await;
        assert!(matches!(result, Err(PipelineError::Timeout(100))));
    }

    #[tokio::test]
    async fn progress_events_cover_the_whole_run() {
        let mut config = fast_config();
        config.chunk_size = 2;
        let pipeline = pipeline_with(
            config,
            Arc::new(MockExtractionService::new("ok")),
            Arc::new(MockUploadService::new()),
        );
        let mut rx = pipeline.subscribe_progress();

        pipeline.process_parallel(tasks(3)).await.unwrap();

        match rx.recv().await.unwrap() {
            ProgressEvent::Started {
                total_tasks,
                chunk_count,
            } => {
                assert_eq!(total_tasks, 3);
                assert_eq!(chunk_count, 2);
            }
            other => panic!("Expected Started, got: {other:?}"),
        }

        let mut chunk_events = 0;
        loop {
            match rx.recv().await.unwrap() {
                ProgressEvent::ChunkCompleted {
                    completed, total, ..
                } => {
                    chunk_events += 1;
                    assert!(completed <= total);
                }
                ProgressEvent::Completed {
                    succeeded, failed, ..
                } => {
                    assert_eq!(succeeded, 3);
                    assert_eq!(failed, 0);
                    break;
                }
                other => panic!("Unexpected event: {other:?}"),
            }
        }
        assert_eq!(chunk_events, 2);
    }

    #[tokio::test]
    async fn extract_document_miss_then_hit() {
        let extractor = Arc::new(MockExtractionService::new("packing list"));
        let pipeline = pipeline_with(
            fast_config(),
            Arc::clone(&extractor),
            Arc::new(MockUploadService::new()),
        );

        let first = pipeline
            .extract_document(b"packing list bytes", "pl.pdf", ExtractOptions::default())
            .await
            .unwrap();
        assert!(!first.cache_hit);
        assert_eq!(first.document.text, "packing list");

        let second = pipeline
            .extract_document(b"packing list bytes", "pl.pdf", ExtractOptions::default())
            .await
            .unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(extractor.call_count(), 1);
    }

    #[tokio::test]
    async fn extract_document_bypass_cache_forces_extraction() {
        let extractor = Arc::new(MockExtractionService::new("fresh"));
        let pipeline = pipeline_with(
            fast_config(),
            Arc::clone(&extractor),
            Arc::new(MockUploadService::new()),
        );

        pipeline
            .extract_document(b"doc", "d.pdf", ExtractOptions::default())
            .await
            .unwrap();
        let again = pipeline
            .extract_document(
                b"doc",
                "d.pdf",
                ExtractOptions {
                    bypass_cache: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!again.cache_hit);
        assert_eq!(extractor.call_count(), 2);
    }

    #[tokio::test]
    async fn extract_document_terminal_failure_is_an_error() {
        let extractor = Arc::new(MockExtractionService::new("unused").always_failing());
        let mut config = fast_config();
        config.retry.max_retries = 1;
        let pipeline = pipeline_with(config, extractor, Arc::new(MockUploadService::new()));

        let result = pipeline
            .extract_document(b"doc", "d.pdf", ExtractOptions::default())
            .await;
        match result {
            Err(PipelineError::Extraction(BatchError::RetriesExhausted { attempts, .. })) => {
                assert_eq!(attempts, 2)
            }
            other => panic!("Expected RetriesExhausted, got: {other:?}"),
        }
        assert_eq!(pipeline.monitor().metrics().failed_requests, 1);
    }

    #[tokio::test]
    async fn invalid_config_rejected_at_construction() {
        let config = PipelineConfig {
            chunk_size: 0,
            ..Default::default()
        };
        let result = DocumentPipeline::new(
            config,
            Arc::new(MockExtractionService::new("unused")),
            Arc::new(MockUploadService::new()),
        );
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }
}
