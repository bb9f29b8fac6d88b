//! Performance monitoring: per-request accounting, rolling latency
//! percentiles, token/cost totals, threshold violations, and a background
//! resource sampler.
//!
//! Violations fan out on a broadcast channel so any number of listeners
//! (or none) can react; emission never blocks the recording path.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{MonitorConfig, MonitorThresholds};

/// Hit-rate violations are meaningless on a handful of requests.
const MIN_LOOKUPS_FOR_HIT_RATE: u64 = 10;

/// Resource time-series retention.
const RESOURCE_RETENTION: Duration = Duration::from_secs(3600);

// ═══════════════════════════════════════════════════════════
// Records
// ═══════════════════════════════════════════════════════════

/// One completed request. Immutable once recorded.
#[derive(Debug, Clone, Serialize)]
pub struct RequestMetadata {
    pub request_id: String,
    pub fingerprint: String,
    pub file_size_bytes: u64,
    pub tokens_used: u64,
    pub response_time_ms: u64,
    pub cache_hit: bool,
    pub cost: f64,
    pub error: Option<String>,
}

/// Snapshot of aggregate metrics, recomputed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub average_response_time_ms: f64,
    pub p95_response_time_ms: u64,
    pub p99_response_time_ms: u64,
    pub violation_count: u64,
}

/// A recorded request that breached one or more configured limits.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdViolation {
    pub request_id: String,
    /// Human-readable description of each breached constraint.
    pub violations: Vec<String>,
    pub at: DateTime<Utc>,
}

/// One point of the process resource time-series.
#[derive(Debug, Clone, Serialize)]
pub struct ResourcePoint {
    pub at: DateTime<Utc>,
    pub memory_bytes: u64,
    pub cpu_percent: f64,
}

/// Human-oriented report: metrics plus the worst offenders and derived
/// recommendations.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub metrics: PerformanceMetrics,
    pub slowest_requests: Vec<RequestMetadata>,
    pub recent_resources: Vec<ResourcePoint>,
    pub recommendations: Vec<String>,
}

// ═══════════════════════════════════════════════════════════
// PerformanceMonitor
// ═══════════════════════════════════════════════════════════

/// Tracks every completed request and raises threshold violations.
pub struct PerformanceMonitor {
    inner: Mutex<MonitorInner>,
    config: MonitorConfig,
    violations_tx: broadcast::Sender<ThresholdViolation>,
}

struct MonitorInner {
    history: VecDeque<RequestMetadata>,
    response_times: VecDeque<u64>,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    cache_hits: u64,
    cache_misses: u64,
    total_tokens: u64,
    total_cost: f64,
    violation_count: u64,
    resources: VecDeque<(Instant, ResourcePoint)>,
    last_cpu: Option<CpuSample>,
}

struct CpuSample {
    ticks: u64,
    at: Instant,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let (violations_tx, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(MonitorInner {
                history: VecDeque::new(),
                response_times: VecDeque::new(),
                total_requests: 0,
                successful_requests: 0,
                failed_requests: 0,
                cache_hits: 0,
                cache_misses: 0,
                total_tokens: 0,
                total_cost: 0.0,
                violation_count: 0,
                resources: VecDeque::new(),
                last_cpu: None,
            }),
            config,
            violations_tx,
        }
    }

    /// Record one completed request and evaluate thresholds against it.
    pub fn record_request(&self, metadata: RequestMetadata) {
        let violation = {
            let mut inner = self.lock();

            inner.total_requests += 1;
            if metadata.error.is_some() {
                inner.failed_requests += 1;
            } else {
                inner.successful_requests += 1;
            }

            if metadata.cache_hit {
                inner.cache_hits += 1;
            } else {
                inner.cache_misses += 1;
                // Cache hits are free: tokens and cost accrue on real
                // extraction calls only.
                inner.total_tokens += metadata.tokens_used;
                inner.total_cost += metadata.cost;
            }

            if inner.response_times.len() >= self.config.response_window {
                inner.response_times.pop_front();
            }
            inner.response_times.push_back(metadata.response_time_ms);

            let breaches = self.evaluate_thresholds(&inner, &metadata);

            if inner.history.len() >= self.config.history_size {
                inner.history.pop_front();
            }
            inner.history.push_back(metadata.clone());

            if breaches.is_empty() {
                None
            } else {
                inner.violation_count += 1;
                Some(ThresholdViolation {
                    request_id: metadata.request_id.clone(),
                    violations: breaches,
                    at: Utc::now(),
                })
            }
        };

        if let Some(violation) = violation {
            tracing::warn!(
                request_id = %violation.request_id,
                violations = ?violation.violations,
                "Performance threshold violated"
            );
            // No receivers is fine.
            let _ = self.violations_tx.send(violation);
        }
    }

    /// Subscribe to threshold violation notifications.
    pub fn subscribe_violations(&self) -> broadcast::Receiver<ThresholdViolation> {
        self.violations_tx.subscribe()
    }

    /// Current aggregate metrics.
    pub fn metrics(&self) -> PerformanceMetrics {
        let inner = self.lock();
        Self::metrics_of(&inner)
    }

    /// Metrics plus slowest requests, recent resource usage, and derived
    /// recommendations.
    pub fn performance_report(&self) -> PerformanceReport {
        let inner = self.lock();
        let metrics = Self::metrics_of(&inner);

        let mut slowest: Vec<RequestMetadata> = inner.history.iter().cloned().collect();
        slowest.sort_by(|a, b| b.response_time_ms.cmp(&a.response_time_ms));
        slowest.truncate(5);

        let recent_resources = inner
            .resources
            .iter()
            .map(|(_, point)| point.clone())
            .collect();

        PerformanceReport {
            generated_at: Utc::now(),
            recommendations: self.recommendations(&metrics),
            metrics,
            slowest_requests: slowest,
            recent_resources,
        }
    }

    /// Zero out counters, history, and the resource time-series.
    pub fn reset_metrics(&self) {
        let mut inner = self.lock();
        inner.history.clear();
        inner.response_times.clear();
        inner.total_requests = 0;
        inner.successful_requests = 0;
        inner.failed_requests = 0;
        inner.cache_hits = 0;
        inner.cache_misses = 0;
        inner.total_tokens = 0;
        inner.total_cost = 0.0;
        inner.violation_count = 0;
        inner.resources.clear();
    }

    /// Start periodic process resource sampling. Stops when the handle is
    /// shut down or dropped.
    pub fn spawn_sampler(self: &Arc<Self>) -> SamplerHandle {
        let monitor = Arc::clone(self);
        let period = Duration::from_secs(self.config.sample_interval_secs.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                monitor.sample_resources();
            }
        });

        SamplerHandle { handle }
    }

    /// Take one resource sample and trim the retention window.
    pub fn sample_resources(&self) {
        let memory_bytes = read_memory_bytes();
        let now = Instant::now();

        let mut inner = self.lock();
        let cpu_percent = cpu_percent(&mut inner.last_cpu, now);

        inner.resources.push_back((
            now,
            ResourcePoint {
                at: Utc::now(),
                memory_bytes,
                cpu_percent,
            },
        ));
        while let Some((taken, _)) = inner.resources.front() {
            if now.duration_since(*taken) > RESOURCE_RETENTION {
                inner.resources.pop_front();
            } else {
                break;
            }
        }
    }

    // ── Internal ────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, MonitorInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn metrics_of(inner: &MonitorInner) -> PerformanceMetrics {
        let lookups = inner.cache_hits + inner.cache_misses;
        let cache_hit_rate = if lookups == 0 {
            0.0
        } else {
            inner.cache_hits as f64 / lookups as f64
        };

        let mut sorted: Vec<u64> = inner.response_times.iter().copied().collect();
        sorted.sort_unstable();
        let average_response_time_ms = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<u64>() as f64 / sorted.len() as f64
        };

        PerformanceMetrics {
            total_requests: inner.total_requests,
            successful_requests: inner.successful_requests,
            failed_requests: inner.failed_requests,
            cache_hits: inner.cache_hits,
            cache_misses: inner.cache_misses,
            cache_hit_rate,
            total_tokens: inner.total_tokens,
            total_cost: inner.total_cost,
            average_response_time_ms,
            p95_response_time_ms: percentile(&sorted, 0.95),
            p99_response_time_ms: percentile(&sorted, 0.99),
            violation_count: inner.violation_count,
        }
    }

    fn evaluate_thresholds(&self, inner: &MonitorInner, metadata: &RequestMetadata) -> Vec<String> {
        let t: &MonitorThresholds = &self.config.thresholds;
        let mut breaches = Vec::new();

        if metadata.response_time_ms > t.max_response_time_ms {
            breaches.push(format!(
                "response time {}ms exceeds {}ms",
                metadata.response_time_ms, t.max_response_time_ms
            ));
        }
        if metadata.tokens_used > t.max_tokens_per_request {
            breaches.push(format!(
                "token usage {} exceeds {}",
                metadata.tokens_used, t.max_tokens_per_request
            ));
        }
        if metadata.cost > t.max_cost_per_request {
            breaches.push(format!(
                "cost {:.4} exceeds {:.4}",
                metadata.cost, t.max_cost_per_request
            ));
        }

        let lookups = inner.cache_hits + inner.cache_misses;
        if lookups >= MIN_LOOKUPS_FOR_HIT_RATE {
            let hit_rate = inner.cache_hits as f64 / lookups as f64;
            if hit_rate < t.min_cache_hit_rate {
                breaches.push(format!(
                    "cache hit rate {:.2} below minimum {:.2}",
                    hit_rate, t.min_cache_hit_rate
                ));
            }
        }

        breaches
    }

    fn recommendations(&self, metrics: &PerformanceMetrics) -> Vec<String> {
        let mut out = Vec::new();
        let t = &self.config.thresholds;
        let lookups = metrics.cache_hits + metrics.cache_misses;

        if lookups >= MIN_LOOKUPS_FOR_HIT_RATE && metrics.cache_hit_rate < t.min_cache_hit_rate {
            out.push(
                "Cache hit rate is low: increase cache size or TTL, or check for \
                 highly unique document sets"
                    .to_string(),
            );
        }
        if metrics.p95_response_time_ms > t.max_response_time_ms {
            out.push(
                "p95 response time exceeds the configured limit: lower concurrency \
                 or batch size, or raise rate limits"
                    .to_string(),
            );
        }
        if metrics.total_requests > 0 {
            let failure_rate = metrics.failed_requests as f64 / metrics.total_requests as f64;
            if failure_rate > 0.1 {
                out.push(
                    "More than 10% of requests fail: inspect extraction service \
                     health and retry configuration"
                        .to_string(),
                );
            }
        }
        out
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let index = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

// ═══════════════════════════════════════════════════════════
// Process resource probes
// ═══════════════════════════════════════════════════════════

#[cfg(target_os = "linux")]
fn read_memory_bytes() -> u64 {
    // /proc/self/statm field 2 is resident pages.
    std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|s| s.split_whitespace().nth(1).and_then(|v| v.parse::<u64>().ok()))
        .map(|pages| pages * 4096)
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn read_memory_bytes() -> u64 {
    // Conservative fallback off Linux: no sample rather than a wrong one.
    0
}

#[cfg(target_os = "linux")]
fn read_cpu_ticks() -> Option<u64> {
    // /proc/self/stat fields 14 and 15 are utime and stime in clock ticks.
    // The comm field may contain spaces, so parse after the closing paren.
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    let after_comm = stat.rsplit(')').next()?;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_ticks() -> Option<u64> {
    None
}

/// Approximate CPU percent since the previous sample.
fn cpu_percent(last: &mut Option<CpuSample>, now: Instant) -> f64 {
    const TICKS_PER_SEC: f64 = 100.0;

    let Some(ticks) = read_cpu_ticks() else {
        return 0.0;
    };

    let percent = match last {
        Some(prev) => {
            let elapsed = now.duration_since(prev.at).as_secs_f64();
            if elapsed <= 0.0 {
                0.0
            } else {
                let delta = ticks.saturating_sub(prev.ticks) as f64;
                (delta / TICKS_PER_SEC / elapsed) * 100.0
            }
        }
        None => 0.0,
    };

    *last = Some(CpuSample { ticks, at: now });
    percent
}

// ═══════════════════════════════════════════════════════════
// Sampler handle
// ═══════════════════════════════════════════════════════════

/// Owns the background sampling task. Aborts it on shutdown or drop.
pub struct SamplerHandle {
    handle: JoinHandle<()>,
}

impl SamplerHandle {
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
