//! Sliding-window admission control for the extraction service.
//!
//! Three independent ceilings: requests per second, requests per minute,
//! and extraction tokens per minute. Each is evaluated over a sliding
//! window of recorded timestamps; entries older than the minute window are
//! pruned lazily on every check, so memory is bounded by request rate
//! rather than elapsed wall-clock time.

use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Sliding-window rate limiter.
///
/// Not internally synchronized; callers share it behind a `Mutex` and
/// never hold the guard across an await point.
pub struct RateLimiter {
    requests: Vec<Instant>,
    token_usages: Vec<(Instant, u64)>,
    config: RateLimitConfig,
}

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            requests: Vec::new(),
            token_usages: Vec::new(),
            config,
        }
    }

    /// Would a request started now stay within both request ceilings?
    pub fn can_make_request(&mut self) -> bool {
        let now = Instant::now();
        self.prune(now);

        let last_second = self
            .requests
            .iter()
            .filter(|ts| now.duration_since(**ts) < SECOND)
            .count();
        if last_second >= self.config.requests_per_second {
            return false;
        }

        self.requests.len() < self.config.requests_per_minute
    }

    /// Does the minute token budget admit `tokens` more?
    pub fn can_use_tokens(&mut self, tokens: u64) -> bool {
        let now = Instant::now();
        self.prune(now);

        let used: u64 = self.token_usages.iter().map(|(_, n)| n).sum();
        used.saturating_add(tokens) <= self.config.tokens_per_minute
    }

    /// Record one admitted request.
    pub fn record_request(&mut self) {
        self.requests.push(Instant::now());
    }

    /// Record tokens consumed by a completed extraction call.
    pub fn record_token_usage(&mut self, tokens: u64) {
        self.token_usages.push((Instant::now(), tokens));
    }

    /// Shortest wait after which `can_make_request` could return true.
    ///
    /// Zero when a request is admissible right now.
    pub fn time_until_next_request(&mut self) -> Duration {
        let now = Instant::now();
        self.prune(now);

        let mut wait = Duration::ZERO;

        let in_second: Vec<&Instant> = self
            .requests
            .iter()
            .filter(|ts| now.duration_since(**ts) < SECOND)
            .collect();
        if in_second.len() >= self.config.requests_per_second {
            if let Some(oldest) = in_second.first() {
                let age = now.duration_since(**oldest);
                wait = wait.max(SECOND.saturating_sub(age));
            }
        }

        if self.requests.len() >= self.config.requests_per_minute {
            if let Some(oldest) = self.requests.first() {
                let age = now.duration_since(*oldest);
                wait = wait.max(MINUTE.saturating_sub(age));
            }
        }

        wait
    }

    /// Drop timestamps and usages older than the minute window.
    fn prune(&mut self, now: Instant) {
        self.requests.retain(|ts| now.duration_since(*ts) < MINUTE);
        self.token_usages
            .retain(|(ts, _)| now.duration_since(*ts) < MINUTE);
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
