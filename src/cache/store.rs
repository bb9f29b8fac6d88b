//! The cache store: TTL expiry, budget-enforced admission, eviction, and
//! the background sweep task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;

use super::compression;
use super::entry::{CacheEntry, StoredValue};
use crate::config::CacheConfig;
use crate::services::ExtractedDocument;

// ═══════════════════════════════════════════════════════════
// CacheStore
// ═══════════════════════════════════════════════════════════

/// Content-addressed store for extraction results.
///
/// All mutation happens under one internal lock held only for synchronous
/// sections, so eviction and insertion are a single step from the caller's
/// perspective and the cache is never observably over budget.
pub struct CacheStore {
    inner: Mutex<StoreInner>,
    config: CacheConfig,
}

struct StoreInner {
    entries: HashMap<String, CacheEntry>,
    /// Front = least recently used. Updated on every get and set.
    access_order: Vec<String>,
    total_size_bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expired: u64,
    compression_savings_bytes: u64,
    get_latency_total_us: u64,
    get_samples: u64,
    constraint_breaches: u64,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                entries: HashMap::new(),
                access_order: Vec::new(),
                total_size_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                expired: 0,
                compression_savings_bytes: 0,
                get_latency_total_us: 0,
                get_samples: 0,
                constraint_breaches: 0,
            }),
            config,
        }
    }

    /// Look up an extraction result by fingerprint.
    ///
    /// Expired entries are deleted and reported as a plain miss.
    pub fn get(&self, fingerprint: &str) -> Option<ExtractedDocument> {
        let start = Instant::now();
        let ttl = Duration::from_secs(self.config.ttl_seconds);
        let mut inner = self.lock();

        let expired = matches!(
            inner.entries.get(fingerprint),
            Some(entry) if entry.is_expired(ttl)
        );
        if expired {
            remove_entry(&mut inner, fingerprint);
            inner.expired += 1;
            inner.misses += 1;
            record_get_latency(&mut inner, start);
            return None;
        }

        let decoded = match inner.entries.get_mut(fingerprint) {
            None => {
                inner.misses += 1;
                record_get_latency(&mut inner, start);
                return None;
            }
            Some(entry) => {
                entry.touch();
                decode_value(&entry.value)
            }
        };

        match decoded {
            Some(doc) => {
                promote(&mut inner, fingerprint);
                inner.hits += 1;
                record_get_latency(&mut inner, start);
                Some(doc)
            }
            None => {
                // Corrupt entry: drop it and report a miss.
                tracing::warn!(fingerprint, "Dropping undecodable cache entry");
                remove_entry(&mut inner, fingerprint);
                inner.misses += 1;
                record_get_latency(&mut inner, start);
                None
            }
        }
    }

    /// Insert an extraction result, evicting as needed to stay within the
    /// byte and entry budgets.
    pub fn set(&self, fingerprint: &str, value: &ExtractedDocument) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot serialize extraction result for caching");
                return;
            }
        };
        let size_bytes = bytes.len() as u64;

        if size_bytes > self.config.max_size_bytes {
            tracing::debug!(
                fingerprint,
                size_bytes,
                budget = self.config.max_size_bytes,
                "Entry larger than whole cache budget, not caching"
            );
            return;
        }

        let (stored, compressed, saved) = self.encode(bytes, size_bytes);

        let mut inner = self.lock();

        // Replacing an existing entry must not double-count its size.
        remove_entry(&mut inner, fingerprint);

        while !inner.entries.is_empty()
            && (inner.entries.len() >= self.config.max_entries
                || inner.total_size_bytes + size_bytes > self.config.max_size_bytes)
        {
            let victim = self
                .config
                .eviction_strategy
                .select_victim(&inner.entries, &inner.access_order);
            match victim {
                Some(key) => {
                    tracing::debug!(
                        victim = %key,
                        strategy = self.config.eviction_strategy.as_str(),
                        "Evicting cache entry"
                    );
                    remove_entry(&mut inner, &key);
                    inner.evictions += 1;
                }
                None => break,
            }
        }

        inner.compression_savings_bytes += saved;
        inner
            .entries
            .insert(fingerprint.to_string(), CacheEntry::new(stored, size_bytes, compressed));
        inner.access_order.push(fingerprint.to_string());
        inner.total_size_bytes += size_bytes;

        // Budget breach after enforce-then-insert is a defect, never an
        // error to the caller.
        if inner.entries.len() > self.config.max_entries
            || inner.total_size_bytes > self.config.max_size_bytes
        {
            inner.constraint_breaches += 1;
            tracing::error!(
                entries = inner.entries.len(),
                total_size_bytes = inner.total_size_bytes,
                "Cache over budget after insertion"
            );
        }
    }

    /// Remove one entry. Returns whether it existed.
    pub fn invalidate(&self, fingerprint: &str) -> bool {
        let mut inner = self.lock();
        remove_entry(&mut inner, fingerprint).is_some()
    }

    /// Drop every entry. Statistics counters are preserved.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.access_order.clear();
        inner.total_size_bytes = 0;
    }

    /// Delete all expired entries. Returns how many were removed.
    ///
    /// Keeps TTL honest for cold entries that no `get` ever visits.
    pub fn sweep_expired(&self) -> usize {
        let ttl = Duration::from_secs(self.config.ttl_seconds);
        let mut inner = self.lock();

        let stale: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(ttl))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            remove_entry(&mut inner, key);
        }
        inner.expired += stale.len() as u64;
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Snapshot of cache statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let lookups = inner.hits + inner.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            inner.hits as f64 / lookups as f64
        };
        let average_get_latency_us = if inner.get_samples == 0 {
            0.0
        } else {
            inner.get_latency_total_us as f64 / inner.get_samples as f64
        };

        let mut oldest: Option<Duration> = None;
        let mut newest: Option<Duration> = None;
        for entry in inner.entries.values() {
            let age = entry.created_at.elapsed();
            oldest = Some(oldest.map_or(age, |o| o.max(age)));
            newest = Some(newest.map_or(age, |n| n.min(age)));
        }

        CacheStats {
            hit_count: inner.hits,
            miss_count: inner.misses,
            hit_rate,
            eviction_count: inner.evictions,
            expired_count: inner.expired,
            entry_count: inner.entries.len(),
            total_size_bytes: inner.total_size_bytes,
            compression_savings_bytes: inner.compression_savings_bytes,
            average_get_latency_us,
            oldest_entry_age_secs: oldest.map(|d| d.as_secs_f64()),
            newest_entry_age_secs: newest.map(|d| d.as_secs_f64()),
            constraint_breaches: inner.constraint_breaches,
        }
    }

    /// Start the periodic expiry sweep. The task stops when the returned
    /// handle is shut down or dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let store = Arc::clone(self);
        let period = Duration::from_secs(self.config.sweep_interval_secs.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval fires immediately on the first tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep_expired();
                if removed > 0 {
                    tracing::debug!(removed, "Cache sweep removed expired entries");
                }
            }
        });

        SweeperHandle { handle }
    }

    // ── Internal ────────────────────────────────────────────

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Choose the stored representation, returning (value, compressed,
    /// bytes saved).
    fn encode(&self, bytes: Vec<u8>, size_bytes: u64) -> (StoredValue, bool, u64) {
        if !self.config.enable_compression || size_bytes <= self.config.compression_threshold_bytes
        {
            return (StoredValue::Plain(bytes), false, 0);
        }

        match compression::compress(&bytes) {
            Ok(packed) if (packed.len() as u64) < size_bytes => {
                let saved = size_bytes - packed.len() as u64;
                (StoredValue::Compressed(packed), true, saved)
            }
            Ok(_) => (StoredValue::Plain(bytes), false, 0),
            Err(e) => {
                tracing::warn!(error = %e, "Compression failed, storing entry uncompressed");
                (StoredValue::Plain(bytes), false, 0)
            }
        }
    }
}

fn decode_value(value: &StoredValue) -> Option<ExtractedDocument> {
    let bytes = match value {
        StoredValue::Plain(bytes) => std::borrow::Cow::Borrowed(bytes.as_slice()),
        StoredValue::Compressed(bytes) => match compression::decompress(bytes) {
            Ok(unpacked) => std::borrow::Cow::Owned(unpacked),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decompress cache entry");
                return None;
            }
        },
    };
    serde_json::from_slice(&bytes).ok()
}

fn remove_entry(inner: &mut StoreInner, fingerprint: &str) -> Option<CacheEntry> {
    let entry = inner.entries.remove(fingerprint)?;
    inner.total_size_bytes = inner.total_size_bytes.saturating_sub(entry.size_bytes);
    inner.access_order.retain(|key| key != fingerprint);
    Some(entry)
}

/// Move a key to the most-recently-used end of the order list.
fn promote(inner: &mut StoreInner, fingerprint: &str) {
    inner.access_order.retain(|key| key != fingerprint);
    inner.access_order.push(fingerprint.to_string());
}

fn record_get_latency(inner: &mut StoreInner, start: Instant) {
    inner.get_latency_total_us += start.elapsed().as_micros() as u64;
    inner.get_samples += 1;
}

// ═══════════════════════════════════════════════════════════
// Stats
// ═══════════════════════════════════════════════════════════

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
    pub eviction_count: u64,
    pub expired_count: u64,
    pub entry_count: usize,
    pub total_size_bytes: u64,
    pub compression_savings_bytes: u64,
    pub average_get_latency_us: f64,
    pub oldest_entry_age_secs: Option<f64>,
    pub newest_entry_age_secs: Option<f64>,
    /// Internal-defect counter; nonzero values indicate a bug, not a
    /// caller error.
    pub constraint_breaches: u64,
}

// ═══════════════════════════════════════════════════════════
// Sweeper handle
// ═══════════════════════════════════════════════════════════

/// Owns the background sweep task. Aborts it on shutdown or drop.
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionStrategy;
    use crate::services::ExtractedPage;

    fn doc(text: &str) -> ExtractedDocument {
        ExtractedDocument {
            text: text.to_string(),
            pages: vec![ExtractedPage {
                page_number: 1,
                text: text.to_string(),
            }],
            num_pages: 1,
            tokens_used: 10,
        }
    }

    fn store(max_entries: usize, strategy: EvictionStrategy) -> CacheStore {
        CacheStore::new(CacheConfig {
            max_entries,
            eviction_strategy: strategy,
            enable_compression: false,
            ..Default::default()
        })
    }

    #[test]
    fn miss_then_hit() {
        let cache = store(10, EvictionStrategy::Lru);
        assert!(cache.get("fp-a").is_none());

        cache.set("fp-a", &doc("delivery note"));
        let hit = cache.get("fp-a").unwrap();
        assert_eq!(hit.text, "delivery note");

        let stats = cache.stats();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn lru_insert_without_reads_evicts_first_inserted() {
        let cache = store(2, EvictionStrategy::Lru);
        cache.set("a", &doc("A"));
        cache.set("b", &doc("B"));
        cache.set("c", &doc("C"));

        assert!(cache.get("a").is_none(), "A should have been evicted");
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().eviction_count, 1);
    }

    #[test]
    fn lru_recent_read_protects_entry() {
        let cache = store(2, EvictionStrategy::Lru);
        cache.set("a", &doc("A"));
        cache.set("b", &doc("B"));
        cache.get("a");
        cache.set("c", &doc("C"));

        assert!(cache.get("a").is_some(), "A was most recently used");
        assert!(cache.get("b").is_none(), "B was least recently used");
    }

    #[test]
    fn lfu_evicts_least_frequently_accessed() {
        let cache = store(2, EvictionStrategy::Lfu);
        cache.set("a", &doc("A"));
        cache.set("b", &doc("B"));
        cache.get("a");
        cache.get("a");
        cache.get("b");
        cache.set("c", &doc("C"));

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn fifo_evicts_oldest_regardless_of_access() {
        let cache = store(2, EvictionStrategy::Fifo);
        cache.set("a", &doc("A"));
        std::thread::sleep(Duration::from_millis(5));
        cache.set("b", &doc("B"));
        cache.get("a");
        cache.get("a");
        cache.set("c", &doc("C"));

        assert!(cache.get("a").is_none(), "oldest entry goes first under fifo");
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn entry_count_never_exceeds_budget() {
        let cache = store(3, EvictionStrategy::Lru);
        for i in 0..20 {
            cache.set(&format!("fp-{i}"), &doc("payload"));
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn byte_budget_never_exceeded() {
        let one_entry = serde_json::to_vec(&doc("fixed-size")).unwrap().len() as u64;
        let cache = CacheStore::new(CacheConfig {
            max_entries: 100,
            max_size_bytes: one_entry * 3 + 1,
            enable_compression: false,
            ..Default::default()
        });

        for i in 0..10 {
            cache.set(&format!("fp-{i}"), &doc("fixed-size"));
            assert!(cache.stats().total_size_bytes <= one_entry * 3 + 1);
        }
        assert_eq!(cache.stats().constraint_breaches, 0);
    }

    #[test]
    fn expired_entry_is_a_plain_miss() {
        let cache = CacheStore::new(CacheConfig {
            ttl_seconds: 0,
            enable_compression: false,
            ..Default::default()
        });
        cache.set("fp", &doc("stale"));
        std::thread::sleep(Duration::from_millis(2));

        assert!(cache.get("fp").is_none());
        let stats = cache.stats();
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_count, 0);
        assert_eq!(stats.expired_count, 1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn ttl_ignores_access_count() {
        let cache = CacheStore::new(CacheConfig {
            ttl_seconds: 0,
            enable_compression: false,
            ..Default::default()
        });
        cache.set("fp", &doc("hot but old"));
        std::thread::sleep(Duration::from_millis(2));
        // Even a previously hot entry expires on schedule.
        assert!(cache.get("fp").is_none());
        assert!(cache.get("fp").is_none());
    }

    #[test]
    fn replacing_key_does_not_double_count_size() {
        let cache = store(10, EvictionStrategy::Lru);
        cache.set("fp", &doc("v1"));
        let size_v1 = cache.stats().total_size_bytes;
        cache.set("fp", &doc("v2"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().total_size_bytes, size_v1);
    }

    #[test]
    fn invalidate_reports_presence() {
        let cache = store(10, EvictionStrategy::Lru);
        cache.set("fp", &doc("x"));
        assert!(cache.invalidate("fp"));
        assert!(!cache.invalidate("fp"));
        assert!(cache.get("fp").is_none());
    }

    #[test]
    fn clear_empties_but_keeps_counters() {
        let cache = store(10, EvictionStrategy::Lru);
        cache.set("fp", &doc("x"));
        cache.get("fp");
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().total_size_bytes, 0);
        assert_eq!(cache.stats().hit_count, 1);
    }

    #[test]
    fn large_entry_compressed_and_recovered_intact() {
        let cache = CacheStore::new(CacheConfig {
            enable_compression: true,
            compression_threshold_bytes: 64,
            ..Default::default()
        });
        let big = doc(&"pallet 12 x widget crate ".repeat(200));
        cache.set("fp", &big);

        {
            let inner = cache.lock();
            assert!(inner.entries.get("fp").unwrap().compressed);
        }
        assert!(cache.stats().compression_savings_bytes > 0);

        let back = cache.get("fp").unwrap();
        assert_eq!(back.text, big.text);
        assert_eq!(back.pages.len(), big.pages.len());
    }

    #[test]
    fn small_entry_stays_uncompressed() {
        let cache = CacheStore::new(CacheConfig {
            enable_compression: true,
            compression_threshold_bytes: 10 * 1024,
            ..Default::default()
        });
        cache.set("fp", &doc("tiny"));
        let inner = cache.lock();
        assert!(!inner.entries.get("fp").unwrap().compressed);
    }

    #[test]
    fn entry_larger_than_whole_budget_not_cached() {
        let cache = CacheStore::new(CacheConfig {
            max_size_bytes: 16,
            enable_compression: false,
            ..Default::default()
        });
        cache.set("fp", &doc("definitely larger than sixteen bytes"));
        assert!(cache.is_empty());
    }

    #[test]
    fn sweep_removes_cold_expired_entries() {
        let cache = CacheStore::new(CacheConfig {
            ttl_seconds: 0,
            enable_compression: false,
            ..Default::default()
        });
        cache.set("a", &doc("A"));
        cache.set("b", &doc("B"));
        std::thread::sleep(Duration::from_millis(2));

        let removed = cache.sweep_expired();
        assert_eq!(removed, 2);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expired_count, 2);
    }

    #[tokio::test]
    async fn background_sweeper_expires_entries_without_traffic() {
        let cache = Arc::new(CacheStore::new(CacheConfig {
            ttl_seconds: 0,
            sweep_interval_secs: 1,
            enable_compression: false,
            ..Default::default()
        }));
        cache.set("cold", &doc("never read again"));

        let _sweeper = cache.spawn_sweeper();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(cache.is_empty());
    }

    #[test]
    fn stats_report_entry_ages() {
        let cache = store(10, EvictionStrategy::Lru);
        assert!(cache.stats().oldest_entry_age_secs.is_none());

        cache.set("fp", &doc("x"));
        let stats = cache.stats();
        assert!(stats.oldest_entry_age_secs.is_some());
        assert!(stats.newest_entry_age_secs.unwrap() <= stats.oldest_entry_age_secs.unwrap());
    }
}
