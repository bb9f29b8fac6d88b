//! One cached extraction result and its access metadata.

use std::time::{Duration, Instant};

/// How the value is held in memory.
#[derive(Debug, Clone)]
pub(crate) enum StoredValue {
    /// Serialized JSON of the extraction result.
    Plain(Vec<u8>),
    /// Gzip of the serialized JSON.
    Compressed(Vec<u8>),
}

/// A live cache entry.
///
/// `size_bytes` is the uncompressed serialized footprint, so capacity
/// accounting stays stable whether or not the entry was compressed.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub(crate) value: StoredValue,
    pub size_bytes: u64,
    pub created_at: Instant,
    pub last_accessed_at: Instant,
    pub access_count: u64,
    pub compressed: bool,
}

impl CacheEntry {
    pub(crate) fn new(value: StoredValue, size_bytes: u64, compressed: bool) -> Self {
        let now = Instant::now();
        Self {
            value,
            size_bytes,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            compressed,
        }
    }

    /// An entry never outlives its TTL, regardless of access pattern.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }

    /// Record a hit.
    pub(crate) fn touch(&mut self) {
        self.last_accessed_at = Instant::now();
        self.access_count += 1;
    }
}
