//! Eviction strategy selection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::entry::CacheEntry;

/// Which entry gives way when a cache budget is hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionStrategy {
    /// Least recently accessed goes first.
    Lru,
    /// Lowest access count goes first.
    Lfu,
    /// Oldest entry goes first.
    Fifo,
}

impl EvictionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Lfu => "lfu",
            Self::Fifo => "fifo",
        }
    }

    /// Pick the fingerprint to evict. Ties go to the first match in
    /// iteration order.
    ///
    /// `access_order` is maintained by the store: front is the least
    /// recently used key.
    pub(crate) fn select_victim(
        &self,
        entries: &HashMap<String, CacheEntry>,
        access_order: &[String],
    ) -> Option<String> {
        if entries.is_empty() {
            return None;
        }

        match self {
            Self::Lru => access_order
                .iter()
                .find(|key| entries.contains_key(key.as_str()))
                .cloned(),
            Self::Lfu => {
                let mut victim: Option<(&String, u64)> = None;
                for (key, entry) in entries {
                    match victim {
                        Some((_, count)) if entry.access_count >= count => {}
                        _ => victim = Some((key, entry.access_count)),
                    }
                }
                victim.map(|(key, _)| key.clone())
            }
            Self::Fifo => {
                let mut victim: Option<(&String, std::time::Instant)> = None;
                for (key, entry) in entries {
                    match victim {
                        Some((_, created)) if entry.created_at >= created => {}
                        _ => victim = Some((key, entry.created_at)),
                    }
                }
                victim.map(|(key, _)| key.clone())
            }
        }
    }
}

impl std::fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::super::entry::StoredValue;
    use super::*;

    fn entry(access_count: u64) -> CacheEntry {
        let mut e = CacheEntry::new(StoredValue::Plain(b"{}".to_vec()), 2, false);
        e.access_count = access_count;
        e
    }

    #[test]
    fn lru_picks_front_of_access_order() {
        let mut entries = HashMap::new();
        entries.insert("a".to_string(), entry(5));
        entries.insert("b".to_string(), entry(1));
        let order = vec!["b".to_string(), "a".to_string()];

        let victim = EvictionStrategy::Lru.select_victim(&entries, &order);
        assert_eq!(victim.as_deref(), Some("b"));
    }

    #[test]
    fn lru_skips_stale_order_keys() {
        // Keys can linger in the order list after explicit invalidation.
        let mut entries = HashMap::new();
        entries.insert("b".to_string(), entry(0));
        let order = vec!["gone".to_string(), "b".to_string()];

        let victim = EvictionStrategy::Lru.select_victim(&entries, &order);
        assert_eq!(victim.as_deref(), Some("b"));
    }

    #[test]
    fn lfu_picks_lowest_access_count() {
        let mut entries = HashMap::new();
        entries.insert("hot".to_string(), entry(10));
        entries.insert("cold".to_string(), entry(1));
        entries.insert("warm".to_string(), entry(4));

        let victim = EvictionStrategy::Lfu.select_victim(&entries, &[]);
        assert_eq!(victim.as_deref(), Some("cold"));
    }

    #[test]
    fn fifo_picks_oldest_created() {
        let mut entries = HashMap::new();
        let old = entry(9);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let new = entry(0);
        entries.insert("old".to_string(), old);
        entries.insert("new".to_string(), new);

        let victim = EvictionStrategy::Fifo.select_victim(&entries, &[]);
        assert_eq!(victim.as_deref(), Some("old"));
    }

    #[test]
    fn empty_cache_has_no_victim() {
        let entries = HashMap::new();
        assert!(EvictionStrategy::Lru.select_victim(&entries, &[]).is_none());
        assert!(EvictionStrategy::Lfu.select_victim(&entries, &[]).is_none());
        assert!(EvictionStrategy::Fifo.select_victim(&entries, &[]).is_none());
    }

    #[test]
    fn strategy_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&EvictionStrategy::Lru).unwrap(),
            "\"lru\""
        );
        assert_eq!(
            serde_json::to_string(&EvictionStrategy::Fifo).unwrap(),
            "\"fifo\""
        );
    }
}
