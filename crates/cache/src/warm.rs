//! The warm (TTL-bounded) cache tier (spec §4.11): survives hot-cache
//! eviction for a bounded time, trading memory for a cheaper miss than
//! falling all the way through to cold storage.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A TTL-expiring cache keyed by `K`, default TTL 1 hour (spec §4.11).
pub struct WarmCache<K, V> {
    map: DashMap<K, Entry<V>>,
    ttl: Duration,
}

impl<K, V> WarmCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A warm cache whose entries live for `ttl` after insertion.
    pub fn new(ttl: Duration) -> Self {
        WarmCache { map: DashMap::new(), ttl }
    }

    /// Look up `key`. An expired entry is treated as a miss and removed.
    pub fn get(&self, key: &K) -> Option<V> {
        let hit = self.map.get(key)?;
        if hit.expires_at <= Instant::now() {
            drop(hit);
            self.map.remove(key);
            return None;
        }
        Some(hit.value.clone())
    }

    /// Insert or refresh `key`'s TTL.
    pub fn insert(&self, key: K, value: V) {
        self.map.insert(key, Entry { value, expires_at: Instant::now() + self.ttl });
    }

    /// Drop `key` if present.
    pub fn invalidate(&self, key: &K) {
        self.map.remove(key);
    }

    /// Current resident entry count, including not-yet-expired entries
    /// only lazily reaped on access.
    pub fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_hits() {
        let cache: WarmCache<u32, &str> = WarmCache::new(Duration::from_secs(60));
        cache.insert(1, "a");
        assert_eq!(cache.get(&1), Some("a"));
    }

    #[test]
    fn expired_entry_misses_and_is_reaped() {
        let cache: WarmCache<u32, &str> = WarmCache::new(Duration::from_millis(1));
        cache.insert(1, "a");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.len(), 0);
    }
}
