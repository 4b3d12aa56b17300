//! The hot (RAM-resident) cache tier (spec §4.11).
//!
//! Bounded by a size cap with LRU eviction at `evictionThreshold` (default
//! 80%): once the map grows past `capacity`, the least-recently-used
//! entries are dropped until occupancy falls back to `capacity *
//! evictionThreshold`. Recency is tracked with a monotonic logical clock
//! rather than wall-clock time, avoiding a syscall on every hit.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

struct Entry<V> {
    value: V,
    last_access: AtomicU64,
}

/// A bounded, LRU-evicting in-memory cache keyed by `K`.
pub struct HotCache<K, V> {
    map: DashMap<K, Entry<V>>,
    clock: AtomicU64,
    capacity: AtomicUsize,
    eviction_threshold: f64,
}

impl<K, V> HotCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A cache admitting up to `capacity` entries before evicting down to
    /// `capacity * eviction_threshold` (spec default: 0.8).
    pub fn new(capacity: usize, eviction_threshold: f64) -> Self {
        HotCache {
            map: DashMap::new(),
            clock: AtomicU64::new(0),
            capacity: AtomicUsize::new(capacity.max(1)),
            eviction_threshold: eviction_threshold.clamp(0.0, 1.0),
        }
    }

    /// Look up `key`, bumping its recency on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.map.get(key)?;
        entry.last_access.store(self.tick(), Ordering::Relaxed);
        Some(entry.value.clone())
    }

    /// Insert or overwrite `key`, then evict if over capacity.
    pub fn insert(&self, key: K, value: V) {
        self.map.insert(key, Entry { value, last_access: AtomicU64::new(self.tick()) });
        self.evict_if_needed();
    }

    /// Drop `key` if present (e.g. after a hard delete).
    pub fn invalidate(&self, key: &K) {
        self.map.remove(key);
    }

    /// Current resident entry count.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Current capacity (adjustable by the auto-tuner, spec §4.11).
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Replace the capacity, evicting immediately if the new value is
    /// smaller than current occupancy.
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity.max(1), Ordering::Relaxed);
        self.evict_if_needed();
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn evict_if_needed(&self) {
        let capacity = self.capacity();
        if self.map.len() <= capacity {
            return;
        }
        let target = ((capacity as f64) * self.eviction_threshold) as usize;
        let mut by_recency: Vec<(K, u64)> = self.map.iter().map(|e| (e.key().clone(), e.value().last_access.load(Ordering::Relaxed))).collect();
        by_recency.sort_by_key(|(_, last_access)| *last_access);
        let to_evict = self.map.len().saturating_sub(target.max(1));
        for (key, _) in by_recency.into_iter().take(to_evict) {
            self.map.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_after_insert_returns_the_value() {
        let cache: HotCache<u32, &str> = HotCache::new(10, 0.8);
        cache.insert(1, "a");
        assert_eq!(cache.get(&1), Some("a"));
    }

    #[test]
    fn miss_for_absent_key() {
        let cache: HotCache<u32, &str> = HotCache::new(10, 0.8);
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn eviction_drops_the_least_recently_used_entries() {
        let cache: HotCache<u32, u32> = HotCache::new(4, 0.5);
        for i in 0..4 {
            cache.insert(i, i);
        }
        // Touch 0..2 so they are more recent than 2..4 were at insert time.
        cache.get(&0);
        cache.get(&1);
        cache.insert(4, 4); // pushes over capacity, evicts down to 2 entries
        assert!(cache.len() <= 2);
        assert!(cache.get(&0).is_some());
        assert!(cache.get(&1).is_some());
    }

    #[test]
    fn invalidate_removes_the_entry() {
        let cache: HotCache<u32, &str> = HotCache::new(10, 0.8);
        cache.insert(1, "a");
        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn shrinking_capacity_evicts_immediately() {
        let cache: HotCache<u32, u32> = HotCache::new(10, 0.8);
        for i in 0..10 {
            cache.insert(i, i);
        }
        cache.set_capacity(2);
        assert!(cache.len() <= 2);
    }
}
