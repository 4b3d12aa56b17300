//! Read-write gate over HNSW structural mutation (spec §5).
//!
//! "Searches may proceed concurrently; insert/delete serialize." A
//! `parking_lot::RwLock` gives us that directly: any number of readers
//! (searches) hold a read guard concurrently, while a single writer
//! (insert/delete) excludes everyone else for the duration of its graph
//! surgery. The memory-usage counter is an `AtomicUsize` updated only
//! while the write guard is held, so it needs no separate lock (spec §5:
//! "no separate lock needed since mutation already serializes through the
//! RwLock").

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wraps a value `T` (typically the HNSW graph) behind a read-write lock,
/// plus a side counter for the index's estimated memory footprint.
pub struct IndexLock<T> {
    inner: RwLock<T>,
    memory_usage_bytes: AtomicUsize,
}

impl<T> IndexLock<T> {
    /// Wrap `value` with a fresh lock and a zeroed memory counter.
    pub fn new(value: T) -> Self {
        IndexLock { inner: RwLock::new(value), memory_usage_bytes: AtomicUsize::new(0) }
    }

    /// Acquire a read guard. Any number of readers may hold this
    /// concurrently; blocks only while a writer holds the write guard.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    /// Acquire the write guard. Excludes all readers and other writers
    /// for its lifetime — callers should hold it only for the duration of
    /// one structural mutation (one insert or one delete), not across I/O.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    /// Try to acquire a read guard without blocking.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.inner.try_read()
    }

    /// Current estimated memory usage, in bytes.
    pub fn memory_usage_bytes(&self) -> usize {
        self.memory_usage_bytes.load(Ordering::Relaxed)
    }

    /// Add to the memory-usage counter. Callers hold the write guard
    /// while calling this, which is why `Relaxed` ordering is sufficient:
    /// the write guard itself is the synchronization point readers
    /// observe, not this atomic.
    pub fn add_memory_usage(&self, delta: usize) {
        self.memory_usage_bytes.fetch_add(delta, Ordering::Relaxed);
    }

    /// Subtract from the memory-usage counter, saturating at zero.
    pub fn sub_memory_usage(&self, delta: usize) {
        self.memory_usage_bytes.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| Some(cur.saturating_sub(delta))).ok();
    }

    /// Consume the lock, returning the inner value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_reads_do_not_block_each_other() {
        let lock = IndexLock::new(vec![1, 2, 3]);
        let a = lock.read();
        let b = lock.read();
        assert_eq!(*a, *b);
    }

    #[test]
    fn memory_usage_tracks_add_and_sub() {
        let lock = IndexLock::new(());
        lock.add_memory_usage(100);
        lock.add_memory_usage(50);
        assert_eq!(lock.memory_usage_bytes(), 150);
        lock.sub_memory_usage(30);
        assert_eq!(lock.memory_usage_bytes(), 120);
    }

    #[test]
    fn memory_usage_saturates_at_zero() {
        let lock = IndexLock::new(());
        lock.add_memory_usage(10);
        lock.sub_memory_usage(1000);
        assert_eq!(lock.memory_usage_bytes(), 0);
    }

    #[test]
    fn write_guard_mutates_value() {
        let lock = IndexLock::new(vec![1]);
        lock.write().push(2);
        assert_eq!(*lock.read(), vec![1, 2]);
    }
}
