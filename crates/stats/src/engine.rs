//! [`StatisticsEngine`]: the adaptive, lock-coordinated flush loop over a
//! [`crate::cache::StatisticsCache`] (spec §4.4).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vg_core::{Error, Result, Timestamp};
use vg_storage::StorageAdapter;

use crate::cache::StatisticsCache;
use crate::snapshot::{CounterKind, Snapshot};

/// Minimum adaptive flush delay (spec §4.4).
const MIN_FLUSH_DELAY: Duration = Duration::from_secs(5);
/// Maximum adaptive flush delay (spec §4.4).
const MAX_FLUSH_DELAY: Duration = Duration::from_secs(30);
/// TTL held on the `"statistics"` lock while merging a flush (spec §4.4).
const FLUSH_LOCK_TTL: Duration = Duration::from_secs(15);
/// How long a flush blocks trying to acquire the `"statistics"` lock
/// before giving up and letting the caller decide whether to retry.
const FLUSH_LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);

/// Write-batched, time-partitioned counters over a [`StorageAdapter`]
/// (spec §4.4, component C4).
///
/// Construction never touches storage or spawns anything (per the
/// builder/factory pattern in spec §9 — async initialization is not part
/// of the public contract): call [`StatisticsEngine::spawn_flush_loop`]
/// once the engine is wrapped in an `Arc` to start the background
/// adaptive flusher, and [`StatisticsEngine::shutdown`] to stop it and
/// flush synchronously before the process exits.
pub struct StatisticsEngine {
    storage: Arc<dyn StorageAdapter>,
    cache: StatisticsCache,
    stop: CancellationToken,
    woken: Notify,
}

impl StatisticsEngine {
    /// A fresh engine with an empty cache, not yet flushing in the
    /// background.
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        StatisticsEngine {
            storage,
            cache: StatisticsCache::new(),
            stop: CancellationToken::new(),
            woken: Notify::new(),
        }
    }

    /// Buffer an increment/decrement for `(kind, service)`. Returns
    /// immediately; the write lands in storage on the next flush.
    pub fn increment(&self, kind: CounterKind, service: &str, delta: i64) {
        self.cache.increment(kind, service, delta);
        self.woken.notify_one();
    }

    /// Record the current HNSW index size, buffered like any other
    /// counter (spec §4.4 "and set `hnswIndexSize`").
    pub fn set_hnsw_index_size(&self, n: u64) {
        self.cache.set_hnsw_index_size(n);
        self.woken.notify_one();
    }

    /// Read the current snapshot. When `fresh` is true, performs a
    /// synchronous flush first (spec §4.4: "before `getStatistics(fresh:
    /// true)`, perform a synchronous flush"); otherwise merges pending
    /// in-memory deltas on top of the last flushed partition without
    /// forcing a write.
    pub async fn get_statistics(&self, fresh: bool) -> Result<Snapshot> {
        if fresh {
            if let Err(e) = self.flush().await {
                tracing::warn!(error = %e, "synchronous statistics flush before fresh read failed");
            }
        }

        let partition = Timestamp::now().day_partition();
        let mut snapshot = match self.storage.get_statistics(&partition).await? {
            Some(json) => Snapshot::from_partition_json(&json),
            None => Snapshot::default(),
        };
        snapshot.hnsw_index_size = self.cache.hnsw_index_size();

        if !fresh {
            for (service, kind, delta) in self.cache.drain().0 {
                snapshot.apply_delta(&service, kind, delta);
                // Put them straight back: a non-fresh read must not
                // consume deltas it merely peeked at.
                self.cache.increment(kind, &service, delta);
            }
        }

        Ok(snapshot)
    }

    /// Force every buffered delta to storage now (spec §4.4 flush
    /// algorithm): acquire the `"statistics"` lock, merge deltas into the
    /// current day's partition via [`StorageAdapter::increment_statistic`],
    /// record the HNSW size if it changed, then release.
    ///
    /// On [`Error::LockUnavailable`], every drained delta is requeued into
    /// the cache before returning the error, so no update is lost (spec
    /// §4.4: "if lock acquisition fails, requeue ... never block
    /// writers" — this method itself does not block writers since
    /// `increment`/`set_hnsw_index_size` never call it).
    pub async fn flush(&self) -> Result<()> {
        if !self.cache.is_dirty() {
            return Ok(());
        }

        let (entries, hnsw_due) = self.cache.drain();
        let token = match self.storage.acquire_lock("statistics", FLUSH_LOCK_TTL, FLUSH_LOCK_ACQUIRE_TIMEOUT).await {
            Ok(token) => token,
            Err(e) => {
                self.cache.requeue(entries, hnsw_due);
                return Err(e);
            }
        };

        let partition = Timestamp::now().day_partition();
        let result = self.apply_entries(&partition, &entries, hnsw_due).await;

        self.storage.release_lock("statistics", &token).await.ok();

        if let Err((failed_from, e)) = result {
            // Requeue only what was not yet durably applied.
            self.cache.requeue(entries[failed_from..].to_vec(), hnsw_due);
            return Err(e);
        }
        Ok(())
    }

    async fn apply_entries(
        &self,
        partition: &str,
        entries: &[(String, CounterKind, i64)],
        hnsw_due: bool,
    ) -> std::result::Result<(), (usize, Error)> {
        for (i, (service, kind, delta)) in entries.iter().enumerate() {
            self.storage
                .increment_statistic(partition, kind.field_name(), service, *delta)
                .await
                .map_err(|e| (i, e))?;
        }
        if hnsw_due {
            self.storage
                .update_hnsw_index_size(self.cache.hnsw_index_size())
                .await
                .map_err(|e| (entries.len(), e))?;
        }
        self.storage.flush_statistics_to_storage().await.map_err(|e| (entries.len(), e))
    }

    /// Start the adaptive background flush loop (spec §4.4): sleeps
    /// between `[MIN_FLUSH_DELAY, MAX_FLUSH_DELAY]`, shrinking toward the
    /// minimum as recent write volume grows, and flushes whenever the
    /// cache is dirty. Lock contention backs off exponentially instead of
    /// retrying immediately; writers are never blocked by this loop since
    /// it only reads/drains the cache, never locks out `increment`.
    pub fn spawn_flush_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut backoff = MIN_FLUSH_DELAY;
            loop {
                let delay = engine.adaptive_delay();
                tokio::select! {
                    _ = engine.stop.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                    _ = engine.woken.notified() => {}
                }
                if engine.stop.is_cancelled() {
                    break;
                }
                if !engine.cache.is_dirty() {
                    continue;
                }
                match engine.flush().await {
                    Ok(()) => backoff = MIN_FLUSH_DELAY,
                    Err(Error::LockUnavailable { .. }) => {
                        tracing::debug!(?backoff, "statistics flush lock contended, backing off");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_FLUSH_DELAY);
                    }
                    Err(e) => tracing::warn!(error = %e, "statistics flush failed"),
                }
            }
        })
    }

    fn adaptive_delay(&self) -> Duration {
        let writes = self.cache.writes_since_flush();
        if writes == 0 {
            return MAX_FLUSH_DELAY;
        }
        let shrink = MAX_FLUSH_DELAY.as_millis() as u64 / (1 + writes);
        Duration::from_millis(shrink).clamp(MIN_FLUSH_DELAY, MAX_FLUSH_DELAY)
    }

    /// Stop the background flush loop (if running) and perform one final
    /// synchronous flush (spec §4.4 "on shutdown ... perform a synchronous
    /// flush"). A failure here is logged, not propagated — partial
    /// statistics loss on shutdown is acceptable by design (invariant I5).
    pub async fn shutdown(&self) {
        self.stop.cancel();
        self.woken.notify_one();
        if let Err(e) = self.flush().await {
            tracing::warn!(error = %e, "statistics flush on shutdown failed; some counters may be lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_storage::MemoryAdapter;

    fn engine() -> StatisticsEngine {
        StatisticsEngine::new(Arc::new(MemoryAdapter::new()))
    }

    #[tokio::test]
    async fn flush_merges_deltas_into_storage() {
        let engine = engine();
        engine.increment(CounterKind::Noun, "w1", 3);
        engine.increment(CounterKind::Noun, "w1", 2);
        engine.flush().await.unwrap();

        let snapshot = engine.get_statistics(false).await.unwrap();
        assert_eq!(snapshot.services["w1"].noun_count, 5);
    }

    #[tokio::test]
    async fn fresh_read_forces_a_flush() {
        let engine = engine();
        engine.increment(CounterKind::Verb, "w2", 1);
        let snapshot = engine.get_statistics(true).await.unwrap();
        assert_eq!(snapshot.services["w2"].verb_count, 1);
        assert!(!engine.cache.is_dirty());
    }

    #[tokio::test]
    async fn non_fresh_read_sees_pending_deltas_without_consuming_them() {
        let engine = engine();
        engine.increment(CounterKind::Noun, "w1", 7);
        let snapshot = engine.get_statistics(false).await.unwrap();
        assert_eq!(snapshot.services["w1"].noun_count, 7);
        assert!(engine.cache.is_dirty());
    }

    #[tokio::test]
    async fn two_writers_converge_after_both_flush() {
        let storage = Arc::new(MemoryAdapter::new());
        let w1 = StatisticsEngine::new(storage.clone());
        let w2 = StatisticsEngine::new(storage.clone());
        for _ in 0..100 {
            w1.increment(CounterKind::Noun, "w1", 1);
            w2.increment(CounterKind::Noun, "w2", 1);
        }
        w1.flush().await.unwrap();
        w2.flush().await.unwrap();

        let reader = StatisticsEngine::new(storage);
        let snapshot = reader.get_statistics(true).await.unwrap();
        assert_eq!(snapshot.services["w1"].noun_count, 100);
        assert_eq!(snapshot.services["w2"].noun_count, 100);
        assert_eq!(snapshot.total(CounterKind::Noun), 200);
    }

    #[tokio::test]
    async fn hnsw_index_size_is_buffered_and_readable() {
        let engine = engine();
        engine.set_hnsw_index_size(42);
        let snapshot = engine.get_statistics(true).await.unwrap();
        assert_eq!(snapshot.hnsw_index_size, 42);
    }

    #[tokio::test]
    async fn shutdown_flushes_and_stops_the_background_loop() {
        let engine = Arc::new(engine());
        let _handle = engine.spawn_flush_loop();
        engine.increment(CounterKind::Noun, "w1", 1);
        engine.shutdown().await;
        assert!(!engine.cache.is_dirty());
    }
}
