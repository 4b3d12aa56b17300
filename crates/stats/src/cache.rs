//! The in-memory, write-batched statistics cache (spec §4.4).
//!
//! Every increment mutates this cache and flips a dirty flag; nothing
//! touches storage until [`crate::StatisticsEngine::flush`] runs. Draining
//! is atomic per `(service, kind)` bucket so a flush that fails partway
//! through never silently drops a delta — undrained or re-queued entries
//! simply accumulate for the next attempt.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::snapshot::CounterKind;

#[derive(Default)]
pub(crate) struct StatisticsCache {
    deltas: DashMap<(String, u8), i64>,
    hnsw_index_size: AtomicU64,
    hnsw_dirty: AtomicBool,
    last_write: Mutex<Option<Instant>>,
    writes_since_flush: AtomicU64,
}

fn kind_tag(kind: CounterKind) -> u8 {
    match kind {
        CounterKind::Noun => 0,
        CounterKind::Verb => 1,
        CounterKind::Metadata => 2,
    }
}

fn kind_from_tag(tag: u8) -> CounterKind {
    match tag {
        0 => CounterKind::Noun,
        1 => CounterKind::Verb,
        _ => CounterKind::Metadata,
    }
}

impl StatisticsCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn increment(&self, kind: CounterKind, service: &str, delta: i64) {
        *self.deltas.entry((service.to_string(), kind_tag(kind))).or_insert(0) += delta;
        *self.last_write.lock() = Some(Instant::now());
        self.writes_since_flush.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_hnsw_index_size(&self, n: u64) {
        self.hnsw_index_size.store(n, Ordering::Relaxed);
        self.hnsw_dirty.store(true, Ordering::Relaxed);
    }

    pub(crate) fn hnsw_index_size(&self) -> u64 {
        self.hnsw_index_size.load(Ordering::Relaxed)
    }

    pub(crate) fn is_dirty(&self) -> bool {
        !self.deltas.is_empty() || self.hnsw_dirty.load(Ordering::Relaxed)
    }

    /// Drain every pending delta, returning `(service, kind, delta)`
    /// triples and whether the HNSW index size needs writing back.
    pub(crate) fn drain(&self) -> (Vec<(String, CounterKind, i64)>, bool) {
        let entries: Vec<_> = self
            .deltas
            .iter()
            .map(|e| (e.key().0.clone(), kind_from_tag(e.key().1), *e.value()))
            .collect();
        for (service, kind, _) in &entries {
            self.deltas.remove(&(service.clone(), kind_tag(*kind)));
        }
        let hnsw_due = self.hnsw_dirty.swap(false, Ordering::AcqRel);
        self.writes_since_flush.store(0, Ordering::Relaxed);
        (entries, hnsw_due)
    }

    /// Merge entries back in (a failed flush re-queues what it drained,
    /// and `hnsw_due` re-arms the HNSW-size write).
    pub(crate) fn requeue(&self, entries: Vec<(String, CounterKind, i64)>, hnsw_due: bool) {
        for (service, kind, delta) in entries {
            self.increment(kind, &service, delta);
        }
        if hnsw_due {
            self.hnsw_dirty.store(true, Ordering::Relaxed);
        }
    }

    /// Writes observed since the last successful drain — the adaptive
    /// flush scheduler's volume signal (spec §4.4: "delay shrinks with
    /// recent-write volume").
    pub(crate) fn writes_since_flush(&self) -> u64 {
        self.writes_since_flush.load(Ordering::Relaxed)
    }
}
