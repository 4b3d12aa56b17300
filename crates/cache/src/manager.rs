//! [`CacheManager`]: the read-through/write-behind wrapper around
//! `getNoun`/`getVerb` that ties the hot, warm, and cold tiers together
//! (spec §4.11).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vg_core::{NounId, Result, VerbId};
use vg_primitives::{Noun, Verb};
use vg_storage::StorageAdapter;

use crate::hot::HotCache;
use crate::warm::WarmCache;

/// Tunables for the cache manager (spec §6 `cache` config block).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Hot-tier capacity in entries (per kind: nouns and verbs each get
    /// their own hot cache of this size).
    pub hot_cache_max_size: usize,
    /// Fraction of capacity the hot tier evicts down to once it overflows
    /// (default 0.8, spec §4.11).
    pub eviction_threshold: f64,
    /// Warm-tier TTL (default 1 hour, spec §4.11).
    pub warm_cache_ttl: Duration,
    /// Write-behind buffer size before an implicit flush.
    pub batch_size: usize,
    /// Whether the auto-tuner adjusts hot capacity from observed hit rate.
    pub auto_tune: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            hot_cache_max_size: 10_000,
            eviction_threshold: 0.8,
            warm_cache_ttl: Duration::from_secs(3600),
            batch_size: 100,
            auto_tune: true,
        }
    }
}

/// How often the auto-tuner re-evaluates hit rate and resizes the hot
/// tier (spec §4.11 default: 60s).
const AUTO_TUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Three-tier (hot/warm/cold) cache in front of a [`StorageAdapter`],
/// with a size-bounded write-behind buffer and a hit-rate auto-tuner
/// (spec §4.11, component C11).
pub struct CacheManager {
    storage: Arc<dyn StorageAdapter>,
    hot_nouns: HotCache<NounId, Noun>,
    warm_nouns: WarmCache<NounId, Noun>,
    hot_verbs: HotCache<VerbId, Verb>,
    warm_verbs: WarmCache<VerbId, Verb>,
    write_buffer_nouns: Mutex<Vec<Noun>>,
    write_buffer_verbs: Mutex<Vec<Verb>>,
    batch_size: usize,
    auto_tune: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    stop: CancellationToken,
    woken: Notify,
}

impl CacheManager {
    /// A cache manager over `storage`, sized per `config`.
    pub fn new(storage: Arc<dyn StorageAdapter>, config: CacheConfig) -> Self {
        CacheManager {
            storage,
            hot_nouns: HotCache::new(config.hot_cache_max_size, config.eviction_threshold),
            warm_nouns: WarmCache::new(config.warm_cache_ttl),
            hot_verbs: HotCache::new(config.hot_cache_max_size, config.eviction_threshold),
            warm_verbs: WarmCache::new(config.warm_cache_ttl),
            write_buffer_nouns: Mutex::new(Vec::new()),
            write_buffer_verbs: Mutex::new(Vec::new()),
            batch_size: config.batch_size.max(1),
            auto_tune: config.auto_tune,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stop: CancellationToken::new(),
            woken: Notify::new(),
        }
    }

    /// Read-through `getNoun`: hot, then warm (promoting to hot on hit),
    /// then cold storage (populating both tiers on hit).
    pub async fn get_noun(&self, id: NounId) -> Result<Option<Noun>> {
        if let Some(noun) = self.hot_nouns.get(&id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(noun));
        }
        if let Some(noun) = self.warm_nouns.get(&id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.hot_nouns.insert(id, noun.clone());
            return Ok(Some(noun));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let fetched = self.storage.get_noun(id).await?;
        if let Some(noun) = &fetched {
            self.hot_nouns.insert(id, noun.clone());
            self.warm_nouns.insert(id, noun.clone());
        }
        Ok(fetched)
    }

    /// Read-through `getVerb`, mirroring [`CacheManager::get_noun`].
    pub async fn get_verb(&self, id: VerbId) -> Result<Option<Verb>> {
        if let Some(verb) = self.hot_verbs.get(&id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(verb));
        }
        if let Some(verb) = self.warm_verbs.get(&id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.hot_verbs.insert(id, verb.clone());
            return Ok(Some(verb));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let fetched = self.storage.get_verb(id).await?;
        if let Some(verb) = &fetched {
            self.hot_verbs.insert(id, verb.clone());
            self.warm_verbs.insert(id, verb.clone());
        }
        Ok(fetched)
    }

    /// Stage a noun write behind the cache: updates both tiers
    /// immediately (so a subsequent read sees it) and buffers the durable
    /// write, flushing once [`CacheConfig::batch_size`] writes have
    /// accumulated (spec §4.11: "write-behind buffers are size-bounded
    /// and flushed on eviction pressure or explicit checkpoint").
    pub async fn stage_noun_write(&self, noun: Noun) -> Result<()> {
        self.hot_nouns.insert(noun.id, noun.clone());
        self.warm_nouns.insert(noun.id, noun.clone());
        let due = {
            let mut buffer = self.write_buffer_nouns.lock();
            buffer.push(noun);
            buffer.len() >= self.batch_size
        };
        if due {
            self.flush_nouns().await?;
        }
        Ok(())
    }

    /// Stage a verb write, mirroring [`CacheManager::stage_noun_write`].
    pub async fn stage_verb_write(&self, verb: Verb) -> Result<()> {
        self.hot_verbs.insert(verb.id, verb.clone());
        self.warm_verbs.insert(verb.id, verb.clone());
        let due = {
            let mut buffer = self.write_buffer_verbs.lock();
            buffer.push(verb);
            buffer.len() >= self.batch_size
        };
        if due {
            self.flush_verbs().await?;
        }
        Ok(())
    }

    /// Drop `id` from both in-memory tiers (e.g. after a hard delete).
    pub fn invalidate_noun(&self, id: NounId) {
        self.hot_nouns.invalidate(&id);
        self.warm_nouns.invalidate(&id);
    }

    /// Drop `id` from both in-memory tiers.
    pub fn invalidate_verb(&self, id: VerbId) {
        self.hot_verbs.invalidate(&id);
        self.warm_verbs.invalidate(&id);
    }

    /// Force every buffered write-behind entry to storage now (spec
    /// §4.11 "explicit checkpoint").
    pub async fn checkpoint(&self) -> Result<()> {
        self.flush_nouns().await?;
        self.flush_verbs().await
    }

    async fn flush_nouns(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.write_buffer_nouns.lock());
        for noun in pending {
            self.storage.save_noun(&noun).await?;
        }
        Ok(())
    }

    async fn flush_verbs(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.write_buffer_verbs.lock());
        for verb in pending {
            self.storage.save_verb(&verb).await?;
        }
        Ok(())
    }

    /// Observed hit rate since the last auto-tune tick (`None` if no
    /// lookups have happened yet).
    pub fn hit_rate(&self) -> Option<f64> {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        (total > 0).then(|| hits as f64 / total as f64)
    }

    /// Start the auto-tuner (spec §4.11: "adjusts hot cap and batch size
    /// every `T_tune`"). A low hit rate grows the hot tier (more working
    /// set should fit in RAM); a very high hit rate allows it to shrink
    /// back, freeing memory for other tenants of the process. No-op if
    /// [`CacheConfig::auto_tune`] was false.
    pub fn spawn_auto_tune(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.auto_tune {
            return None;
        }
        let manager = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = manager.stop.cancelled() => break,
                    _ = tokio::time::sleep(AUTO_TUNE_INTERVAL) => {}
                }
                if manager.stop.is_cancelled() {
                    break;
                }
                manager.tune_once();
            }
        }))
    }

    fn tune_once(&self) {
        let Some(hit_rate) = self.hit_rate() else { return };
        let current = self.hot_nouns.capacity();
        let next = if hit_rate < 0.5 {
            (current as f64 * 1.25) as usize
        } else if hit_rate > 0.9 {
            (current as f64 * 0.9) as usize
        } else {
            current
        };
        if next != current {
            tracing::debug!(hit_rate, from = current, to = next, "cache auto-tune resizing hot tier");
            self.hot_nouns.set_capacity(next.max(1));
            self.hot_verbs.set_capacity(next.max(1));
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Stop the auto-tuner (if running) and flush any buffered writes.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop.cancel();
        self.woken.notify_one();
        self.checkpoint().await
    }
}
