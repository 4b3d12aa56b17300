//! The storage adapter contract (spec §4.2), implemented identically by
//! every backend in this crate.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use vg_core::{NounId, NounType, Result, Timestamp, VerbId, VerbType};
use vg_primitives::{Noun, Verb};

use crate::types::{ChangeLogEntry, Cursor, LockToken, Page, StorageStatus};

/// Every storage backend (spec §4.3) exposes this single contract; the
/// rest of the system (graph store, statistics engine, orchestrator) is
/// written entirely against `dyn StorageAdapter` and never downcasts to a
/// concrete backend.
///
/// Methods are `async` so the object-store backend can await network I/O;
/// the in-process backends (memory, local-fs) simply never yield.
///
/// `wasm32` builds drop the `Send + Sync` bound: `web-sys` handles are not
/// `Send`, and a wasm32 target without the `atomics` feature has no threads
/// to send across anyway. The method list is defined once via
/// [`storage_adapter_methods`] so the two target-specific trait
/// declarations can never drift apart.
macro_rules! storage_adapter_methods {
    () => {
        /// Persist a noun, creating or overwriting it at its storage key.
        async fn save_noun(&self, noun: &Noun) -> Result<()>;

        /// Fetch a noun by id. Returns `Ok(None)` for missing or hard-deleted
        /// ids; soft-deleted nouns are returned with `deleted=true` set.
        async fn get_noun(&self, id: NounId) -> Result<Option<Noun>>;

        /// Remove a noun's storage object entirely (hard delete). Soft delete
        /// is a `save_noun` call with `deleted=true` instead.
        async fn delete_noun(&self, id: NounId) -> Result<()>;

        /// Paginated noun listing, optionally filtered to one type tag.
        /// Ordering is unspecified but deterministic per call (spec §4.2).
        async fn list_nouns(&self, type_filter: Option<NounType>, cursor: Option<Cursor>, limit: usize) -> Result<Page<Noun>>;

        /// Persist a verb.
        async fn save_verb(&self, verb: &Verb) -> Result<()>;

        /// Fetch a verb by id.
        async fn get_verb(&self, id: VerbId) -> Result<Option<Verb>>;

        /// Remove a verb's storage object entirely.
        async fn delete_verb(&self, id: VerbId) -> Result<()>;

        /// Paginated verb listing, filterable by source, target, and/or type.
        async fn list_verbs(
            &self,
            by_source: Option<NounId>,
            by_target: Option<NounId>,
            by_type: Option<VerbType>,
            cursor: Option<Cursor>,
            limit: usize,
        ) -> Result<Page<Verb>>;

        /// Save a standalone metadata blob keyed independently of noun/verb
        /// storage.
        async fn save_metadata(&self, id: &str, metadata: &JsonValue) -> Result<()>;

        /// Fetch a standalone metadata blob.
        async fn get_metadata(&self, id: &str) -> Result<Option<JsonValue>>;

        /// Append one change-log entry. Atomic per entry (spec §4.2).
        async fn append_change_log(&self, entry: ChangeLogEntry) -> Result<()>;

        /// All change-log entries with `timestamp >= since`, in append order.
        async fn get_changes_since(&self, since: Timestamp) -> Result<Vec<ChangeLogEntry>>;

        /// Persist a full statistics snapshot (see `vg-stats`'s `Snapshot`,
        /// opaque to this crate as a JSON document).
        async fn save_statistics(&self, partition: &str, snapshot: &JsonValue) -> Result<()>;

        /// Load a statistics snapshot for a day partition, if one was flushed.
        async fn get_statistics(&self, partition: &str) -> Result<Option<JsonValue>>;

        /// Atomically increment one named counter within a day partition.
        async fn increment_statistic(&self, partition: &str, kind: &str, service: &str, delta: i64) -> Result<()>;

        /// Record the current HNSW index size (a single scalar, not
        /// partitioned).
        async fn update_hnsw_index_size(&self, n: u64) -> Result<()>;

        /// Persist the serialized HNSW persistence-bridge snapshot
        /// (`index/hnsw.json`, spec §4.8) as an opaque byte blob. Crash-safe:
        /// write-to-temp + atomic rename on the filesystem backends,
        /// versioned conditional-put on the object-store backend.
        async fn save_index_snapshot(&self, bytes: &[u8]) -> Result<()>;

        /// Load the persisted index snapshot, if one has ever been written.
        async fn load_index_snapshot(&self) -> Result<Option<Vec<u8>>>;

        /// Acquire a best-effort mutual-exclusion lock, blocking up to
        /// `timeout` before failing with `LockUnavailable`. `ttl` bounds how
        /// long the lock is held if the holder never releases it.
        async fn acquire_lock(&self, name: &str, ttl: std::time::Duration, timeout: std::time::Duration) -> Result<LockToken>;

        /// Release a lock previously acquired with the matching token. A
        /// mismatched or already-expired token is a no-op, not an error —
        /// releasing is best-effort by design (spec §4.2).
        async fn release_lock(&self, name: &str, token: &LockToken) -> Result<()>;

        /// Force any batched statistics writes to the backend now.
        async fn flush_statistics_to_storage(&self) -> Result<()>;

        /// Backend identity and usage for diagnostics.
        async fn storage_status(&self) -> Result<StorageStatus>;

        /// Erase every object this adapter manages. Used by tests and by
        /// `import(..., replace: true)`.
        async fn clear(&self) -> Result<()>;
    };
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    storage_adapter_methods!();
}

#[cfg(target_arch = "wasm32")]
#[async_trait(?Send)]
pub trait StorageAdapter {
    storage_adapter_methods!();
}
