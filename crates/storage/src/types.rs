//! Shared types for the storage adapter contract (spec §4.2).

use serde::{Deserialize, Serialize};
use vg_core::{NounId, Timestamp, VerbId};

/// The three object kinds every backend persists uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A [`vg_primitives::Noun`].
    Noun,
    /// A [`vg_primitives::Verb`].
    Verb,
    /// A standalone metadata blob, keyed independently of noun/verb storage
    /// (spec §4.2's `saveMetadata`/`getMetadata`).
    Metadata,
}

/// The operation recorded by a [`ChangeLogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    /// Entity created.
    Add,
    /// Entity deleted (soft or hard).
    Delete,
    /// Entity mutated in place.
    Update,
}

/// A single append-only change-log record (spec §3, §4.2).
///
/// `payload_digest` lets readers detect whether they already have the
/// referenced version without re-fetching the full entity; it is not a
/// cryptographic commitment, just a cheap equality check (xxh3 of the
/// serialized entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// When the change was appended.
    #[serde(rename = "ts")]
    pub timestamp: Timestamp,
    /// What happened.
    #[serde(rename = "op")]
    pub operation: ChangeOp,
    /// What kind of object it happened to.
    pub entity: EntityKind,
    /// The affected entity's string id (`NounId`/`VerbId`/metadata key).
    pub id: String,
    /// Content digest of the entity after the change (xxh3_64).
    #[serde(rename = "digest")]
    pub payload_digest: u64,
    /// Identity of the writer that produced this entry, used to break ties
    /// when ordering entries with equal timestamps (spec §3).
    pub writer: String,
    /// Monotonic per-writer sequence number; combined with `timestamp` it
    /// forms the `changelog/{ts}-{seq}` object key on path-based backends.
    pub seq: u64,
}

impl ChangeLogEntry {
    /// Total order used by `getChangesSince`: `(timestamp, writer, seq)`.
    pub fn order_key(&self) -> (Timestamp, &str, u64) {
        (self.timestamp, self.writer.as_str(), self.seq)
    }
}

/// Opaque token returned by `acquireLock`, required to `releaseLock`.
///
/// Backends are free to make this unguessable; the orchestrator never
/// inspects it beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken(pub String);

impl LockToken {
    /// Mint a new random token.
    pub fn new() -> Self {
        LockToken(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A held (or just-expired) lock's bookkeeping, common to every backend
/// (spec §4.2: "Lock object stores holder id and deadline").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    /// Token the holder must present to release.
    pub token: LockToken,
    /// Absolute deadline; past this, the lock is considered released
    /// regardless of holder state.
    pub deadline: Timestamp,
}

impl LockRecord {
    /// Whether `now` is past this lock's deadline.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.as_micros() > self.deadline.as_micros()
    }
}

/// Result of `storageStatus()` (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStatus {
    /// Backend kind label (`"memory"`, `"local-fs"`, `"browser-fs"`, `"object-store"`).
    pub backend_type: String,
    /// Bytes currently occupied, best-effort.
    pub used_bytes: u64,
    /// Backend capacity, if the medium exposes one (e.g. browser storage quota).
    pub quota_bytes: Option<u64>,
    /// Free-form diagnostic details (path, bucket name, entry counts, ...).
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Opaque forward-only pagination cursor for `listNouns`/`listVerbs`.
///
/// Stable within a cursor session per spec §4.2; backends encode whatever
/// internal position they need (a BTreeMap key, a continuation token) as
/// the inner string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(pub String);

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items in this page, in the backend's deterministic-per-call order.
    pub items: Vec<T>,
    /// Cursor to pass to continue the listing, `None` when exhausted.
    pub next_cursor: Option<Cursor>,
}

/// Either a noun or verb id, used by cascade-delete bookkeeping and
/// change-log replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityId {
    /// A noun id.
    Noun(NounId),
    /// A verb id.
    Verb(VerbId),
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Noun(id) => write!(f, "{id}"),
            EntityId::Verb(id) => write!(f, "{id}"),
        }
    }
}
