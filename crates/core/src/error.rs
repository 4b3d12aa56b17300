//! Stable error taxonomy shared by every vectorgraph crate.
//!
//! All public operations (storage adapters, the HNSW index, the graph store,
//! the query orchestrator) return `Result<T, Error>`. The variant set below
//! is the "stable error surface" named in the spec: callers may match on a
//! specific variant or use [`Error::is_retryable`] / [`Error::is_fatal`] to
//! drive generic retry/alerting logic without knowing every variant.

use thiserror::Error;

/// Result alias used throughout vectorgraph.
pub type Result<T> = std::result::Result<T, Error>;

/// The stable error surface for vectorgraph.
///
/// ## Categories
///
/// - **Input** (never retried): [`Error::DimensionMismatch`], [`Error::InvalidType`],
///   [`Error::ReadOnlyViolation`], [`Error::WriteOnlyViolation`].
/// - **Transient** (retried with backoff at the storage-adapter boundary):
///   [`Error::StorageUnavailable`], [`Error::LockUnavailable`], [`Error::Transient`].
/// - **Logical** (surfaced immediately, sometimes transformed by the
///   orchestrator): [`Error::NotFound`], [`Error::AlreadyExists`].
/// - **Fatal** (caller must rebuild): [`Error::Fatal`].
///
/// ## Example
///
/// ```
/// use vg_core::Error;
///
/// fn handle(e: Error) {
///     if e.is_retryable() {
///         // back off and retry
///     } else if e.is_fatal() {
///         // log and demand a rebuild
///     }
/// }
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The database handle has not completed initialization (index not yet
    /// loaded, storage adapter not yet opened).
    #[error("not initialized: {message}")]
    NotInitialized {
        /// What is not initialized yet.
        message: String,
    },

    /// The referenced noun, verb, or metadata object does not exist (or was
    /// hard-deleted). Soft-deleted entities are returned normally with
    /// `deleted = true`, not as this error (spec §4.2).
    #[error("not found: {entity}")]
    NotFound {
        /// Human-readable description of what was looked up (kind + id).
        entity: String,
    },

    /// An `add`/`saveNoun`/`saveVerb`-style create collided with an existing
    /// id under a contract that does not allow implicit update.
    #[error("already exists: {entity}")]
    AlreadyExists {
        /// Human-readable description of the conflicting entity.
        entity: String,
    },

    /// A vector's length does not match the database's configured
    /// dimension `d` (invariant I1).
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension actually supplied.
        got: usize,
    },

    /// A noun or verb type tag fell outside the closed set and could not
    /// even be coerced (reserved for malformed persisted data; the live
    /// write path coerces instead of erroring, per spec §4.9).
    #[error("invalid type tag: {tag}")]
    InvalidType {
        /// The offending tag.
        tag: String,
    },

    /// `acquireLock` could not obtain the named lock within the caller's
    /// timeout.
    #[error("lock unavailable: {name}")]
    LockUnavailable {
        /// Lock name.
        name: String,
    },

    /// The storage backend is unreachable or returned a transient failure
    /// after the retry policy (§7) was exhausted.
    #[error("storage unavailable: {message}")]
    StorageUnavailable {
        /// Description of the failure.
        message: String,
        /// Underlying cause, if any.
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A search (or other read-path) operation was attempted while the
    /// database is in `writeOnly` mode.
    #[error("read-only violation: {operation} is disabled in write-only mode")]
    WriteOnlyViolation {
        /// The operation that was rejected.
        operation: String,
    },

    /// A write operation was attempted while the database is in `readOnly`
    /// mode.
    #[error("write violation: {operation} is disabled in read-only mode")]
    ReadOnlyViolation {
        /// The operation that was rejected.
        operation: String,
    },

    /// A caller-supplied cancellation token fired mid-operation (spec §5).
    /// Any partially-wired index state the operation had started building
    /// is rolled back before this is returned.
    #[error("operation cancelled: {operation}")]
    Cancelled {
        /// The operation that was cancelled.
        operation: String,
    },

    /// A retriable failure that has not yet exhausted its retry budget.
    /// Internal to the retry policy; should not normally escape to callers
    /// (see [`Error::StorageUnavailable`] for the terminal form).
    #[error("transient error: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// Unrecoverable corruption was detected in persisted state (checksum
    /// failure, truncated snapshot, impossible graph structure). The caller
    /// must rebuild the affected index or storage segment.
    #[error("fatal: {message}")]
    Fatal {
        /// Description of the corruption.
        message: String,
    },
}

impl Error {
    /// Construct a [`Error::NotFound`] for a human-readable entity description.
    pub fn not_found(entity: impl Into<String>) -> Self {
        Error::NotFound { entity: entity.into() }
    }

    /// Construct a [`Error::AlreadyExists`].
    pub fn already_exists(entity: impl Into<String>) -> Self {
        Error::AlreadyExists { entity: entity.into() }
    }

    /// Construct a [`Error::DimensionMismatch`].
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Error::DimensionMismatch { expected, got }
    }

    /// Construct a [`Error::StorageUnavailable`] with no underlying cause.
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Error::StorageUnavailable {
            message: message.into(),
            cause: None,
        }
    }

    /// Construct a [`Error::Cancelled`].
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Error::Cancelled { operation: operation.into() }
    }

    /// True for errors the retry policy (§7) should retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transient { .. } | Error::StorageUnavailable { .. } | Error::LockUnavailable { .. }
        )
    }

    /// True for errors that indicate the caller must rebuild persisted
    /// state rather than retry or ignore.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal { .. })
    }
}
