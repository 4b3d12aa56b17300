//! Shared-resource policy primitives for the concurrency model (spec §5).
//!
//! This crate does not implement any domain logic; it is the small set of
//! synchronization primitives `vg-index`, `vg-stats`, and
//! `vg-orchestrator` build on so that policy ("index mutation is
//! single-writer-multi-reader", "bulk import pulls at most `concurrency`
//! embeddings in flight") is expressed once and consistently.
//!
//! - [`index_lock`]: the read-write gate over HNSW structural mutation,
//!   plus the memory-usage counter that rides along with it.
//! - [`cancellation`]: a thin wrapper around `tokio_util`'s
//!   `CancellationToken` that races it against an operation future.
//! - [`worker_pool`]: a `Semaphore`-bounded batch executor for `import`'s
//!   embedding fan-out.

#![warn(missing_docs)]

pub mod cancellation;
pub mod index_lock;
pub mod worker_pool;

pub use cancellation::{run_cancellable, CancellationToken};
pub use index_lock::IndexLock;
pub use worker_pool::WorkerPool;
