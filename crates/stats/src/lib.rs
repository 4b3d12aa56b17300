//! The statistics subsystem (spec §4.4, component C4): write-batched,
//! time-partitioned counters that survive multi-writer contention without
//! lost updates.
//!
//! - [`cache`]: the in-memory dirty-delta cache (internal).
//! - [`snapshot`]: the [`Snapshot`]/[`CounterKind`] shapes returned to
//!   callers.
//! - [`engine`]: [`StatisticsEngine`], the adaptive flush loop over a
//!   [`vg_storage::StorageAdapter`].

#![warn(missing_docs)]

mod cache;
pub mod engine;
pub mod snapshot;

pub use engine::StatisticsEngine;
pub use snapshot::{CounterKind, ServiceCounts, Snapshot};
