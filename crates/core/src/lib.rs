//! Foundational types shared by every vectorgraph crate.
//!
//! - [`error`]: the stable, crate-spanning error taxonomy (spec §6, §7).
//! - [`timestamp`]: microsecond-precision `Timestamp`.
//! - [`ids`]: `NounId`/`VerbId` newtypes.
//! - [`types`]: closed-set `NounType`/`VerbType` tags and `CreatedBy`.
//! - [`distance`]: the four pluggable distance functions (C1).
//! - [`limits`]: configurable size limits on vectors and metadata.

#![warn(missing_docs)]

pub mod distance;
pub mod error;
pub mod ids;
pub mod limits;
pub mod timestamp;
pub mod types;

pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use ids::{NounId, VerbId};
pub use limits::{LimitError, Limits};
pub use timestamp::Timestamp;
pub use types::{CreatedBy, NounType, VerbType};
