//! The persistence bridge (spec §4.8, C8): serializing the HNSW graph
//! topology to `index/hnsw.json` and reconstructing it on open.
//!
//! Only topology is persisted — `{d, distanceMetric, M, efConstruction, ml,
//! entryPoint, maxLevel, nodes}` — never the vectors themselves, which live
//! in `nouns/` and are the responsibility of `vg-graph`/`vg-storage`. A
//! reopened database whose snapshot is absent or looks stale relative to
//! the storage adapter's recorded `hnswIndexSize` rebuilds by rescanning
//! nouns instead, which the caller observes as a one-time cost.

use serde::{Deserialize, Serialize};
use vg_core::{DistanceMetric, Error, NounId, Result};

/// One node's persisted topology, matching spec §4.8's `{id, level,
/// neighborsByLevel}` exactly. `createdAt` travels with the noun itself
/// (`nouns/`), not the index snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct NodeSnapshot {
    pub id: NounId,
    pub level: usize,
    #[serde(rename = "neighborsByLevel")]
    pub neighbors_by_level: Vec<Vec<NounId>>,
}

/// The full persisted snapshot, matching spec §4.8's wire shape exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    d: usize,
    #[serde(rename = "distanceMetric")]
    distance_metric: DistanceMetric,
    #[serde(rename = "M")]
    m: usize,
    #[serde(rename = "efConstruction")]
    ef_construction: usize,
    ml: f64,
    #[serde(rename = "entryPoint")]
    entry_point: Option<NounId>,
    #[serde(rename = "maxLevel")]
    max_level: usize,
    nodes: Vec<NodeSnapshot>,
}

impl IndexSnapshot {
    pub(crate) fn new(d: usize, metric: DistanceMetric, m: usize, ef_construction: usize, ml: f64, entry_point: Option<NounId>, max_level: usize, nodes: Vec<NodeSnapshot>) -> Self {
        IndexSnapshot { d, distance_metric: metric, m, ef_construction, ml, entry_point, max_level, nodes }
    }

    pub(crate) fn entry_point(&self) -> Option<NounId> {
        self.entry_point
    }

    pub(crate) fn max_level(&self) -> usize {
        self.max_level
    }

    pub(crate) fn into_nodes(self) -> Vec<NodeSnapshot> {
        self.nodes
    }

    /// Whether this snapshot was built for a database configured the way
    /// the caller expects; a mismatch means stale-relative-to-config, not
    /// merely stale-relative-to-size, and the caller should rebuild rather
    /// than trust the topology.
    pub fn matches_config(&self, d: usize, metric: DistanceMetric) -> bool {
        self.d == d && self.distance_metric == metric
    }

    /// Serialize to the exact on-disk JSON shape (spec §4.8).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Fatal { message: format!("failed to serialize index snapshot: {e}") })
    }

    /// Parse a previously-written snapshot.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Fatal { message: format!("corrupt index snapshot: {e}") })
    }
}
