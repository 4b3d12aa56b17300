//! Distance source abstraction the graph traverses against.
//!
//! The standard variant (spec §4.6) always traverses exact distances via
//! [`crate::heap::VectorHeap`]. The optimized variant (spec §4.7) traverses
//! quantized approximations via [`crate::quantization::QuantizedStore`] once
//! it has left the small regime; the graph code itself never needs to know
//! which one it is talking to.

use vg_core::{DistanceMetric, NounId};

/// Something the HNSW graph can compute a distance against, for a given
/// node id.
pub trait EmbeddingSource {
    /// Distance from `query` to the embedding resident for `id`, or `None`
    /// if this source has nothing for `id` (a waypoint the graph still
    /// needs to traverse through even without a usable distance, per the
    /// "traverse through deleted/unreachable nodes too" rule captured in
    /// [`crate::graph::HnswGraph::search_layer`]).
    fn distance_to(&self, metric: DistanceMetric, query: &[f32], id: NounId) -> Option<f32>;

    /// Whether this source has an embedding (exact or quantized) for `id`.
    fn contains(&self, id: NounId) -> bool;

    /// Distance between two already-resident ids, used when pruning an
    /// existing node's neighbor set (the node being pruned is always
    /// already resident by the time pruning runs).
    fn distance_between(&self, metric: DistanceMetric, a: NounId, b: NounId) -> Option<f32>;
}

impl EmbeddingSource for crate::heap::VectorHeap {
    fn distance_to(&self, metric: DistanceMetric, query: &[f32], id: NounId) -> Option<f32> {
        self.get(id).map(|v| metric.distance(query, v))
    }

    fn contains(&self, id: NounId) -> bool {
        self.get(id).is_some()
    }

    fn distance_between(&self, metric: DistanceMetric, a: NounId, b: NounId) -> Option<f32> {
        let (va, vb) = (self.get(a)?, self.get(b)?);
        Some(metric.distance(va, vb))
    }
}
