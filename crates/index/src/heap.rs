//! Resident full-precision vector storage.
//!
//! `BTreeMap` keyed storage, mirroring the teacher's vector heap: ordered
//! iteration gives deterministic rebuild order, and lookups during graph
//! traversal never allocate.

use std::collections::BTreeMap;
use vg_core::NounId;

/// In-memory store of full-precision embeddings, keyed by noun id.
///
/// Present in every regime while the graph still references a node; the
/// large regime (spec §4.7) removes an id's entry here once its vector has
/// been spilled to storage, keeping only the quantized code in
/// [`crate::quantization::QuantizedStore`].
#[derive(Debug, Default)]
pub struct VectorHeap {
    vectors: BTreeMap<NounId, Vec<f32>>,
    dimension: usize,
}

impl VectorHeap {
    /// An empty heap fixed to `dimension`.
    pub fn new(dimension: usize) -> Self {
        VectorHeap { vectors: BTreeMap::new(), dimension }
    }

    /// The fixed dimension every resident vector has.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert or replace a vector. Returns the byte delta applied to the
    /// caller's memory counter (negative on replace-with-same-length is
    /// zero, since dimension is fixed).
    pub fn insert(&mut self, id: NounId, vector: Vec<f32>) -> usize {
        let bytes = vector.len() * std::mem::size_of::<f32>();
        self.vectors.insert(id, vector);
        bytes
    }

    /// Remove a vector, returning its freed byte count if it was present.
    pub fn remove(&mut self, id: NounId) -> Option<usize> {
        self.vectors.remove(&id).map(|v| v.len() * std::mem::size_of::<f32>())
    }

    /// Borrow a resident vector.
    pub fn get(&self, id: NounId) -> Option<&[f32]> {
        self.vectors.get(&id).map(|v| v.as_slice())
    }

    /// Whether this heap holds anything.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Number of resident vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Ids in ascending order, for deterministic rebuild.
    pub fn ids(&self) -> impl Iterator<Item = NounId> + '_ {
        self.vectors.keys().copied()
    }

    /// Estimated resident memory, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.vectors.len() * self.dimension * std::mem::size_of::<f32>()
    }
}
