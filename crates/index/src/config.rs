//! Tunable parameters for the standard and optimized HNSW variants (spec
//! §4.6, §4.7).

use serde::{Deserialize, Serialize};
use vg_core::DistanceMetric;

/// Graph construction/search parameters shared by both HNSW variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Max bidirectional connections per node at layers above 0 (default 16).
    /// Layer 0 allows `2 * m`.
    pub m: usize,
    /// Beam width used while building the graph (default 200).
    pub ef_construction: usize,
    /// Beam width used while searching (default 50); clamped up to `k` at
    /// call time per spec §4.6 edge case.
    pub ef_search: usize,
    /// Level-assignment multiplier, `1 / ln(m)` by default.
    pub ml: f64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        let m = 16;
        HnswConfig { m, ef_construction: 200, ef_search: 50, ml: 1.0 / (m as f64).ln() }
    }
}

impl HnswConfig {
    /// Max connections for layer 0.
    pub fn max_connections_layer0(&self) -> usize {
        self.m * 2
    }

    /// Max connections for layers above 0.
    pub fn max_connections(&self) -> usize {
        self.m
    }
}

/// Product-quantization parameters for the optimized variant (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizationConfig {
    /// Number of sub-vectors the embedding is split into (default 16).
    pub num_subvectors: usize,
    /// Number of centroids learned per sub-vector, one byte per code
    /// (default 256).
    pub num_centroids: usize,
    /// Number of inserts Lloyd's iteration trains on before the codebook
    /// is frozen (default 10_000).
    pub training_set_size: usize,
    /// Oversampling factor `r`: the rerank pass reloads the top `r * k`
    /// quantized candidates' true vectors before returning `k` (default 4).
    pub rerank_oversample: usize,
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        QuantizationConfig { num_subvectors: 16, num_centroids: 256, training_set_size: 10_000, rerank_oversample: 4 }
    }
}

/// Full configuration for a [`crate::index::VectorIndex`] (spec §4.6-§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    /// Fixed embedding dimension `d` for this index.
    pub dimensions: usize,
    /// Distance metric used throughout (persisted alongside the index,
    /// spec §4.8, so a reopened database keeps the metric it was built
    /// with).
    pub metric: DistanceMetric,
    /// HNSW graph parameters.
    pub hnsw: HnswConfig,
    /// Resident-vector byte threshold below which the index behaves
    /// exactly like the standard variant (spec §4.7 "small dataset").
    pub memory_threshold_bytes: usize,
    /// Resident-vector byte threshold above which the index additionally
    /// spills full vectors to storage (spec §4.7 "large").
    pub disk_spill_threshold_bytes: usize,
    /// Product quantization parameters, active once the medium/large
    /// regime is entered.
    pub quantization: QuantizationConfig,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        VectorIndexConfig {
            dimensions: 0,
            metric: DistanceMetric::default(),
            hnsw: HnswConfig::default(),
            memory_threshold_bytes: 256 * 1024 * 1024,
            disk_spill_threshold_bytes: 2 * 1024 * 1024 * 1024,
            quantization: QuantizationConfig::default(),
        }
    }
}

impl VectorIndexConfig {
    /// Configuration fixed to a given dimension, otherwise defaulted.
    pub fn for_dimensions(dimensions: usize) -> Self {
        VectorIndexConfig { dimensions, ..Default::default() }
    }
}
