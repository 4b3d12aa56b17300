//! Product quantization (spec §4.7, medium/large regime).
//!
//! Each vector is split into `numSubvectors` equal-width slices; a codebook
//! of `numCentroids` representative sub-vectors is learned per slice via
//! Lloyd's iteration over the first `trainingSetSize` inserts, then frozen.
//! Later inserts are encoded against the frozen codebook. Graph traversal
//! computes approximate distances straight from the one-byte-per-slice
//! codes (asymmetric distance computation: the query stays full precision,
//! only the stored side is quantized); the final rerank step in
//! [`crate::index::VectorIndex`] replaces these with exact distances.

use serde::{Deserialize, Serialize};
use vg_core::{DistanceMetric, NounId};
use std::collections::BTreeMap;

use crate::config::QuantizationConfig;
use crate::source::EmbeddingSource;

/// A frozen codebook: one set of centroids per sub-vector slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductQuantizer {
    dimensions: usize,
    num_subvectors: usize,
    sub_dim: usize,
    /// `centroids[subvector][centroid_id]` is a `sub_dim`-length slice.
    centroids: Vec<Vec<Vec<f32>>>,
}

impl ProductQuantizer {
    /// Learn a codebook from `training_set` (full-precision vectors) via a
    /// fixed number of Lloyd's iterations, independently per sub-vector
    /// slice. Deterministic: centroid initialization picks evenly-spaced
    /// training vectors rather than random seeds.
    pub fn train(training_set: &[Vec<f32>], dimensions: usize, cfg: &QuantizationConfig) -> Self {
        let num_subvectors = cfg.num_subvectors.max(1).min(dimensions.max(1));
        let sub_dim = (dimensions + num_subvectors - 1) / num_subvectors;
        let num_centroids = cfg.num_centroids.max(1).min(256);

        let mut centroids = Vec::with_capacity(num_subvectors);
        for sub in 0..num_subvectors {
            let slices: Vec<&[f32]> = training_set.iter().map(|v| sub_slice(v, sub, sub_dim, dimensions)).collect();
            centroids.push(train_one_subvector(&slices, num_centroids, sub_dim));
        }

        ProductQuantizer { dimensions, num_subvectors, sub_dim, centroids }
    }

    /// Encode a full-precision vector into one byte per sub-vector
    /// (nearest centroid index).
    pub fn encode(&self, vector: &[f32]) -> Vec<u8> {
        (0..self.num_subvectors)
            .map(|sub| {
                let slice = sub_slice(vector, sub, self.sub_dim, self.dimensions);
                nearest_centroid(slice, &self.centroids[sub]) as u8
            })
            .collect()
    }

    /// Approximate distance from a full-precision `query` to a quantized
    /// `code`, computed per sub-vector against the query's own slice and
    /// summed across slices.
    fn approx_distance(&self, metric: DistanceMetric, query: &[f32], code: &[u8]) -> f32 {
        let mut total = 0.0f32;
        for (sub, &centroid_id) in code.iter().enumerate() {
            let query_slice = sub_slice(query, sub, self.sub_dim, self.dimensions);
            let centroid = &self.centroids[sub][centroid_id as usize];
            total += metric.distance(query_slice, centroid);
        }
        total
    }

    /// Approximate distance between two already-quantized codes, summing
    /// per-slice centroid-to-centroid distance.
    fn code_distance(&self, metric: DistanceMetric, a: &[u8], b: &[u8]) -> f32 {
        let mut total = 0.0f32;
        for sub in 0..self.num_subvectors {
            let ca = &self.centroids[sub][a[sub] as usize];
            let cb = &self.centroids[sub][b[sub] as usize];
            total += metric.distance(ca, cb);
        }
        total
    }
}

fn sub_slice(v: &[f32], sub: usize, sub_dim: usize, dimensions: usize) -> &[f32] {
    let start = sub * sub_dim;
    let end = (start + sub_dim).min(dimensions).min(v.len());
    &v[start.min(v.len())..end]
}

fn nearest_centroid(slice: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_euclidean(slice, c);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Lloyd's iteration: alternate assignment and centroid-mean update for a
/// fixed number of rounds (20, enough to converge on typical embedding
/// distributions without a convergence-detection pass).
fn train_one_subvector(slices: &[&[f32]], num_centroids: usize, sub_dim: usize) -> Vec<Vec<f32>> {
    const ITERATIONS: usize = 20;

    if slices.is_empty() {
        return (0..num_centroids).map(|_| vec![0.0; sub_dim]).collect();
    }

    let step = (slices.len() / num_centroids).max(1);
    let mut centroids: Vec<Vec<f32>> = (0..num_centroids).map(|i| slices[(i * step).min(slices.len() - 1)].to_vec()).collect();

    for _ in 0..ITERATIONS {
        let mut sums: Vec<Vec<f32>> = vec![vec![0.0; sub_dim]; num_centroids];
        let mut counts = vec![0usize; num_centroids];

        for slice in slices {
            let assigned = nearest_centroid(slice, &centroids);
            counts[assigned] += 1;
            for (acc, &v) in sums[assigned].iter_mut().zip(slice.iter()) {
                *acc += v;
            }
        }

        for (i, centroid) in centroids.iter_mut().enumerate() {
            if counts[i] > 0 {
                for (c, s) in centroid.iter_mut().zip(sums[i].iter()) {
                    *c = s / counts[i] as f32;
                }
            }
        }
    }

    centroids
}

/// Quantized-code storage for the medium/large regimes.
///
/// Training itself (buffering inserts until `trainingSetSize` is reached,
/// then freezing) is orchestrated by [`crate::index::VectorIndex`], which
/// owns the `(id, vector)` buffer across the small-to-medium transition;
/// this type only holds the frozen codebook and the resulting codes.
#[derive(Debug, Default)]
pub struct QuantizedStore {
    quantizer: Option<ProductQuantizer>,
    codes: BTreeMap<NounId, Vec<u8>>,
}

impl QuantizedStore {
    /// Whether the codebook has been trained and frozen.
    pub fn is_trained(&self) -> bool {
        self.quantizer.is_some()
    }

    /// Train the codebook once from the full buffered training set and
    /// encode every buffered vector against it. A no-op if already trained.
    pub fn train_and_encode_all(&mut self, buffered: &[(NounId, Vec<f32>)], dimensions: usize, cfg: &QuantizationConfig) {
        if self.quantizer.is_some() {
            return;
        }
        let vectors: Vec<Vec<f32>> = buffered.iter().map(|(_, v)| v.clone()).collect();
        let quantizer = ProductQuantizer::train(&vectors, dimensions, cfg);
        for (id, v) in buffered {
            self.codes.insert(*id, quantizer.encode(v));
        }
        self.quantizer = Some(quantizer);
    }

    /// Encode and store one vector against the already-frozen codebook.
    /// A no-op if training has not happened yet (caller is expected to
    /// route pre-training inserts through the buffer instead).
    pub fn encode_and_store(&mut self, id: NounId, vector: &[f32]) {
        if let Some(q) = &self.quantizer {
            self.codes.insert(id, q.encode(vector));
        }
    }

    /// Remove a code.
    pub fn remove(&mut self, id: NounId) {
        self.codes.remove(&id);
    }
}

impl EmbeddingSource for QuantizedStore {
    fn distance_to(&self, metric: DistanceMetric, query: &[f32], id: NounId) -> Option<f32> {
        let quantizer = self.quantizer.as_ref()?;
        let code = self.codes.get(&id)?;
        Some(quantizer.approx_distance(metric, query, code))
    }

    fn contains(&self, id: NounId) -> bool {
        self.codes.contains_key(&id)
    }

    fn distance_between(&self, metric: DistanceMetric, a: NounId, b: NounId) -> Option<f32> {
        let quantizer = self.quantizer.as_ref()?;
        let (ca, cb) = (self.codes.get(&a)?, self.codes.get(&b)?);
        Some(quantizer.code_distance(metric, ca, cb))
    }
}
