//! Vector distance functions (C1).
//!
//! Unlike the similarity-style scores used elsewhere in the corpus this
//! module follows the spec's "distance" convention: **smaller is more
//! similar**. [`DistanceMetric::Cosine`] and [`DistanceMetric::Euclidean`]
//! are true metrics; [`DistanceMetric::DotProduct`] is a negated inner
//! product so that it sorts the same direction as the others.
//!
//! All functions are single-threaded and operate on equal-length slices;
//! callers are responsible for dimension validation (invariant I1) before
//! calling in. No implicit normalization is performed.

use serde::{Deserialize, Serialize};

/// The four pluggable distance functions (spec §4.1).
///
/// The chosen metric is persisted alongside the index (spec §4.8) so a
/// re-opened database uses the same metric it was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`; 1.0 (maximally dissimilar) when either vector has
    /// zero norm.
    Cosine,
    /// `sqrt(sum((a_i - b_i)^2))`.
    Euclidean,
    /// `sum(|a_i - b_i|)`.
    Manhattan,
    /// `-(a . b)`, so that smaller (more negative) is more similar.
    DotProduct,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        DistanceMetric::Cosine
    }
}

impl DistanceMetric {
    /// Compute the distance between two equal-length vectors.
    ///
    /// # Panics
    /// Panics in debug builds if `a.len() != b.len()`; callers at the API
    /// boundary must validate dimension first and return
    /// [`crate::Error::DimensionMismatch`] instead of reaching this point.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "distance() requires equal-length vectors");
        match self {
            DistanceMetric::Cosine => cosine_distance(a, b),
            DistanceMetric::Euclidean => euclidean_distance(a, b),
            DistanceMetric::Manhattan => manhattan_distance(a, b),
            DistanceMetric::DotProduct => -dot_product(a, b),
        }
    }

    /// Compute the distance from `query` to every row of a row-major
    /// matrix (`rows * dim` contiguous floats). Used by the HNSW
    /// search-layer inner loop and the brute-force recall harness.
    pub fn batch_distance(&self, query: &[f32], matrix: &[f32], dim: usize) -> Vec<f32> {
        debug_assert_eq!(matrix.len() % dim, 0);
        matrix.chunks_exact(dim).map(|row| self.distance(query, row)).collect()
    }
}

/// Dot product (inner product) of two equal-length vectors.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 (Euclidean) norm.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot_product(a, b) / (norm_a * norm_b)
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

fn manhattan_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

/// Returns `true` if every element of `v` is finite (rejects NaN/Inf), per
/// the insert-path edge case in spec §4.6 ("Validate `v` has no NaN").
pub fn is_finite_vector(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors_is_zero() {
        let v = vec![1.0, 2.0, 3.0];
        assert!(DistanceMetric::Cosine.distance(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors_is_one() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((DistanceMetric::Cosine.distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_norm_is_maximally_dissimilar() {
        let zero = vec![0.0, 0.0, 0.0];
        let nonzero = vec![1.0, 2.0, 3.0];
        assert_eq!(DistanceMetric::Cosine.distance(&zero, &nonzero), 1.0);
    }

    #[test]
    fn euclidean_identical_vectors_is_zero() {
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(DistanceMetric::Euclidean.distance(&v, &v), 0.0);
    }

    #[test]
    fn manhattan_matches_sum_of_abs_diff() {
        let a = vec![1.0, 5.0];
        let b = vec![4.0, 1.0];
        assert_eq!(DistanceMetric::Manhattan.distance(&a, &b), 7.0);
    }

    #[test]
    fn dot_product_distance_smaller_is_more_similar() {
        let a = vec![1.0, 0.0];
        let aligned = vec![1.0, 0.0];
        let opposite = vec![-1.0, 0.0];
        assert!(
            DistanceMetric::DotProduct.distance(&a, &aligned)
                < DistanceMetric::DotProduct.distance(&a, &opposite)
        );
    }

    #[test]
    fn rejects_non_finite_vectors() {
        assert!(!is_finite_vector(&[1.0, f32::NAN]));
        assert!(!is_finite_vector(&[1.0, f32::INFINITY]));
        assert!(is_finite_vector(&[1.0, -2.5]));
    }

    #[test]
    fn batch_distance_matches_per_row_distance() {
        let query = vec![1.0, 0.0];
        let matrix = vec![1.0, 0.0, 0.0, 1.0, -1.0, 0.0];
        let got = DistanceMetric::Euclidean.batch_distance(&query, &matrix, 2);
        assert_eq!(got.len(), 3);
        assert!((got[0] - 0.0).abs() < 1e-6);
    }
}
