//! Size limits enforced on nouns, verbs, and their metadata.
//!
//! These are configurable at database-open time; the defaults below are
//! generous enough for typical agent-memory workloads while still bounding
//! pathological inputs (an unbounded vector or metadata blob would defeat
//! the point of a fixed-dimension index).

use thiserror::Error;

/// Configurable size limits, set at database-open time.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum vector dimension `d` (default: 8192).
    pub max_vector_dim: usize,
    /// Maximum serialized metadata size in bytes (default: 1MB).
    pub max_metadata_bytes: usize,
    /// Maximum number of neighbors considered during a single `search`
    /// oversampling pass (default: 10_000), guards against a pathological
    /// `k * oversamplingFactor`.
    pub max_search_candidates: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_vector_dim: 8192,
            max_metadata_bytes: 1024 * 1024,
            max_search_candidates: 10_000,
        }
    }
}

impl Limits {
    /// Limits with small values, for tests that exercise limit enforcement
    /// without building huge inputs.
    pub fn for_testing() -> Self {
        Limits {
            max_vector_dim: 64,
            max_metadata_bytes: 4096,
            max_search_candidates: 100,
        }
    }

    /// Validate a vector's dimension against both the database's fixed `d`
    /// and this instance's `max_vector_dim` ceiling.
    pub fn validate_dimension(&self, expected_d: usize, got: usize) -> Result<(), LimitError> {
        if got == 0 {
            return Err(LimitError::EmptyVector);
        }
        if got > self.max_vector_dim {
            return Err(LimitError::VectorTooLarge {
                actual: got,
                max: self.max_vector_dim,
            });
        }
        if got != expected_d {
            return Err(LimitError::DimensionMismatch {
                expected: expected_d,
                got,
            });
        }
        Ok(())
    }

    /// Validate a serialized metadata blob's size.
    pub fn validate_metadata_bytes(&self, len: usize) -> Result<(), LimitError> {
        if len > self.max_metadata_bytes {
            return Err(LimitError::MetadataTooLarge {
                actual: len,
                max: self.max_metadata_bytes,
            });
        }
        Ok(())
    }
}

/// Errors produced by [`Limits`] validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimitError {
    /// A zero-length vector was supplied (spec §4.6 edge case).
    #[error("vector must have at least one dimension")]
    EmptyVector,

    /// A vector exceeded `max_vector_dim`.
    #[error("vector dimension {actual} exceeds maximum {max}")]
    VectorTooLarge {
        /// Dimension supplied.
        actual: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A vector's dimension did not match the database's configured `d`.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Database's configured dimension.
        expected: usize,
        /// Dimension supplied.
        got: usize,
    },

    /// Serialized metadata exceeded `max_metadata_bytes`.
    #[error("metadata size {actual} bytes exceeds maximum {max} bytes")]
    MetadataTooLarge {
        /// Size supplied.
        actual: usize,
        /// Configured maximum.
        max: usize,
    },
}

impl From<LimitError> for crate::Error {
    fn from(e: LimitError) -> Self {
        match e {
            LimitError::DimensionMismatch { expected, got } => crate::Error::DimensionMismatch { expected, got },
            LimitError::VectorTooLarge { actual, max } => {
                crate::Error::DimensionMismatch { expected: max, got: actual }
            }
            LimitError::EmptyVector => crate::Error::DimensionMismatch { expected: 1, got: 0 },
            LimitError::MetadataTooLarge { .. } => crate::Error::Fatal { message: e.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_vector() {
        let limits = Limits::default();
        assert_eq!(limits.validate_dimension(128, 0), Err(LimitError::EmptyVector));
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let limits = Limits::default();
        assert_eq!(
            limits.validate_dimension(128, 64),
            Err(LimitError::DimensionMismatch { expected: 128, got: 64 })
        );
    }

    #[test]
    fn accepts_matching_dimension() {
        let limits = Limits::default();
        assert!(limits.validate_dimension(128, 128).is_ok());
    }
}
