//! The HNSW vector index: standard variant, product-quantized/disk-spill
//! optimized variant, and the persistence bridge between them and durable
//! storage (spec §4.6-§4.8, components C6/C7/C8).
//!
//! - [`config`]: `HnswConfig`/`QuantizationConfig`/`VectorIndexConfig`.
//! - [`graph`]: the graph-only HNSW structure (topology, no embeddings).
//! - [`heap`]: resident full-precision vector storage.
//! - [`quantization`]: product quantization codebooks and codes.
//! - [`source`]: the `EmbeddingSource` seam the graph traverses against,
//!   implemented once for exact vectors and once for quantized codes.
//! - [`persistence`]: the on-disk snapshot format and (de)serialization.
//! - [`index`]: [`VectorIndex`], the facade combining all of the above.

#![warn(missing_docs)]

pub mod config;
pub mod graph;
pub mod heap;
pub mod index;
pub mod persistence;
pub mod quantization;
pub mod source;

pub use config::{HnswConfig, QuantizationConfig, VectorIndexConfig};
pub use index::{IndexStatus, Regime, VectorIndex};
pub use persistence::IndexSnapshot;
pub use source::EmbeddingSource;
