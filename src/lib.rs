//! # vectorgraph
//!
//! A persistent, graph-augmented vector database core for AI agent memory:
//! HNSW approximate nearest-neighbor search over typed entities (nouns)
//! connected by typed, directed relationships (verbs), with pluggable
//! storage and distributed-friendly statistics.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vectorgraph::{AddData, AddOptions, Database, DatabaseConfig, NoopEmbedder, SearchQuery};
//!
//! # async fn run() -> vectorgraph::Result<()> {
//! let db = Database::open(DatabaseConfig::for_dimensions(3), Arc::new(NoopEmbedder::new(3))).await?;
//! let token = vectorgraph::CancellationToken::new();
//!
//! let id = db.add(AddData::Vector(vec![1.0, 0.0, 0.0]), AddOptions::default(), &token).await?;
//! let hits = db.search(SearchQuery::Vector(vec![1.0, 0.0, 0.0]), 5, None, &token).await?;
//! assert!(hits.iter().any(|r| r.id == id));
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! [`Database`] is the single entry point; it owns the HNSW index, the
//! typed graph store, the statistics engine, and the three-tier cache
//! manager, and gates every call through the current [`Mode`]. The
//! individual component crates (`vg-core`, `vg-primitives`, `vg-storage`,
//! `vg-stats`, `vg-index`, `vg-graph`, `vg-cache`, `vg-concurrency`) are
//! implementation detail; only the surface re-exported here is stable.

pub use vg_core::{
    CreatedBy, DistanceMetric, Error, LimitError, Limits, NounId, NounType, Result, Timestamp, VerbId, VerbType,
};
pub use vg_primitives::{FieldOp, FilterExpr, JsonScalar, Noun, Verb};
pub use vg_storage::{ChangeLogEntry, ChangeOp, Cursor, EntityKind, Page, StorageAdapter};
pub use vg_stats::{CounterKind, ServiceCounts, Snapshot};
pub use vg_index::{HnswConfig, QuantizationConfig, VectorIndexConfig};
pub use vg_graph::TypeValidation;
pub use vg_cache::CacheConfig;
pub use vg_concurrency::{run_cancellable, CancellationToken};

pub use vg_orchestrator::{
    build_storage_adapter, AddData, AddOptions, AddVerbOptions, Database, DatabaseConfig, DeleteOptions, EmbedError,
    EmbeddingProvider, ExportFormat, ExportOptions, ExportOutput, GraphEdge, GraphExport, GraphNode, HookRegistry,
    ImportOptions, ImportOutcome, ImportRecord, ImportReport, ImportSource, Mode, NoopEmbedder, NounWithVerbs,
    PerformanceConfig, PostSearchContext, PostSearchHook, PreInsertContext, PreInsertHook, SearchQuery, SearchResult,
    StorageConfig, UpdateOptions,
};
