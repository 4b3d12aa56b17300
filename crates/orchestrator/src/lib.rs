//! The query orchestrator (spec §4.10, component C10): the single public
//! facade tying the HNSW index, typed graph store, statistics engine, and
//! cache manager into `add`/`search`/`addVerb`/`update`/`delete`/
//! `import`/`export`, gated by a process-global [`Mode`].
//!
//! - [`config`]: [`DatabaseConfig`]/[`StorageConfig`], and
//!   [`build_storage_adapter`] to turn the latter into a live backend.
//! - [`mode`]: [`Mode`] and its read/write gating.
//! - [`embed`]: the [`EmbeddingProvider`] seam and [`NoopEmbedder`] default.
//! - [`hooks`]: the pre-insert/post-search augmentation registry.
//! - [`import`] / [`export`]: bulk ingest and bulk dump.
//! - [`database`]: [`Database`], the facade.

#![warn(missing_docs)]

pub mod config;
pub mod database;
pub mod embed;
pub mod export;
pub mod hooks;
pub mod import;
pub mod mode;

pub use config::{build_storage_adapter, DatabaseConfig, PerformanceConfig, StorageConfig};
pub use database::{
    AddData, AddOptions, AddVerbOptions, Database, DeleteOptions, NounWithVerbs, SearchQuery, SearchResult, UpdateOptions,
};
pub use embed::{EmbedError, EmbeddingProvider, NoopEmbedder};
pub use export::{ExportFormat, ExportOptions, ExportOutput, GraphEdge, GraphExport, GraphNode};
pub use hooks::{HookRegistry, PostSearchContext, PostSearchHook, PreInsertContext, PreInsertHook};
pub use import::{ImportOptions, ImportOutcome, ImportRecord, ImportReport, ImportSource};
pub use mode::Mode;
