//! Database-wide configuration (spec §6).
//!
//! Plain Rust structs, `Serialize`/`Deserialize` so a host can round-trip
//! them through its own TOML/JSON/env layer — this crate never reads a
//! file or environment variable itself, mirroring the teacher's
//! `DatabaseConfig` pattern.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vg_core::{DistanceMetric, Error, Limits, Result};
use vg_graph::TypeValidation;
use vg_index::VectorIndexConfig;
use vg_storage::{LocalFsAdapter, MemoryAdapter, ObjectStoreAdapter, StorageAdapter};

use crate::mode::Mode;

/// Which backend a database instance persists through (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageConfig {
    /// In-process only, not shared across OS processes.
    Memory,
    /// One JSON file per object under `root`, append-only change log.
    LocalFs {
        /// Root directory; created if absent.
        root: PathBuf,
    },
    /// Origin Private File System, `wasm32` target only.
    BrowserFs,
    /// Any S3-compatible bucket via the `object_store` crate.
    ObjectStore {
        /// Bucket name.
        bucket: String,
        /// Custom endpoint (non-AWS S3-compatible services).
        endpoint: Option<String>,
        /// Bucket region.
        region: Option<String>,
        /// Static credentials; omit to use the ambient AWS credential chain.
        access_key_id: Option<String>,
        /// Static credentials; omit to use the ambient AWS credential chain.
        secret_access_key: Option<String>,
        /// Object key prefix this database's objects live under.
        prefix: String,
        /// Whether to allow plain HTTP (local S3-compatible test servers).
        allow_http: bool,
    },
}

/// `{useParallelization}` (spec §6): whether bulk operations fan out
/// across a worker pool or run strictly sequentially. Exposed for hosts
/// on constrained runtimes (e.g. a single-threaded wasm32 event loop).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Whether `import` uses [`vg_concurrency::WorkerPool`] fan-out.
    pub use_parallelization: bool,
    /// Worker pool size when `use_parallelization` is true.
    pub concurrency: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig { use_parallelization: true, concurrency: 8 }
    }
}

/// Full database configuration (spec §6 "recognized options").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Fixed vector dimension `d`.
    pub dimensions: usize,
    /// Distance function used throughout.
    pub distance_function: DistanceMetric,
    /// HNSW/quantization/regime-threshold parameters (C6/C7).
    pub index: VectorIndexConfig,
    /// Storage backend selection.
    pub storage: StorageConfig,
    /// Cache manager tunables (C11).
    pub cache: vg_cache::CacheConfig,
    /// Noun/verb type-coercion policy (C9).
    pub type_validation: TypeValidation,
    /// Starting operating mode; changeable at runtime via
    /// [`crate::database::Database::set_mode`].
    pub mode: Mode,
    /// Bulk-operation parallelism policy.
    pub performance: PerformanceConfig,
    /// Size ceilings on vectors and metadata.
    pub limits: Limits,
    /// Default `k` oversampling factor applied before post-filtering
    /// (spec §4.10: "HNSW search for a superset of `k` candidates
    /// (`k · oversamplingFactor`)").
    pub oversampling_factor: usize,
    /// Label identifying this process as a writer-of-record in the change
    /// log and noun/verb `service` field.
    pub service: String,
}

impl DatabaseConfig {
    /// A config fixed to `dimensions`, in-memory storage, everything else
    /// defaulted — the shape used by nearly every unit test in this crate
    /// family.
    pub fn for_dimensions(dimensions: usize) -> Self {
        DatabaseConfig {
            dimensions,
            distance_function: DistanceMetric::default(),
            index: VectorIndexConfig::for_dimensions(dimensions),
            storage: StorageConfig::Memory,
            cache: vg_cache::CacheConfig::default(),
            type_validation: TypeValidation::default(),
            mode: Mode::default(),
            performance: PerformanceConfig::default(),
            limits: Limits::default(),
            oversampling_factor: 3,
            service: "vectorgraph".to_string(),
        }
    }
}

/// Build the concrete [`StorageAdapter`] named by `config`.
pub fn build_storage_adapter(config: &StorageConfig) -> Result<Arc<dyn StorageAdapter>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryAdapter::new())),
        StorageConfig::LocalFs { root } => {
            let adapter = LocalFsAdapter::open(root.clone())?;
            Ok(Arc::new(adapter))
        }
        StorageConfig::BrowserFs => {
            #[cfg(target_arch = "wasm32")]
            {
                Ok(Arc::new(vg_storage::BrowserFsAdapter::open()?))
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                Err(Error::storage_unavailable("browser-fs storage is only available on wasm32 targets"))
            }
        }
        StorageConfig::ObjectStore { bucket, endpoint, region, access_key_id, secret_access_key, prefix, allow_http } => {
            let mut builder = object_store::aws::AmazonS3Builder::new().with_bucket_name(bucket).with_allow_http(*allow_http);
            if let Some(endpoint) = endpoint {
                builder = builder.with_endpoint(endpoint);
            }
            if let Some(region) = region {
                builder = builder.with_region(region);
            }
            if let Some(key) = access_key_id {
                builder = builder.with_access_key_id(key);
            }
            if let Some(secret) = secret_access_key {
                builder = builder.with_secret_access_key(secret);
            }
            let store = builder
                .build()
                .map_err(|e| Error::storage_unavailable(format!("failed to construct object store client: {e}")))?;
            Ok(Arc::new(ObjectStoreAdapter::new(Arc::new(store), prefix.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_config_builds_a_memory_adapter() {
        let adapter = build_storage_adapter(&StorageConfig::Memory).unwrap();
        assert!(adapter.clear().await.is_ok());
    }

    #[test]
    fn browser_fs_is_unavailable_off_wasm32() {
        #[cfg(not(target_arch = "wasm32"))]
        {
            let result = build_storage_adapter(&StorageConfig::BrowserFs);
            assert!(matches!(result, Err(Error::StorageUnavailable { .. })));
        }
    }
}
