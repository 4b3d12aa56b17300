//! [`Database`]: the query orchestrator (spec §4.10, component C10) tying
//! the index, graph store, statistics engine, and cache manager together
//! behind `add`/`search`/`addVerb`/`update`/`delete`/`import`/`export`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value as JsonValue};
use vg_concurrency::{run_cancellable, CancellationToken, WorkerPool};
use vg_core::{CreatedBy, Error, NounId, Result, Timestamp, VerbId, VerbType};
use vg_graph::GraphStore;
use vg_index::VectorIndex;
use vg_primitives::{FilterExpr, Noun, Verb};
use vg_stats::{Snapshot, StatisticsEngine};
use vg_storage::StorageAdapter;

use vg_cache::CacheManager;

use crate::config::{build_storage_adapter, DatabaseConfig};
use crate::embed::EmbeddingProvider;
use crate::export::{render_csv, render_embeddings_only, render_graph, render_json, ExportFormat, ExportOptions, ExportOutput, GraphEdge, GraphExport, GraphNode};
use crate::hooks::{HookRegistry, PostSearchContext, PostSearchHook, PreInsertContext, PreInsertHook};
use crate::import::{ImportOptions, ImportOutcome, ImportRecord, ImportReport, ImportSource};
use crate::mode::Mode;

/// `add`'s input: either a vector used directly, or text embedded via the
/// configured provider (spec §4.10).
#[derive(Debug, Clone)]
pub enum AddData {
    /// Use this vector as-is (after dimension validation).
    Vector(Vec<f32>),
    /// Embed this text via [`EmbeddingProvider::embed`].
    Text(String),
}

/// Tunables for [`Database::add`].
#[derive(Debug, Clone)]
pub struct AddOptions {
    /// Id to assign; if it already exists this call updates in place
    /// rather than erroring (spec §4.10: "on duplicate-id race, second
    /// writer observes and updates rather than erroring").
    pub id: Option<NounId>,
    /// Closed-set type tag.
    pub noun_type: vg_core::NounType,
    /// Free-form metadata.
    pub metadata: Map<String, JsonValue>,
    /// Writer-of-record attribution.
    pub created_by: CreatedBy,
}

impl Default for AddOptions {
    fn default() -> Self {
        AddOptions {
            id: None,
            noun_type: vg_core::NounType::default(),
            metadata: Map::new(),
            created_by: CreatedBy { name: "vectorgraph".to_string(), version: "0".to_string() },
        }
    }
}

/// `search`'s query: a vector used directly, or text embedded first.
#[derive(Debug, Clone)]
pub enum SearchQuery {
    /// Search against this vector directly.
    Vector(Vec<f32>),
    /// Embed this text, then search.
    Text(String),
}

/// One hydrated, filtered search result.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Noun id.
    pub id: NounId,
    /// Distance to the query (smaller is more similar, spec §4.1).
    pub distance: f32,
    /// The hydrated noun.
    pub noun: Noun,
}

/// Tunables for [`Database::add_verb`].
#[derive(Debug, Clone)]
pub struct AddVerbOptions {
    /// Create placeholder nouns for missing endpoints instead of failing
    /// (spec §4.10). Ignored while the database is in [`Mode::WriteOnly`],
    /// which always skips the existence check entirely.
    pub auto_create_missing_nouns: bool,
    /// Free-form metadata.
    pub metadata: Map<String, JsonValue>,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Unbounded relationship weight.
    pub weight: f32,
    /// Writer-of-record attribution.
    pub created_by: CreatedBy,
}

impl Default for AddVerbOptions {
    fn default() -> Self {
        AddVerbOptions {
            auto_create_missing_nouns: false,
            metadata: Map::new(),
            confidence: 1.0,
            weight: 0.0,
            created_by: CreatedBy { name: "vectorgraph".to_string(), version: "0".to_string() },
        }
    }
}

/// Tunables for [`Database::update`].
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// New embedding data; if set, the noun is re-embedded/re-validated
    /// and re-inserted into the index (delete + insert).
    pub data: Option<AddData>,
    /// New metadata; metadata-only updates skip index work entirely.
    pub metadata: Option<Map<String, JsonValue>>,
}

/// Tunables for [`Database::delete`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Hard-delete: remove from index and storage entirely, rather than
    /// tombstoning.
    pub hard: bool,
    /// With `hard`, also remove every incident verb.
    pub cascade: bool,
}

/// A noun plus its outbound verbs (spec §4.10 scenario 1:
/// `getNounWithVerbs`).
#[derive(Debug, Clone)]
pub struct NounWithVerbs {
    /// The noun itself.
    pub noun: Noun,
    /// Verbs outbound from it, resolved via the embedded index (spec §4.9).
    pub outbound_verbs: Vec<Verb>,
}

/// The query orchestrator (spec §4.10, component C10): the single public
/// facade over the index, graph store, statistics engine, and cache
/// manager.
///
/// Construction never blocks on anything beyond opening the storage
/// backend and, if one was persisted, loading the HNSW snapshot (spec §9
/// "async class constructors with deferred init" → builder/factory
/// returns a fully initialized instance). Call [`Database::shutdown`]
/// before dropping the last handle to flush statistics and checkpoint the
/// index.
pub struct Database {
    config: DatabaseConfig,
    storage: Arc<dyn StorageAdapter>,
    index: VectorIndex,
    graph: GraphStore,
    stats: Arc<StatisticsEngine>,
    cache: Arc<CacheManager>,
    embedder: Arc<dyn EmbeddingProvider>,
    hooks: RwLock<HookRegistry>,
    mode: AtomicU8,
}

impl Database {
    /// Open a database: construct the storage backend named by
    /// `config.storage`, load or rebuild the HNSW index, and start the
    /// statistics flush loop and cache auto-tuner in the background.
    pub async fn open(config: DatabaseConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Arc<Database>> {
        let storage = build_storage_adapter(&config.storage)?;

        let index = VectorIndex::new(config.index.clone());
        index.load_or_rebuild(storage.as_ref()).await?;

        let stats = Arc::new(StatisticsEngine::new(storage.clone()));
        let graph = GraphStore::new(storage.clone(), stats.clone(), config.type_validation, config.service.clone());
        let cache = Arc::new(CacheManager::new(storage.clone(), config.cache.clone()));

        let _ = stats.spawn_flush_loop();
        let _ = cache.spawn_auto_tune();

        let mode = AtomicU8::new(config.mode.to_u8());
        Ok(Arc::new(Database { config, storage, index, graph, stats, cache, embedder, hooks: RwLock::new(HookRegistry::new()), mode }))
    }

    /// The configuration this database was opened with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Current operating mode (spec §4.10).
    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    /// Change the operating mode at runtime (spec §4.10: "process-global,
    /// settable at runtime").
    pub fn set_mode(&self, mode: Mode) {
        self.mode.store(mode.to_u8(), Ordering::Relaxed);
    }

    /// Register a handler run just before a noun is written.
    pub fn register_pre_insert(&self, handler: PreInsertHook) {
        self.hooks.write().register_pre_insert(handler);
    }

    /// Register a handler run just before `search` returns its results.
    pub fn register_post_search(&self, handler: PostSearchHook) {
        self.hooks.write().register_post_search(handler);
    }

    /// Current statistics snapshot (spec §4.4). `fresh = true` pays a
    /// synchronous flush first.
    pub async fn get_statistics(&self, fresh: bool) -> Result<Snapshot> {
        self.stats.get_statistics(fresh).await
    }

    /// Flush statistics, stop the background flush loop and auto-tuner,
    /// and checkpoint the index. Call before dropping the last handle.
    pub async fn shutdown(&self) -> Result<()> {
        self.stats.shutdown().await;
        self.cache.shutdown().await?;
        self.index.checkpoint(self.storage.as_ref()).await?;
        Ok(())
    }

    async fn resolve_vector(&self, data: AddData) -> Result<Vec<f32>> {
        let vector = match data {
            AddData::Vector(v) => v,
            AddData::Text(text) => self
                .embedder
                .embed(&text)
                .await
                .map_err(|e| Error::Fatal { message: format!("embedding failed: {e}") })?,
        };
        self.config.limits.validate_dimension(self.config.dimensions, vector.len())?;
        if !vg_core::distance::is_finite_vector(&vector) {
            return Err(Error::Fatal { message: "vector contains NaN or infinite components".into() });
        }
        Ok(vector)
    }

    /// Fallback-looked-up noun: hot/warm cache, then cold storage (spec
    /// §4.10 "before returning not found, always check storage after
    /// index").
    async fn lookup_noun(&self, id: NounId) -> Result<Option<Noun>> {
        self.cache.get_noun(id).await
    }

    /// Create or update a noun (spec §4.10 `add`).
    pub async fn add(&self, data: AddData, opts: AddOptions, token: &CancellationToken) -> Result<NounId> {
        self.mode().require_write("add")?;
        run_cancellable("add", token, self.add_inner(data, opts)).await
    }

    async fn add_inner(&self, data: AddData, opts: AddOptions) -> Result<NounId> {
        let mut vector = self.resolve_vector(data).await?;
        let id = opts.id.unwrap_or_default();
        let mut metadata = opts.metadata;

        {
            let mut ctx = PreInsertContext { id, vector: &mut vector, metadata: &mut metadata };
            self.hooks.read().run_pre_insert(&mut ctx)?;
        }

        match self.lookup_noun(id).await? {
            Some(mut noun) => {
                noun.promote_from_placeholder(opts.noun_type, Some(vector.clone()), metadata);
                self.graph.update_noun(&noun).await?;
            }
            None => {
                let mut noun = Noun::new(opts.noun_type, Some(vector.clone()), metadata, opts.created_by, &self.config.service);
                noun.id = id;
                self.graph.add_noun(&noun).await?;
            }
        }

        // Storage is written before the index (invariant I3: the index
        // never runs ahead of what storage has durably recorded).
        self.index.insert(id, vector)?;
        self.stats.set_hnsw_index_size(self.index.status().index_size as u64);
        self.cache.invalidate_noun(id);
        tracing::info!(%id, "add");
        Ok(id)
    }

    /// Nearest-`k` search with optional post-filter (spec §4.10 `search`).
    pub async fn search(&self, query: SearchQuery, k: usize, filter: Option<FilterExpr>, token: &CancellationToken) -> Result<Vec<SearchResult>> {
        self.mode().require_read("search")?;
        run_cancellable("search", token, self.search_inner(query, k, filter)).await
    }

    async fn search_inner(&self, query: SearchQuery, k: usize, filter: Option<FilterExpr>) -> Result<Vec<SearchResult>> {
        let query_vector = match query {
            SearchQuery::Vector(v) => v,
            SearchQuery::Text(text) => self
                .embedder
                .embed(&text)
                .await
                .map_err(|e| Error::Fatal { message: format!("embedding failed: {e}") })?,
        };
        self.config.limits.validate_dimension(self.config.dimensions, query_vector.len())?;

        let oversampled_k = (k.max(1) * self.config.oversampling_factor.max(1)).min(self.config.limits.max_search_candidates);
        let candidates = self.index.search(&query_vector, oversampled_k, self.storage.as_ref()).await?;

        let mut hydrated: HashMap<NounId, Noun> = HashMap::new();
        let mut pairs = Vec::new();
        for (id, distance) in candidates {
            let Some(noun) = self.lookup_noun(id).await? else { continue };
            if noun.deleted || noun.placeholder {
                continue;
            }
            if let Some(filter) = &filter {
                if !filter.matches_noun(&noun) {
                    continue;
                }
            }
            hydrated.insert(id, noun);
            pairs.push((id, distance));
            if pairs.len() >= k {
                break;
            }
        }

        {
            let registry = self.hooks.read();
            let mut ctx = PostSearchContext { query: &query_vector, results: &mut pairs };
            registry.run_post_search(&mut ctx)?;
        }

        Ok(pairs.into_iter().filter_map(|(id, distance)| hydrated.remove(&id).map(|noun| SearchResult { id, distance, noun })).collect())
    }

    /// Add a directed, typed relationship (spec §4.10 `addVerb`).
    pub async fn add_verb(&self, source: NounId, target: NounId, verb_type: VerbType, opts: AddVerbOptions, token: &CancellationToken) -> Result<VerbId> {
        self.mode().require_write("addVerb")?;
        run_cancellable("addVerb", token, self.add_verb_inner(source, target, verb_type, opts)).await
    }

    async fn add_verb_inner(&self, source: NounId, target: NounId, verb_type: VerbType, opts: AddVerbOptions) -> Result<VerbId> {
        // `writeOnlyMode` skips endpoint existence checks entirely (spec
        // §4.10); every other mode requires both endpoints to exist,
        // falling back to storage if the cache hasn't hydrated them yet.
        if self.mode() != Mode::WriteOnly {
            let mut missing = Vec::new();
            for id in [source, target] {
                if self.lookup_noun(id).await?.is_none() {
                    missing.push(id);
                }
            }
            if !missing.is_empty() {
                if opts.auto_create_missing_nouns {
                    for id in &missing {
                        let placeholder = Noun::placeholder(*id, &self.config.service);
                        self.graph.add_noun(&placeholder).await?;
                        self.cache.invalidate_noun(*id);
                    }
                } else {
                    let ids = missing.iter().map(NounId::to_string).collect::<Vec<_>>().join(", ");
                    return Err(Error::not_found(format!("noun(s) {ids}")));
                }
            }
        }

        let verb = Verb::new(source, target, verb_type, opts.metadata, opts.confidence, opts.weight, opts.created_by, &self.config.service);
        self.graph.add_verb(&verb).await?;
        self.cache.invalidate_noun(source);
        tracing::info!(id = %verb.id, "addVerb");
        Ok(verb.id)
    }

    /// In-place mutation (spec §4.10 `update`). A metadata-only update
    /// skips the index entirely; a `data` update re-embeds (if
    /// applicable) and re-inserts into the index.
    pub async fn update(&self, id: NounId, opts: UpdateOptions, token: &CancellationToken) -> Result<()> {
        self.mode().require_write("update")?;
        run_cancellable("update", token, self.update_inner(id, opts)).await
    }

    async fn update_inner(&self, id: NounId, opts: UpdateOptions) -> Result<()> {
        let Some(mut noun) = self.lookup_noun(id).await? else {
            return Err(Error::not_found(format!("noun {id}")));
        };

        let mut reindex = false;
        if let Some(data) = opts.data {
            noun.vector = Some(self.resolve_vector(data).await?);
            reindex = true;
        }
        if let Some(metadata) = opts.metadata {
            noun.metadata = metadata;
        }
        noun.updated_at = Timestamp::now();
        self.graph.update_noun(&noun).await?;
        self.cache.invalidate_noun(id);

        if reindex {
            self.index.insert(id, noun.vector.expect("just set above"))?;
            self.stats.set_hnsw_index_size(self.index.status().index_size as u64);
        }
        Ok(())
    }

    /// Delete a noun (spec §4.10 `delete`): soft by default, `hard`
    /// removes index + storage, `cascade` additionally removes incident
    /// verbs. Returns whether the noun existed.
    pub async fn delete(&self, id: NounId, opts: DeleteOptions, token: &CancellationToken) -> Result<bool> {
        self.mode().require_write("delete")?;
        run_cancellable("delete", token, self.delete_inner(id, opts)).await
    }

    async fn delete_inner(&self, id: NounId, opts: DeleteOptions) -> Result<bool> {
        let outcome = self.graph.delete_noun(id, opts.hard, opts.cascade).await?;
        if outcome.found {
            self.cache.invalidate_noun(id);
            if opts.hard {
                self.index.delete(id);
                self.stats.set_hnsw_index_size(self.index.status().index_size as u64);
            }
        }
        Ok(outcome.found)
    }

    /// Delete a verb directly (soft by default, `hard` removes it from
    /// storage and its source noun's outbound list).
    pub async fn delete_verb(&self, id: VerbId, hard: bool, token: &CancellationToken) -> Result<bool> {
        self.mode().require_write("deleteVerb")?;
        run_cancellable("deleteVerb", token, async {
            let outcome = self.graph.delete_verb(id, hard).await?;
            Ok(outcome.found)
        })
        .await
    }

    /// A noun plus its outbound verbs (spec §4.10 scenario 1).
    pub async fn get_noun_with_verbs(&self, id: NounId, token: &CancellationToken) -> Result<Option<NounWithVerbs>> {
        self.mode().require_read("getNounWithVerbs")?;
        run_cancellable("getNounWithVerbs", token, async {
            let Some(noun) = self.lookup_noun(id).await? else { return Ok(None) };
            let outbound_verbs = self.graph.outbound_verbs(id).await?;
            Ok(Some(NounWithVerbs { noun, outbound_verbs }))
        })
        .await
    }

    /// Bulk ingest (spec §4.10 `import`): parses `source`, then fans each
    /// record's embed call out through a bounded worker pool, continuing
    /// past per-record failures.
    pub async fn import(&self, source: ImportSource, opts: ImportOptions, token: &CancellationToken) -> Result<ImportReport> {
        self.mode().require_write("import")?;
        let records = source.into_records().map_err(|message| Error::Fatal { message })?;
        run_cancellable("import", token, self.import_inner(records, opts)).await
    }

    async fn import_inner(&self, records: Vec<ImportRecord>, opts: ImportOptions) -> Result<ImportReport> {
        let mut prepared = records;
        for record in &mut prepared {
            record.id = Some(record.id.unwrap_or_default());
        }
        let ids_in_order: Vec<NounId> = prepared.iter().map(|r| r.id.expect("assigned above")).collect();

        let concurrency = if self.config.performance.use_parallelization { opts.concurrency } else { 1 };
        let pool = WorkerPool::new(concurrency);

        let results = pool.run_batch(prepared, move |record| async move { self.import_one(record).await }).await;

        let outcomes = results
            .into_iter()
            .zip(ids_in_order)
            .enumerate()
            .map(|(index, (result, id))| match result {
                Ok(_) => ImportOutcome::Imported(id),
                Err(e) => ImportOutcome::Failed { index, message: e.to_string() },
            })
            .collect();
        Ok(ImportReport { outcomes })
    }

    async fn import_one(&self, record: ImportRecord) -> Result<ImportRecord> {
        let data = match (&record.vector, &record.text) {
            (Some(v), _) => AddData::Vector(v.clone()),
            (None, Some(t)) => AddData::Text(t.clone()),
            (None, None) => return Err(Error::Fatal { message: "record has neither a vector nor text to embed".into() }),
        };
        let noun_type = match &record.noun_type {
            Some(tag) => self.graph.resolve_noun_type(tag).0,
            None => vg_core::NounType::default(),
        };
        let opts = AddOptions {
            id: record.id,
            noun_type,
            metadata: record.metadata.clone(),
            created_by: CreatedBy { name: self.config.service.clone(), version: "0".to_string() },
        };
        self.add_inner(data, opts).await?;
        Ok(record)
    }

    /// Wipe every noun, verb, metadata blob, change-log entry, statistics
    /// partition, and persisted index snapshot (spec §4.2 `clear()`), then
    /// reset the in-memory index to match the now-empty backend so a
    /// subsequent `import` starts from a truly empty state.
    pub async fn clear(&self, token: &CancellationToken) -> Result<()> {
        self.mode().require_write("clear")?;
        run_cancellable("clear", token, async {
            self.storage.clear().await?;
            self.index.rebuild_from_storage(self.storage.as_ref()).await
        })
        .await
    }

    /// Bulk ingest from a previously exported `{nodes, edges}` graph,
    /// preserving ids so verb topology survives the round trip (spec §8:
    /// "export(json) ∘ clear ∘ import is the identity on (ids, vectors,
    /// metadata, verb topology)"). Nouns go through the normal `add` path
    /// (storage + index + change-log + statistics); verbs are written
    /// directly, since by the time any edge is processed every noun from
    /// this same graph already exists.
    pub async fn import_graph(&self, graph: GraphExport, token: &CancellationToken) -> Result<ImportReport> {
        self.mode().require_write("import")?;
        run_cancellable("import", token, self.import_graph_inner(graph)).await
    }

    async fn import_graph_inner(&self, graph: GraphExport) -> Result<ImportReport> {
        let mut outcomes = Vec::with_capacity(graph.nodes.len());
        for (index, node) in graph.nodes.into_iter().enumerate() {
            outcomes.push(match self.import_graph_node(node).await {
                Ok(id) => ImportOutcome::Imported(id),
                Err(e) => ImportOutcome::Failed { index, message: e.to_string() },
            });
        }
        for edge in graph.edges {
            if let Err(e) = self.import_graph_edge(edge).await {
                tracing::warn!(error = %e, "skipping edge with an unresolvable endpoint during graph import");
            }
        }
        Ok(ImportReport { outcomes })
    }

    async fn import_graph_node(&self, node: GraphNode) -> Result<NounId> {
        let id = NounId::parse(&node.id).ok_or_else(|| Error::Fatal { message: format!("invalid noun id in graph import: {}", node.id) })?;
        let (noun_type, _warning) = self.graph.resolve_noun_type(&node.noun_type);
        let data = match node.vector {
            Some(v) => AddData::Vector(v),
            None => return Err(Error::Fatal { message: "graph import node has no vector".into() }),
        };
        let opts = AddOptions {
            id: Some(id),
            noun_type,
            metadata: node.metadata,
            created_by: CreatedBy { name: self.config.service.clone(), version: "0".to_string() },
        };
        self.add_inner(data, opts).await
    }

    async fn import_graph_edge(&self, edge: GraphEdge) -> Result<()> {
        let id = VerbId::parse(&edge.id).ok_or_else(|| Error::Fatal { message: format!("invalid verb id in graph import: {}", edge.id) })?;
        let source = NounId::parse(&edge.source).ok_or_else(|| Error::Fatal { message: format!("invalid source id in graph import: {}", edge.source) })?;
        let target = NounId::parse(&edge.target).ok_or_else(|| Error::Fatal { message: format!("invalid target id in graph import: {}", edge.target) })?;
        let (verb_type, _warning) = self.graph.resolve_verb_type(&edge.verb_type);
        let now = Timestamp::now();
        let verb = Verb {
            id,
            source,
            target,
            verb_type,
            metadata: edge.metadata,
            confidence: 1.0,
            weight: 0.0,
            embedding: None,
            created_at: now,
            updated_at: now,
            created_by: CreatedBy { name: self.config.service.clone(), version: "0".to_string() },
            deleted: false,
            service: self.config.service.clone(),
        };
        self.graph.add_verb(&verb).await
    }

    /// Bulk export (spec §4.10 `export`).
    pub async fn export(&self, opts: ExportOptions, token: &CancellationToken) -> Result<ExportOutput> {
        self.mode().require_read("export")?;
        run_cancellable("export", token, self.export_inner(opts)).await
    }

    async fn export_inner(&self, opts: ExportOptions) -> Result<ExportOutput> {
        let format = opts.format.unwrap_or(ExportFormat::Json);
        let mut nouns = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.graph.list_nouns(None, cursor, 500).await?;
            let exhausted = page.next_cursor.is_none();
            for noun in page.items {
                if noun.deleted || noun.placeholder {
                    continue;
                }
                if let Some(filter) = &opts.filter {
                    if !filter.matches_noun(&noun) {
                        continue;
                    }
                }
                nouns.push(noun);
                if opts.limit.is_some_and(|limit| nouns.len() >= limit) {
                    break;
                }
            }
            if exhausted || opts.limit.is_some_and(|limit| nouns.len() >= limit) {
                break;
            }
            cursor = page.next_cursor;
        }

        Ok(match format {
            ExportFormat::Json => render_json(&nouns),
            ExportFormat::Csv => render_csv(&nouns),
            ExportFormat::EmbeddingsOnly => render_embeddings_only(&nouns),
            ExportFormat::Graph => {
                let mut verbs = Vec::new();
                for noun in &nouns {
                    verbs.extend(self.graph.outbound_verbs(noun.id).await?);
                }
                render_graph(&nouns, &verbs)
            }
        })
    }
}
