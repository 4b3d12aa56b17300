//! [`GraphStore`]: the thin durable layer above [`StorageAdapter`] that
//! spec §4.9 calls the graph store (component C9) — type coercion,
//! timestamp stamping, soft/hard delete with cascade, and embedded-verb
//! bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use vg_core::{NounId, Result, Timestamp, VerbId};
use vg_primitives::{Noun, Verb};
use vg_stats::{CounterKind, StatisticsEngine};
use vg_storage::{ChangeLogEntry, ChangeOp, Cursor, EntityKind, StorageAdapter};

use crate::coercion::{coerce_noun_type, coerce_verb_type, TypeValidation};

fn digest(value: &impl Serialize) -> u64 {
    serde_json::to_vec(value).map(|bytes| xxhash_rust::xxh3::xxh3_64(&bytes)).unwrap_or(0)
}

/// Outcome of a delete call: whether the entity existed, and — for a
/// cascading hard delete — how many incident verbs were removed with it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Whether the target existed prior to this call.
    pub found: bool,
    /// Incident verbs removed (only nonzero for `hard: true, cascade: true`).
    pub cascaded_verbs: usize,
}

/// The durable noun/verb layer above a [`StorageAdapter`] (spec §4.9).
pub struct GraphStore {
    storage: Arc<dyn StorageAdapter>,
    stats: Arc<StatisticsEngine>,
    validation: TypeValidation,
    writer: String,
    seq: AtomicU64,
}

impl GraphStore {
    /// A graph store over `storage`, attributing change-log entries to
    /// `writer` and incrementing `stats` on every durable mutation.
    pub fn new(storage: Arc<dyn StorageAdapter>, stats: Arc<StatisticsEngine>, validation: TypeValidation, writer: impl Into<String>) -> Self {
        GraphStore { storage, stats, validation, writer: writer.into(), seq: AtomicU64::new(0) }
    }

    /// Type-coercion policy this store enforces (spec §4.9).
    pub fn validation(&self) -> TypeValidation {
        self.validation
    }

    /// Resolve a raw noun-type tag through this store's [`TypeValidation`]
    /// (spec §4.9/§7). Callers that carry a raw string tag (CSV/graph
    /// import) must go through this rather than `NounType::parse_known`
    /// directly, or enforcement and the §7 warning are silently skipped.
    pub fn resolve_noun_type(&self, tag: &str) -> (vg_core::NounType, Option<String>) {
        coerce_noun_type(tag, self.validation)
    }

    /// Resolve a raw verb-type tag through this store's [`TypeValidation`],
    /// mirroring [`Self::resolve_noun_type`].
    pub fn resolve_verb_type(&self, tag: &str) -> (vg_core::VerbType, Option<String>) {
        coerce_verb_type(tag, self.validation)
    }

    /// Persist a newly-created noun: stamps timestamps (already set by
    /// [`Noun::new`]/[`Noun::placeholder`]), writes storage, appends one
    /// `Add` change-log entry, and increments the noun counter for its
    /// service.
    pub async fn add_noun(&self, noun: &Noun) -> Result<()> {
        self.storage.save_noun(noun).await?;
        self.append_change_log(ChangeOp::Add, EntityKind::Noun, noun.id.to_string(), digest(noun)).await?;
        self.stats.increment(CounterKind::Noun, &noun.service, 1);
        Ok(())
    }

    /// Overwrite an existing noun in place (vector/metadata update, or a
    /// placeholder promotion). Does not touch the noun counter — the noun
    /// already counted toward its service from `add_noun`.
    pub async fn update_noun(&self, noun: &Noun) -> Result<()> {
        self.storage.save_noun(noun).await?;
        self.append_change_log(ChangeOp::Update, EntityKind::Noun, noun.id.to_string(), digest(noun)).await
    }

    /// Fetch a noun by id (spec §4.2: `None` for missing or hard-deleted;
    /// soft-deleted nouns come back with `deleted = true`).
    pub async fn get_noun(&self, id: NounId) -> Result<Option<Noun>> {
        self.storage.get_noun(id).await
    }

    /// Delete a noun (spec §4.10 `delete`): soft by default (tombstone,
    /// still listed), or `hard` to remove the storage object entirely,
    /// optionally `cascade`-removing every incident verb.
    pub async fn delete_noun(&self, id: NounId, hard: bool, cascade: bool) -> Result<DeleteOutcome> {
        let Some(mut noun) = self.storage.get_noun(id).await? else {
            return Ok(DeleteOutcome::default());
        };

        let mut cascaded = 0;
        if hard {
            if cascade {
                cascaded = self.delete_incident_verbs(id).await?;
            }
            self.storage.delete_noun(id).await?;
            self.append_change_log(ChangeOp::Delete, EntityKind::Noun, id.to_string(), 0).await?;
            self.stats.increment(CounterKind::Noun, &noun.service, -1);
        } else {
            noun.soft_delete();
            self.storage.save_noun(&noun).await?;
            self.append_change_log(ChangeOp::Delete, EntityKind::Noun, id.to_string(), digest(&noun)).await?;
        }
        Ok(DeleteOutcome { found: true, cascaded_verbs: cascaded })
    }

    async fn delete_incident_verbs(&self, noun: NounId) -> Result<usize> {
        let outbound = self.delete_verbs_matching(Some(noun), None).await?;
        let inbound = self.delete_verbs_matching(None, Some(noun)).await?;
        Ok(outbound + inbound)
    }

    async fn delete_verbs_matching(&self, by_source: Option<NounId>, by_target: Option<NounId>) -> Result<usize> {
        let mut removed = 0;
        let mut cursor = None;
        loop {
            let page = self.storage.list_verbs(by_source, by_target, None, cursor, 500).await?;
            for verb in &page.items {
                self.storage.delete_verb(verb.id).await?;
                self.append_change_log(ChangeOp::Delete, EntityKind::Verb, verb.id.to_string(), 0).await?;
                self.stats.increment(CounterKind::Verb, &verb.service, -1);
                removed += 1;
            }
            match page.next_cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(removed)
    }

    /// Persist a newly-created verb: writes storage, duplicates its id
    /// into the source noun's `outbound_verbs` list for O(1) outbound
    /// traversal (spec §4.9), appends one `Add` change-log entry, and
    /// increments the verb counter for its service.
    pub async fn add_verb(&self, verb: &Verb) -> Result<()> {
        self.storage.save_verb(verb).await?;
        if let Some(mut source) = self.storage.get_noun(verb.source).await? {
            source.add_outbound_verb(verb.id);
            self.storage.save_noun(&source).await?;
        }
        self.append_change_log(ChangeOp::Add, EntityKind::Verb, verb.id.to_string(), digest(verb)).await?;
        self.stats.increment(CounterKind::Verb, &verb.service, 1);
        Ok(())
    }

    /// Overwrite an existing verb in place (metadata/weight/confidence
    /// update).
    pub async fn update_verb(&self, verb: &Verb) -> Result<()> {
        self.storage.save_verb(verb).await?;
        self.append_change_log(ChangeOp::Update, EntityKind::Verb, verb.id.to_string(), digest(verb)).await
    }

    /// Fetch a verb by id.
    pub async fn get_verb(&self, id: VerbId) -> Result<Option<Verb>> {
        self.storage.get_verb(id).await
    }

    /// Delete a verb (soft by default, `hard` removes the storage object
    /// and drops it from its source noun's `outbound_verbs`).
    pub async fn delete_verb(&self, id: VerbId, hard: bool) -> Result<DeleteOutcome> {
        let Some(mut verb) = self.storage.get_verb(id).await? else {
            return Ok(DeleteOutcome::default());
        };

        if hard {
            self.storage.delete_verb(id).await?;
            if let Some(mut source) = self.storage.get_noun(verb.source).await? {
                source.remove_outbound_verb(id);
                self.storage.save_noun(&source).await?;
            }
            self.append_change_log(ChangeOp::Delete, EntityKind::Verb, id.to_string(), 0).await?;
            self.stats.increment(CounterKind::Verb, &verb.service, -1);
        } else {
            verb.soft_delete();
            self.storage.save_verb(&verb).await?;
            self.append_change_log(ChangeOp::Delete, EntityKind::Verb, id.to_string(), digest(&verb)).await?;
        }
        Ok(DeleteOutcome { found: true, cascaded_verbs: 0 })
    }

    /// Outbound verbs for `id`, resolved through the O(1) embedded index
    /// on the noun rather than a `list_verbs` scan (spec §4.9).
    pub async fn outbound_verbs(&self, id: NounId) -> Result<Vec<Verb>> {
        let Some(noun) = self.storage.get_noun(id).await? else { return Ok(Vec::new()) };
        let mut verbs = Vec::with_capacity(noun.outbound_verbs.len());
        for verb_id in noun.outbound_verbs {
            if let Some(v) = self.storage.get_verb(verb_id).await? {
                verbs.push(v);
            }
        }
        Ok(verbs)
    }

    /// Paginated noun listing, delegated straight to storage.
    pub async fn list_nouns(&self, type_filter: Option<vg_core::NounType>, cursor: Option<Cursor>, limit: usize) -> Result<vg_storage::Page<Noun>> {
        self.storage.list_nouns(type_filter, cursor, limit).await
    }

    async fn append_change_log(&self, operation: ChangeOp, entity: EntityKind, id: String, payload_digest: u64) -> Result<()> {
        let entry = ChangeLogEntry {
            timestamp: Timestamp::now(),
            operation,
            entity,
            id,
            payload_digest,
            writer: self.writer.clone(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        self.storage.append_change_log(entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use uuid::Uuid;
    use vg_core::{CreatedBy, NounType, VerbType};
    use vg_storage::MemoryAdapter;

    fn id(n: u128) -> NounId {
        Uuid::from_u128(n).into()
    }

    fn store() -> GraphStore {
        let storage = Arc::new(MemoryAdapter::new());
        let stats = Arc::new(StatisticsEngine::new(storage.clone()));
        GraphStore::new(storage, stats, TypeValidation::default(), "writer-1")
    }

    fn created_by() -> CreatedBy {
        CreatedBy { name: "test".into(), version: "0".into() }
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let store = store();
        let noun = Noun::new(NounType::Thing, Some(vec![1.0, 0.0]), Map::new(), created_by(), "svc");
        store.add_noun(&noun).await.unwrap();
        let fetched = store.get_noun(noun.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, noun.id);
    }

    #[tokio::test]
    async fn soft_delete_keeps_the_noun_listed_with_deleted_flag() {
        let store = store();
        let noun = Noun::new(NounType::Thing, Some(vec![1.0, 0.0]), Map::new(), created_by(), "svc");
        store.add_noun(&noun).await.unwrap();
        let outcome = store.delete_noun(noun.id, false, false).await.unwrap();
        assert!(outcome.found);
        let fetched = store.get_noun(noun.id).await.unwrap().unwrap();
        assert!(fetched.deleted);
    }

    #[tokio::test]
    async fn hard_delete_with_cascade_removes_incident_verbs() {
        let store = store();
        let a = Noun::new(NounType::Thing, Some(vec![1.0, 0.0]), Map::new(), created_by(), "svc");
        let b = Noun::new(NounType::Thing, Some(vec![0.0, 1.0]), Map::new(), created_by(), "svc");
        store.add_noun(&a).await.unwrap();
        store.add_noun(&b).await.unwrap();
        let verb = Verb::new(a.id, b.id, VerbType::RelatedTo, Map::new(), 1.0, 0.0, created_by(), "svc");
        store.add_verb(&verb).await.unwrap();

        let outcome = store.delete_noun(a.id, true, true).await.unwrap();
        assert_eq!(outcome.cascaded_verbs, 1);
        assert!(store.get_noun(a.id).await.unwrap().is_none());
        assert!(store.get_verb(verb.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_verb_duplicates_into_source_outbound_list() {
        let store = store();
        let a = Noun::new(NounType::Thing, Some(vec![1.0, 0.0]), Map::new(), created_by(), "svc");
        let b = Noun::new(NounType::Thing, Some(vec![0.0, 1.0]), Map::new(), created_by(), "svc");
        store.add_noun(&a).await.unwrap();
        store.add_noun(&b).await.unwrap();
        let verb = Verb::new(a.id, b.id, VerbType::RelatedTo, Map::new(), 1.0, 0.0, created_by(), "svc");
        store.add_verb(&verb).await.unwrap();

        let outbound = store.outbound_verbs(a.id).await.unwrap();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].id, verb.id);
    }

    #[tokio::test]
    async fn delete_of_unknown_id_reports_not_found() {
        let store = store();
        let outcome = store.delete_noun(id(999), false, false).await.unwrap();
        assert!(!outcome.found);
    }

    #[test]
    fn resolve_noun_type_consults_the_stores_validation_policy() {
        let lenient = GraphStore::new(
            Arc::new(MemoryAdapter::new()),
            Arc::new(StatisticsEngine::new(Arc::new(MemoryAdapter::new()))),
            TypeValidation { enforce_noun_types: false, enforce_verb_types: false },
            "writer-1",
        );
        let (resolved, warning) = lenient.resolve_noun_type("Spaceship");
        assert_eq!(resolved, NounType::Other("Spaceship".to_string()));
        assert!(warning.is_none());

        let strict = store();
        let (resolved, warning) = strict.resolve_noun_type("Spaceship");
        assert_eq!(resolved, NounType::Thing);
        assert!(warning.is_some());
    }

    #[tokio::test]
    async fn statistics_reflect_added_and_hard_deleted_nouns() {
        let store = store();
        let noun = Noun::new(NounType::Thing, Some(vec![1.0, 0.0]), Map::new(), created_by(), "svc");
        store.add_noun(&noun).await.unwrap();
        store.delete_noun(noun.id, true, false).await.unwrap();
        let snapshot = store.stats.get_statistics(true).await.unwrap();
        assert_eq!(snapshot.services["svc"].noun_count, 0);
    }
}
