//! In-process, single-instance memory backend (spec §4.3).
//!
//! Grounded on the teacher's `ShardedStore` idiom: `DashMap` for lock-free
//! concurrent reads, one map per object kind rather than one map keyed by a
//! tagged enum, so hot paths never pay for a downcast.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::Duration;
use vg_core::{Error, NounId, NounType, Result, Timestamp, VerbId, VerbType};
use vg_primitives::{Noun, Verb};

use crate::adapter::StorageAdapter;
use crate::lock::LockTable;
use crate::types::{ChangeLogEntry, Cursor, LockToken, Page, StorageStatus};

/// The only backend not safe to share across OS processes — within one
/// process it is the cheapest and simplest (spec §4.3: "single instance
/// only, no distributed coordination needed").
#[derive(Default)]
pub struct MemoryAdapter {
    nouns: DashMap<NounId, Noun>,
    verbs: DashMap<VerbId, Verb>,
    metadata: DashMap<String, JsonValue>,
    change_log: Mutex<Vec<ChangeLogEntry>>,
    statistics: DashMap<String, JsonValue>,
    hnsw_index_size: std::sync::atomic::AtomicU64,
    index_snapshot: Mutex<Option<Vec<u8>>>,
    locks: LockTable,
}

impl MemoryAdapter {
    /// An empty, ready-to-use in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn save_noun(&self, noun: &Noun) -> Result<()> {
        self.nouns.insert(noun.id, noun.clone());
        Ok(())
    }

    async fn get_noun(&self, id: NounId) -> Result<Option<Noun>> {
        Ok(self.nouns.get(&id).map(|r| r.clone()))
    }

    async fn delete_noun(&self, id: NounId) -> Result<()> {
        self.nouns.remove(&id);
        Ok(())
    }

    async fn list_nouns(&self, type_filter: Option<NounType>, cursor: Option<Cursor>, limit: usize) -> Result<Page<Noun>> {
        let mut ordered: BTreeMap<NounId, Noun> = self
            .nouns
            .iter()
            .filter(|e| type_filter.as_ref().map_or(true, |t| t == &e.noun_type))
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        let start = cursor_to_noun_id(cursor.as_ref());
        if let Some(start) = start {
            ordered = ordered.split_off(&start);
        }
        paginate(ordered.into_iter().map(|(_, v)| v), limit, |n| Cursor(n.id.to_string()))
    }

    async fn save_verb(&self, verb: &Verb) -> Result<()> {
        self.verbs.insert(verb.id, verb.clone());
        Ok(())
    }

    async fn get_verb(&self, id: VerbId) -> Result<Option<Verb>> {
        Ok(self.verbs.get(&id).map(|r| r.clone()))
    }

    async fn delete_verb(&self, id: VerbId) -> Result<()> {
        self.verbs.remove(&id);
        Ok(())
    }

    async fn list_verbs(
        &self,
        by_source: Option<NounId>,
        by_target: Option<NounId>,
        by_type: Option<VerbType>,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Page<Verb>> {
        let mut ordered: BTreeMap<VerbId, Verb> = self
            .verbs
            .iter()
            .filter(|e| by_source.map_or(true, |s| s == e.source))
            .filter(|e| by_target.map_or(true, |t| t == e.target))
            .filter(|e| by_type.as_ref().map_or(true, |t| t == &e.verb_type))
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        let start = cursor_to_verb_id(cursor.as_ref());
        if let Some(start) = start {
            ordered = ordered.split_off(&start);
        }
        paginate(ordered.into_iter().map(|(_, v)| v), limit, |v| Cursor(v.id.to_string()))
    }

    async fn save_metadata(&self, id: &str, metadata: &JsonValue) -> Result<()> {
        self.metadata.insert(id.to_string(), metadata.clone());
        Ok(())
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<JsonValue>> {
        Ok(self.metadata.get(id).map(|r| r.clone()))
    }

    async fn append_change_log(&self, entry: ChangeLogEntry) -> Result<()> {
        self.change_log.lock().push(entry);
        Ok(())
    }

    async fn get_changes_since(&self, since: Timestamp) -> Result<Vec<ChangeLogEntry>> {
        let mut entries: Vec<_> = self.change_log.lock().iter().filter(|e| e.timestamp >= since).cloned().collect();
        entries.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(entries)
    }

    async fn save_statistics(&self, partition: &str, snapshot: &JsonValue) -> Result<()> {
        self.statistics.insert(partition.to_string(), snapshot.clone());
        Ok(())
    }

    async fn get_statistics(&self, partition: &str) -> Result<Option<JsonValue>> {
        Ok(self.statistics.get(partition).map(|r| r.clone()))
    }

    async fn increment_statistic(&self, partition: &str, kind: &str, service: &str, delta: i64) -> Result<()> {
        let mut entry = self.statistics.entry(partition.to_string()).or_insert_with(|| serde_json::json!({}));
        let counter = entry.pointer_mut(&format!("/{service}/{kind}"));
        match counter {
            Some(v) => {
                let current = v.as_i64().unwrap_or(0);
                *v = serde_json::json!(current + delta);
            }
            None => {
                let obj = entry.as_object_mut().expect("statistics snapshot is always an object");
                let service_entry = obj.entry(service.to_string()).or_insert_with(|| serde_json::json!({}));
                service_entry.as_object_mut().expect("service bucket is always an object").insert(kind.to_string(), serde_json::json!(delta));
            }
        }
        Ok(())
    }

    async fn update_hnsw_index_size(&self, n: u64) -> Result<()> {
        self.hnsw_index_size.store(n, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    async fn save_index_snapshot(&self, bytes: &[u8]) -> Result<()> {
        *self.index_snapshot.lock() = Some(bytes.to_vec());
        Ok(())
    }

    async fn load_index_snapshot(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.index_snapshot.lock().clone())
    }

    async fn acquire_lock(&self, name: &str, ttl: Duration, timeout: Duration) -> Result<LockToken> {
        self.locks.acquire(name, ttl, timeout).await
    }

    async fn release_lock(&self, name: &str, token: &LockToken) -> Result<()> {
        self.locks.release(name, token);
        Ok(())
    }

    async fn flush_statistics_to_storage(&self) -> Result<()> {
        // Every `save_statistics`/`increment_statistic` call above is
        // already durable the instant it returns; nothing to flush.
        Ok(())
    }

    async fn storage_status(&self) -> Result<StorageStatus> {
        let mut details = serde_json::Map::new();
        details.insert("nouns".into(), serde_json::json!(self.nouns.len()));
        details.insert("verbs".into(), serde_json::json!(self.verbs.len()));
        Ok(StorageStatus {
            backend_type: "memory".into(),
            used_bytes: 0,
            quota_bytes: None,
            details,
        })
    }

    async fn clear(&self) -> Result<()> {
        self.nouns.clear();
        self.verbs.clear();
        self.metadata.clear();
        self.change_log.lock().clear();
        self.statistics.clear();
        self.hnsw_index_size.store(0, std::sync::atomic::Ordering::Relaxed);
        *self.index_snapshot.lock() = None;
        Ok(())
    }
}

fn cursor_to_noun_id(cursor: Option<&Cursor>) -> Option<NounId> {
    cursor.and_then(|c| NounId::parse(&c.0))
}

fn cursor_to_verb_id(cursor: Option<&Cursor>) -> Option<VerbId> {
    cursor.and_then(|c| VerbId::parse(&c.0))
}

fn paginate<T>(iter: impl Iterator<Item = T>, limit: usize, cursor_of: impl Fn(&T) -> Cursor) -> Result<Page<T>> {
    if limit == 0 {
        return Err(Error::Fatal { message: "listing limit must be > 0".into() });
    }
    let mut items: Vec<T> = iter.take(limit + 1).collect();
    let next_cursor = if items.len() > limit {
        let extra = items.pop().expect("len > limit implies non-empty");
        Some(cursor_of(&extra))
    } else {
        None
    };
    Ok(Page { items, next_cursor })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use vg_core::CreatedBy;

    fn created_by() -> CreatedBy {
        CreatedBy { name: "test".into(), version: "0.0.0".into() }
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let adapter = MemoryAdapter::new();
        let noun = Noun::new(NounType::Thing, Some(vec![1.0, 0.0]), Map::new(), created_by(), "svc");
        adapter.save_noun(&noun).await.unwrap();
        let got = adapter.get_noun(noun.id).await.unwrap().unwrap();
        assert_eq!(got.id, noun.id);
    }

    #[tokio::test]
    async fn get_missing_noun_is_none() {
        let adapter = MemoryAdapter::new();
        assert!(adapter.get_noun(NounId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hard_delete_removes_the_object() {
        let adapter = MemoryAdapter::new();
        let noun = Noun::new(NounType::Thing, None, Map::new(), created_by(), "svc");
        adapter.save_noun(&noun).await.unwrap();
        adapter.delete_noun(noun.id).await.unwrap();
        assert!(adapter.get_noun(noun.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_nouns_paginates_deterministically() {
        let adapter = MemoryAdapter::new();
        for _ in 0..5 {
            adapter.save_noun(&Noun::new(NounType::Thing, None, Map::new(), created_by(), "svc")).await.unwrap();
        }
        let page1 = adapter.list_nouns(None, None, 2).await.unwrap();
        assert_eq!(page1.items.len(), 2);
        assert!(page1.next_cursor.is_some());
        let page2 = adapter.list_nouns(None, page1.next_cursor, 2).await.unwrap();
        assert_eq!(page2.items.len(), 2);
        let page3 = adapter.list_nouns(None, page2.next_cursor, 2).await.unwrap();
        assert_eq!(page3.items.len(), 1);
        assert!(page3.next_cursor.is_none());
    }

    #[tokio::test]
    async fn change_log_orders_by_timestamp_writer_seq() {
        let adapter = MemoryAdapter::new();
        let t = Timestamp::from_micros(100);
        adapter
            .append_change_log(ChangeLogEntry { timestamp: t, operation: crate::types::ChangeOp::Add, entity: crate::types::EntityKind::Noun, id: "b".into(), payload_digest: 0, writer: "w2".into(), seq: 0 })
            .await
            .unwrap();
        adapter
            .append_change_log(ChangeLogEntry { timestamp: t, operation: crate::types::ChangeOp::Add, entity: crate::types::EntityKind::Noun, id: "a".into(), payload_digest: 0, writer: "w1".into(), seq: 0 })
            .await
            .unwrap();
        let changes = adapter.get_changes_since(Timestamp::EPOCH).await.unwrap();
        assert_eq!(changes[0].id, "a");
        assert_eq!(changes[1].id, "b");
    }

    #[tokio::test]
    async fn increment_statistic_accumulates_per_service() {
        let adapter = MemoryAdapter::new();
        adapter.increment_statistic("20260727", "nounCount", "svc-a", 3).await.unwrap();
        adapter.increment_statistic("20260727", "nounCount", "svc-a", 2).await.unwrap();
        let snapshot = adapter.get_statistics("20260727").await.unwrap().unwrap();
        assert_eq!(snapshot["svc-a"]["nounCount"], serde_json::json!(5));
    }

    #[tokio::test]
    async fn clear_empties_every_map() {
        let adapter = MemoryAdapter::new();
        adapter.save_noun(&Noun::new(NounType::Thing, None, Map::new(), created_by(), "svc")).await.unwrap();
        adapter.clear().await.unwrap();
        let status = adapter.storage_status().await.unwrap();
        assert_eq!(status.details["nouns"], serde_json::json!(0));
    }
}
