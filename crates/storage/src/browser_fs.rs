//! Browser (OPFS) backend, compiled only for `wasm32` targets (spec §4.3).
//!
//! Mirrors [`crate::local_fs::LocalFsAdapter`]'s layout one-for-one —
//! `nouns/{typeTag}/{id}`, `verbs/{typeTag}/{id}`, `changelog/{ts}-{seq}` —
//! against the Origin Private File System instead of a real filesystem,
//! using `web-sys`'s `FileSystemDirectoryHandle`/`FileSystemFileHandle` the
//! way the teacher's client-side persistence code drives IndexedDB through
//! `wasm-bindgen-futures`.

#![cfg(target_arch = "wasm32")]

use async_trait::async_trait;
use js_sys::Uint8Array;
use serde_json::Value as JsonValue;
use std::time::Duration;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{FileSystemDirectoryHandle, FileSystemGetFileOptions, FileSystemRemoveOptions};
use vg_core::{Error, NounId, NounType, Result, Timestamp, VerbId, VerbType};
use vg_primitives::{Noun, Verb};

use crate::adapter::StorageAdapter;
use crate::changelog_codec;
use crate::lock::LockTable;
use crate::types::{ChangeLogEntry, Cursor, LockToken, Page, StorageStatus};

/// OPFS-backed adapter rooted at a single directory handle within the
/// browser's private origin storage.
pub struct BrowserFsAdapter {
    root: FileSystemDirectoryHandle,
    locks: LockTable,
}

fn js_err(context: &str, e: JsValue) -> Error {
    Error::storage_unavailable(format!("{context}: {}", e.as_string().unwrap_or_else(|| "unknown OPFS error".into())))
}

async fn await_js(context: &str, promise: js_sys::Promise) -> Result<JsValue> {
    JsFuture::from(promise).await.map_err(|e| js_err(context, e))
}

impl BrowserFsAdapter {
    /// Open (creating if absent) a backend rooted at the given OPFS
    /// directory handle. Obtaining the root handle itself
    /// (`navigator.storage.getDirectory()`) is left to the caller, since
    /// it requires a JS `Window`/worker context this crate does not assume.
    pub fn new(root: FileSystemDirectoryHandle) -> Self {
        BrowserFsAdapter { root, locks: LockTable::new() }
    }

    async fn get_subdir(&self, parent: &FileSystemDirectoryHandle, name: &str, create: bool) -> Result<Option<FileSystemDirectoryHandle>> {
        let mut opts = web_sys::FileSystemGetDirectoryOptions::new();
        opts.create(create);
        match await_js("opening directory", parent.get_directory_handle_with_options(name, &opts).into()).await {
            Ok(value) => Ok(Some(value.unchecked_into())),
            Err(_) if !create => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_subdirs(&self, parent: &FileSystemDirectoryHandle) -> Result<Vec<String>> {
        let entries = js_sys::try_iter(&parent.entries()).map_err(|e| js_err("listing directory", e))?.ok_or_else(|| Error::Fatal { message: "OPFS directory is not iterable".into() })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| js_err("iterating directory", e))?;
            let pair: js_sys::Array = entry.unchecked_into();
            names.push(pair.get(0).as_string().unwrap_or_default());
        }
        Ok(names)
    }

    async fn write_file(&self, dir: &FileSystemDirectoryHandle, name: &str, bytes: &[u8]) -> Result<()> {
        let mut opts = FileSystemGetFileOptions::new();
        opts.create(true);
        let handle: web_sys::FileSystemFileHandle = await_js("creating file handle", dir.get_file_handle_with_options(name, &opts).into()).await?.unchecked_into();
        let writable = await_js("opening writable stream", handle.create_writable().into()).await?;
        let writable: web_sys::FileSystemWritableFileStream = writable.unchecked_into();
        let array = Uint8Array::from(bytes);
        await_js("writing bytes", writable.write_with_buffer_source(&array).map_err(|e| js_err("starting write", e))?.into()).await?;
        await_js("closing writable stream", writable.close().into()).await?;
        Ok(())
    }

    async fn read_file(&self, dir: &FileSystemDirectoryHandle, name: &str) -> Result<Option<Vec<u8>>> {
        let handle = match await_js("opening file handle", dir.get_file_handle(name).into()).await {
            Ok(h) => h,
            Err(_) => return Ok(None),
        };
        let handle: web_sys::FileSystemFileHandle = handle.unchecked_into();
        let file: web_sys::File = await_js("getting file", handle.get_file().into()).await?.unchecked_into();
        let array_buffer = await_js("reading file bytes", file.array_buffer().into()).await?;
        let bytes = Uint8Array::new(&array_buffer).to_vec();
        Ok(Some(bytes))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, dir: &FileSystemDirectoryHandle, name: &str) -> Result<Option<T>> {
        match self.read_file(dir, name).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| Error::Fatal { message: format!("corrupt OPFS object {name}: {e}") }),
            None => Ok(None),
        }
    }

    async fn write_json<T: serde::Serialize>(&self, dir: &FileSystemDirectoryHandle, name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| Error::Fatal { message: e.to_string() })?;
        self.write_file(dir, name, &bytes).await
    }

    async fn remove_file(&self, dir: &FileSystemDirectoryHandle, name: &str) {
        let opts = FileSystemRemoveOptions::new();
        let _ = await_js("removing entry", dir.remove_entry_with_options(name, &opts).into()).await;
    }
}

#[async_trait::async_trait(?Send)]
impl StorageAdapter for BrowserFsAdapter {
    async fn save_noun(&self, noun: &Noun) -> Result<()> {
        let nouns = self.get_subdir(&self.root, "nouns", true).await?.expect("create=true always yields a handle");
        let type_dir = self.get_subdir(&nouns, noun.noun_type.storage_tag(), true).await?.expect("create=true always yields a handle");
        self.write_json(&type_dir, &noun.id.to_string(), noun).await
    }

    async fn get_noun(&self, id: NounId) -> Result<Option<Noun>> {
        let Some(nouns) = self.get_subdir(&self.root, "nouns", false).await? else { return Ok(None) };
        for tag in self.list_subdirs(&nouns).await? {
            let Some(type_dir) = self.get_subdir(&nouns, &tag, false).await? else { continue };
            if let Some(noun) = self.read_json::<Noun>(&type_dir, &id.to_string()).await? {
                return Ok(Some(noun));
            }
        }
        Ok(None)
    }

    async fn delete_noun(&self, id: NounId) -> Result<()> {
        if let Some(nouns) = self.get_subdir(&self.root, "nouns", false).await? {
            for tag in self.list_subdirs(&nouns).await? {
                if let Some(type_dir) = self.get_subdir(&nouns, &tag, false).await? {
                    self.remove_file(&type_dir, &id.to_string()).await;
                }
            }
        }
        Ok(())
    }

    async fn list_nouns(&self, type_filter: Option<NounType>, cursor: Option<Cursor>, limit: usize) -> Result<Page<Noun>> {
        let Some(nouns) = self.get_subdir(&self.root, "nouns", false).await? else {
            return Ok(Page { items: Vec::new(), next_cursor: None });
        };
        let tags: Vec<String> = match type_filter {
            Some(t) => vec![t.storage_tag().to_string()],
            None => self.list_subdirs(&nouns).await?,
        };
        let mut all = Vec::new();
        for tag in tags {
            let Some(type_dir) = self.get_subdir(&nouns, &tag, false).await? else { continue };
            for name in self.list_subdirs_as_files(&type_dir).await? {
                if let Some(noun) = self.read_json::<Noun>(&type_dir, &name).await? {
                    all.push(noun);
                }
            }
        }
        all.sort_by_key(|n| n.id);
        let start_after = cursor.as_ref().and_then(|c| NounId::parse(&c.0));
        let items: Vec<Noun> = all.into_iter().filter(|n| start_after.map_or(true, |after| n.id > after)).collect();
        paginate(items, limit, |n| Cursor(n.id.to_string()))
    }

    async fn save_verb(&self, verb: &Verb) -> Result<()> {
        let verbs = self.get_subdir(&self.root, "verbs", true).await?.expect("create=true always yields a handle");
        let type_dir = self.get_subdir(&verbs, verb.verb_type.storage_tag(), true).await?.expect("create=true always yields a handle");
        self.write_json(&type_dir, &verb.id.to_string(), verb).await
    }

    async fn get_verb(&self, id: VerbId) -> Result<Option<Verb>> {
        let Some(verbs) = self.get_subdir(&self.root, "verbs", false).await? else { return Ok(None) };
        for tag in self.list_subdirs(&verbs).await? {
            let Some(type_dir) = self.get_subdir(&verbs, &tag, false).await? else { continue };
            if let Some(verb) = self.read_json::<Verb>(&type_dir, &id.to_string()).await? {
                return Ok(Some(verb));
            }
        }
        Ok(None)
    }

    async fn delete_verb(&self, id: VerbId) -> Result<()> {
        if let Some(verbs) = self.get_subdir(&self.root, "verbs", false).await? {
            for tag in self.list_subdirs(&verbs).await? {
                if let Some(type_dir) = self.get_subdir(&verbs, &tag, false).await? {
                    self.remove_file(&type_dir, &id.to_string()).await;
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
        let Some(verbs) = self.get_subdir(&self.root, "verbs", false).await? else {
            return Ok(Page { items: Vec::new(), next_cursor: None });
        };
        let tags: Vec<String> = match by_type {
            Some(t) => vec![t.storage_tag().to_string()],
            None => self.list_subdirs(&verbs).await?,
        };
        let mut all = Vec::new();
        for tag in tags {
            let Some(type_dir) = self.get_subdir(&verbs, &tag, false).await? else { continue };
            for name in self.list_subdirs_as_files(&type_dir).await? {
                if let Some(verb) = self.read_json::<Verb>(&type_dir, &name).await? {
                    if by_source.map_or(true, |s| s == verb.source) && by_target.map_or(true, |t| t == verb.target) {
                        all.push(verb);
                    }
                }
            }
        }
        all.sort_by_key(|v| v.id);
        let start_after = cursor.as_ref().and_then(|c| VerbId::parse(&c.0));
        let items: Vec<Verb> = all.into_iter().filter(|v| start_after.map_or(true, |after| v.id > after)).collect();
        paginate(items, limit, |v| Cursor(v.id.to_string()))
    }

    async fn save_metadata(&self, id: &str, metadata: &JsonValue) -> Result<()> {
        let dir = self.get_subdir(&self.root, "metadata", true).await?.expect("create=true always yields a handle");
        self.write_json(&dir, id, metadata).await
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<JsonValue>> {
        let Some(dir) = self.get_subdir(&self.root, "metadata", false).await? else { return Ok(None) };
        self.read_json(&dir, id).await
    }

    async fn append_change_log(&self, entry: ChangeLogEntry) -> Result<()> {
        let dir = self.get_subdir(&self.root, "changelog", true).await?.expect("create=true always yields a handle");
        let key = changelog_codec::object_key(&entry);
        let name = key.strip_prefix("changelog/").unwrap_or(&key);
        self.write_json(&dir, name, &entry).await
    }

    async fn get_changes_since(&self, since: Timestamp) -> Result<Vec<ChangeLogEntry>> {
        let Some(dir) = self.get_subdir(&self.root, "changelog", false).await? else { return Ok(Vec::new()) };
        let mut entries = Vec::new();
        for name in self.list_subdirs_as_files(&dir).await? {
            if let Some(entry) = self.read_json::<ChangeLogEntry>(&dir, &name).await? {
                if entry.timestamp >= since {
                    entries.push(entry);
                }
            }
        }
        entries.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(entries)
    }

    async fn save_statistics(&self, partition: &str, snapshot: &JsonValue) -> Result<()> {
        let dir = self.get_subdir(&self.root, "index", true).await?.expect("create=true always yields a handle");
        self.write_json(&dir, &format!("statistics_{partition}"), snapshot).await
    }

    async fn get_statistics(&self, partition: &str) -> Result<Option<JsonValue>> {
        let Some(dir) = self.get_subdir(&self.root, "index", false).await? else { return Ok(None) };
        self.read_json(&dir, &format!("statistics_{partition}")).await
    }

    async fn increment_statistic(&self, partition: &str, kind: &str, service: &str, delta: i64) -> Result<()> {
        let dir = self.get_subdir(&self.root, "index", true).await?.expect("create=true always yields a handle");
        let name = format!("statistics_{partition}");
        let mut snapshot = self.read_json::<JsonValue>(&dir, &name).await?.unwrap_or_else(|| serde_json::json!({}));
        let obj = snapshot.as_object_mut().expect("statistics snapshot is always an object");
        let service_entry = obj.entry(service.to_string()).or_insert_with(|| serde_json::json!({}));
        let service_obj = service_entry.as_object_mut().expect("service bucket is always an object");
        let current = service_obj.get(kind).and_then(|v| v.as_i64()).unwrap_or(0);
        service_obj.insert(kind.to_string(), serde_json::json!(current + delta));
        self.write_json(&dir, &name, &snapshot).await
    }

    async fn update_hnsw_index_size(&self, n: u64) -> Result<()> {
        let dir = self.get_subdir(&self.root, "index", true).await?.expect("create=true always yields a handle");
        self.write_json(&dir, "hnsw_size", &n).await
    }

    async fn save_index_snapshot(&self, bytes: &[u8]) -> Result<()> {
        let dir = self.get_subdir(&self.root, "index", true).await?.expect("create=true always yields a handle");
        self.write_file(&dir, "hnsw.json", bytes).await
    }

    async fn load_index_snapshot(&self) -> Result<Option<Vec<u8>>> {
        let Some(dir) = self.get_subdir(&self.root, "index", false).await? else { return Ok(None) };
        self.read_file(&dir, "hnsw.json").await
    }

    async fn acquire_lock(&self, name: &str, ttl: Duration, timeout: Duration) -> Result<LockToken> {
        // Browser tabs sharing one origin run on the same JS thread per
        // tab; cross-tab contention is out of scope (spec §4.3 notes this
        // backend's safety applies within a single tab/worker).
        let token = self.locks.acquire(name, ttl, timeout).await?;
        let dir = self.get_subdir(&self.root, "locks", true).await?.expect("create=true always yields a handle");
        let deadline = Timestamp::from_micros(Timestamp::now().as_micros() + ttl.as_micros() as u64);
        let _ = self.write_json(&dir, name, &crate::types::LockRecord { token: token.clone(), deadline }).await;
        Ok(token)
    }

    async fn release_lock(&self, name: &str, token: &LockToken) -> Result<()> {
        self.locks.release(name, token);
        if let Some(dir) = self.get_subdir(&self.root, "locks", false).await? {
            self.remove_file(&dir, name).await;
        }
        Ok(())
    }

    async fn flush_statistics_to_storage(&self) -> Result<()> {
        Ok(())
    }

    async fn storage_status(&self) -> Result<StorageStatus> {
        let mut details = serde_json::Map::new();
        let quota_bytes = navigator_storage_quota().await;
        details.insert("backend".into(), serde_json::json!("opfs"));
        Ok(StorageStatus { backend_type: "browser-fs".into(), used_bytes: 0, quota_bytes, details })
    }

    async fn clear(&self) -> Result<()> {
        for name in ["nouns", "verbs", "metadata", "index", "changelog", "locks"] {
            let opts = FileSystemRemoveOptions::new();
            opts.set_recursive(true);
            let _ = await_js("clearing directory", self.root.remove_entry_with_options(name, &opts).into()).await;
        }
        Ok(())
    }
}

impl BrowserFsAdapter {
    /// OPFS directory iteration yields both files and subdirectories; this
    /// crate's layout never mixes the two within one directory, so callers
    /// that want "just the files" (changelog entries, lock records, noun
    /// objects within a type directory) can reuse [`Self::list_subdirs`]'s
    /// name listing directly.
    async fn list_subdirs_as_files(&self, dir: &FileSystemDirectoryHandle) -> Result<Vec<String>> {
        self.list_subdirs(dir).await
    }
}

/// Best-effort browser storage quota via `navigator.storage.estimate()`.
async fn navigator_storage_quota() -> Option<u64> {
    let window = web_sys::window()?;
    let storage = window.navigator().storage();
    let estimate = JsFuture::from(storage.estimate().ok()?).await.ok()?;
    js_sys::Reflect::get(&estimate, &JsValue::from_str("quota")).ok()?.as_f64().map(|q| q as u64)
}

fn paginate<T>(items: Vec<T>, limit: usize, cursor_of: impl Fn(&T) -> Cursor) -> Result<Page<T>> {
    if limit == 0 {
        return Err(Error::Fatal { message: "listing limit must be > 0".into() });
    }
    let mut items = items;
    if items.len() > limit {
        let rest = items.split_off(limit);
        let next_cursor = rest.first().map(cursor_of);
        Ok(Page { items, next_cursor })
    } else {
        Ok(Page { items, next_cursor: None })
    }
}
