//! Filesystem-backed key-value store
//!
//! Layout: `<root>/<database>/<object_store>/<hex(key)>.json`. Every call
//! opens a [`Database`], uses it, and drops it before returning, so no handle
//! outlives an operation. Writes go to a unique temp file and are renamed
//! into place, so a reader never sees a torn record.

use super::KvStore;
use crate::config::KvStoreConfig;
use crate::engine::StorageFuture;
use crate::error::StorageError;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct LocalFsKvStore {
    root: PathBuf,
    database: String,
    object_store: String,
    open_connections: Arc<AtomicUsize>,
    opened_total: Arc<AtomicU64>,
    write_nonce: Arc<AtomicU64>,
}

impl LocalFsKvStore {
    pub fn new(
        root: impl Into<PathBuf>,
        database: impl Into<String>,
        object_store: impl Into<String>,
    ) -> Self {
        LocalFsKvStore {
            root: root.into(),
            database: database.into(),
            object_store: object_store.into(),
            open_connections: Arc::new(AtomicUsize::new(0)),
            opened_total: Arc::new(AtomicU64::new(0)),
            write_nonce: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(config: &KvStoreConfig) -> Self {
        Self::new(
            config.data_dir.clone(),
            config.database.clone(),
            config.object_store.clone(),
        )
    }

    /// Directory holding this store's records
    pub fn store_dir(&self) -> PathBuf {
        self.root.join(&self.database).join(&self.object_store)
    }

    /// Connections currently open. Zero whenever no call is in flight.
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::Acquire)
    }

    /// Connections opened since creation
    pub fn opened_total(&self) -> u64 {
        self.opened_total.load(Ordering::Acquire)
    }

    /// Open the database, creating the object store directory on first use.
    async fn open(&self) -> Result<Database, StorageError> {
        let dir = self.store_dir();
        tokio::fs::create_dir_all(&dir).await?;
        self.open_connections.fetch_add(1, Ordering::AcqRel);
        self.opened_total.fetch_add(1, Ordering::AcqRel);
        trace!(dir = %dir.display(), "kv database opened");
        Ok(Database {
            dir,
            open_connections: self.open_connections.clone(),
        })
    }
}

impl KvStore for LocalFsKvStore {
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<Value>> {
        Box::pin(async move {
            let db = self.open().await?;
            db.get(key).await
        })
    }

    fn put<'a>(&'a self, key: &'a str, value: &'a Value) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let nonce = self.write_nonce.fetch_add(1, Ordering::Relaxed);
            let db = self.open().await?;
            db.put(key, value, nonce).await
        })
    }
}

/// An open connection. Closed on drop.
struct Database {
    dir: PathBuf,
    open_connections: Arc<AtomicUsize>,
}

impl Database {
    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.record_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn put(&self, key: &str, value: &Value, nonce: u64) -> Result<(), StorageError> {
        let path = self.record_path(key);
        let tmp = temp_path(&path, nonce);
        let bytes = serde_json::to_vec(value)?;
        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.open_connections.fetch_sub(1, Ordering::AcqRel);
    }
}

fn temp_path(path: &Path, nonce: u64) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.{}.tmp", std::process::id(), nonce));
    path.with_file_name(name)
}

/// Hex of the key's UTF-8 bytes; any key maps to a safe file name.
fn encode_key(key: &str) -> String {
    hex::encode(key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (LocalFsKvStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsKvStore::new(dir.path(), "web-editor", "web-projects");
        (store, dir)
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("ab/"), "61622f");
        assert_eq!(encode_key(""), "");
    }

    #[tokio::test]
    async fn test_round_trip_and_missing_key() {
        let (store, _dir) = store();
        assert_eq!(store.get("doc").await.unwrap(), None);

        store.put("doc", &json!({"a": 1, "b": 2})).await.unwrap();
        assert_eq!(store.get("doc").await.unwrap(), Some(json!({"a": 1, "b": 2})));
        assert!(store.store_dir().ends_with("web-editor/web-projects"));
    }

    #[tokio::test]
    async fn test_connections_closed_after_each_call() {
        let (store, _dir) = store();
        store.put("doc", &json!(1)).await.unwrap();
        store.get("doc").await.unwrap();
        store.get("other").await.unwrap();
        assert_eq!(store.open_connections(), 0);
        assert_eq!(store.opened_total(), 3);
    }

    #[tokio::test]
    async fn test_records_survive_a_new_instance() {
        let (store, dir) = store();
        store.put("project", &json!({"pages": []})).await.unwrap();

        let reopened = LocalFsKvStore::new(dir.path(), "web-editor", "web-projects");
        assert_eq!(
            reopened.get("project").await.unwrap(),
            Some(json!({"pages": []}))
        );
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported() {
        let (store, _dir) = store();
        store.put("doc", &json!(1)).await.unwrap();
        let path = store.store_dir().join(format!("{}.json", encode_key("doc")));
        std::fs::write(&path, b"{not json").unwrap();

        let err = store.get("doc").await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { ref key, .. } if key == "doc"));
    }

    fn temp_files(store: &LocalFsKvStore) -> usize {
        std::fs::read_dir(store.store_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let (store, _dir) = store();
        store.put("other", &json!(0)).await.unwrap();
        // A non-empty directory where the record file belongs blocks the rename.
        let blocked = store.store_dir().join(format!("{}.json", encode_key("doc")));
        std::fs::create_dir_all(blocked.join("occupied")).unwrap();

        assert!(store.put("doc", &json!({"a": 1})).await.is_err());
        assert_eq!(temp_files(&store), 0);
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_puts_leave_one_complete_record() {
        let (store, _dir) = store();
        let values: Vec<serde_json::Value> = (0..8).map(|i| json!({ "version": i })).collect();
        let writes = values.iter().map(|v| store.put("doc", v));
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }

        let stored = store.get("doc").await.unwrap().unwrap();
        assert!(values.contains(&stored));
        assert_eq!(temp_files(&store), 0);
    }
}
