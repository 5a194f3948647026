//! Key-Value Store Adapter
//!
//! Durable async get/put of whole JSON records keyed by string. Stores never
//! merge: `put` replaces the record, `get` returns it whole. Concurrent puts to
//! one key are last-write-wins by completion order; callers that need a single
//! writer serialize above this layer.
//!
//! Implementations:
//! - `InMemoryKvStore`: for unit tests and DST
//! - `LocalFsKvStore`: one JSON file per key, connection scoped to each call
//! - `SimulatedKvStore`: wraps another store and injects faults

mod local_fs;
mod simulated;

pub use local_fs::LocalFsKvStore;
pub use simulated::{SimulatedKvConfig, SimulatedKvStats, SimulatedKvStore};

use crate::config::{KvBackend, KvStoreConfig};
use crate::engine::StorageFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub trait KvStore: Send + Sync + 'static {
    /// Fetch the record under `key`. A key never written is `Ok(None)`.
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<Value>>;

    /// Replace the record under `key`.
    fn put<'a>(&'a self, key: &'a str, value: &'a Value) -> StorageFuture<'a, ()>;
}

/// Build the store described by `config`.
pub fn open_store(config: &KvStoreConfig) -> Arc<dyn KvStore> {
    match config.backend {
        KvBackend::Memory => Arc::new(InMemoryKvStore::new()),
        KvBackend::LocalFs => Arc::new(LocalFsKvStore::from_config(config)),
    }
}

// ============================================================================
// InMemoryKvStore - For tests and DST
// ============================================================================

/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKvStore {
    records: Arc<RwLock<HashMap<String, Value>>>,
    puts: Arc<AtomicU64>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Synchronous read, for assertions
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.records.read().get(key).cloned()
    }

    /// Completed puts since creation
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::Acquire)
    }
}

impl KvStore for InMemoryKvStore {
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<Value>> {
        Box::pin(async move { Ok(self.records.read().get(key).cloned()) })
    }

    fn put<'a>(&'a self, key: &'a str, value: &'a Value) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            self.records.write().insert(key.to_string(), value.clone());
            self.puts.fetch_add(1, Ordering::AcqRel);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_then_get_returns_whole_record() {
        let store = InMemoryKvStore::new();
        store.put("doc", &json!({"a": 1, "b": 2})).await.unwrap();
        assert_eq!(store.get("doc").await.unwrap(), Some(json!({"a": 1, "b": 2})));
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.get("never-written").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_replaces_instead_of_merging() {
        let store = InMemoryKvStore::new();
        store.put("doc", &json!({"a": 1, "b": 2})).await.unwrap();
        store.put("doc", &json!({"c": 3})).await.unwrap();
        assert_eq!(store.snapshot("doc"), Some(json!({"c": 3})));
        assert_eq!(store.put_count(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = InMemoryKvStore::new();
        let view = store.clone();
        store.put("k", &json!(true)).await.unwrap();
        assert_eq!(view.snapshot("k"), Some(json!(true)));
        assert_eq!(view.len(), 1);
    }

    #[tokio::test]
    async fn test_open_store_memory_backend() {
        let store = open_store(&KvStoreConfig::projects());
        store.put("doc", &json!([1, 2])).await.unwrap();
        assert_eq!(store.get("doc").await.unwrap(), Some(json!([1, 2])));
    }
}
