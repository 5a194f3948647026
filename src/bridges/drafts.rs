//! Draft payloads, kept apart from the project record in their own store.

use crate::config::BridgeConfig;
use crate::error::StorageResult;
use crate::kv::{open_store, KvStore};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct DraftStore {
    store: Arc<dyn KvStore>,
}

impl DraftStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        DraftStore { store }
    }

    /// Open the drafts database named in `config`, on the project backend.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(open_store(&config.drafts_store()))
    }

    /// Replace the draft under `key`.
    pub async fn save_draft(&self, key: &str, draft: &Value) -> StorageResult<()> {
        self.store.put(key, draft).await?;
        debug!(key, "draft saved");
        Ok(())
    }

    pub async fn load_draft(&self, key: &str) -> StorageResult<Option<Value>> {
        self.store.get(key).await
    }
}

impl fmt::Debug for DraftStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DraftStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KvStoreConfig;
    use crate::kv::{InMemoryKvStore, LocalFsKvStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_save_then_load_draft() {
        let backing = InMemoryKvStore::new();
        let drafts = DraftStore::new(Arc::new(backing.clone()));

        drafts.save_draft("project", &json!({"pages": []})).await.unwrap();
        assert_eq!(backing.put_count(), 1);
        assert_eq!(
            drafts.load_draft("project").await.unwrap(),
            Some(json!({"pages": []}))
        );
        assert_eq!(drafts.load_draft("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_drafts_use_their_own_directory_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig {
            storage: KvStoreConfig::local_fs(dir.path()),
            ..Default::default()
        };
        let drafts = DraftStore::from_config(&config);
        drafts.save_draft("d1", &json!({"v": 1})).await.unwrap();

        let projects = LocalFsKvStore::from_config(&config.storage);
        assert_eq!(projects.get("d1").await.unwrap(), None);
        let on_disk = LocalFsKvStore::from_config(&config.drafts_store());
        assert_eq!(on_disk.get("d1").await.unwrap(), Some(json!({"v": 1})));
    }
}
