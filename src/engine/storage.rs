//! Storage provider contract and the engine's provider registry

use crate::error::StorageError;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Top-level project state as exchanged with storage providers.
pub type ProjectData = Map<String, Value>;

pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Pluggable persistence backend the engine calls from `load`/`store`.
///
/// Exactly one outcome per call: the filtered subset (load), unit (store),
/// or a single error. Failures never panic.
pub trait StorageProvider: Send + Sync {
    /// Return the subset of `keys` present (and non-null) in the stored record.
    fn load<'a>(&'a self, keys: &'a [String]) -> StorageFuture<'a, ProjectData>;

    /// Overwrite the stored record with `data`.
    fn store<'a>(&'a self, data: &'a ProjectData) -> StorageFuture<'a, ()>;
}

/// Named providers plus the active selection.
#[derive(Default)]
pub struct StorageManager {
    providers: RwLock<HashMap<String, Arc<dyn StorageProvider>>>,
    current: RwLock<Option<String>>,
    registrations: AtomicU64,
}

impl StorageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under `name`. Re-registering a name replaces the previous
    /// provider; returns true when it did.
    pub fn add(&self, name: &str, provider: Arc<dyn StorageProvider>) -> bool {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .providers
            .write()
            .insert(name.to_string(), provider)
            .is_some();
        debug!(provider = name, replaced, "storage provider registered");
        replaced
    }

    pub fn set_current(&self, name: &str) -> Result<(), StorageError> {
        if !self.providers.read().contains_key(name) {
            return Err(StorageError::UnknownProvider(name.to_string()));
        }
        *self.current.write() = Some(name.to_string());
        Ok(())
    }

    pub fn current_name(&self) -> Option<String> {
        self.current.read().clone()
    }

    pub fn current(&self) -> Result<Arc<dyn StorageProvider>, StorageError> {
        let name = self
            .current
            .read()
            .clone()
            .ok_or(StorageError::NoActiveProvider)?;
        self.providers
            .read()
            .get(&name)
            .cloned()
            .ok_or(StorageError::UnknownProvider(name))
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Total `add` calls, including replacements.
    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageManager")
            .field("providers", &self.provider_names())
            .field("current", &self.current_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullProvider;

    impl StorageProvider for NullProvider {
        fn load<'a>(&'a self, _keys: &'a [String]) -> StorageFuture<'a, ProjectData> {
            Box::pin(async { Ok(ProjectData::new()) })
        }

        fn store<'a>(&'a self, _data: &'a ProjectData) -> StorageFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn test_set_current_requires_registration() {
        let manager = StorageManager::new();
        assert!(matches!(
            manager.set_current("kv"),
            Err(StorageError::UnknownProvider(_))
        ));
        assert!(matches!(manager.current(), Err(StorageError::NoActiveProvider)));

        assert!(!manager.add("kv", Arc::new(NullProvider)));
        manager.set_current("kv").unwrap();
        assert_eq!(manager.current_name().as_deref(), Some("kv"));
        assert!(manager.current().is_ok());
    }

    #[test]
    fn test_re_adding_a_name_replaces() {
        let manager = StorageManager::new();
        manager.add("kv", Arc::new(NullProvider));
        assert!(manager.add("kv", Arc::new(NullProvider)));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.registrations(), 2);
    }
}
