//! Engine-owned ordered collections of models

use super::model::Model;
use crate::events::{Emitter, SubscriptionId};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Structural change notification. Consumers re-read the whole member list;
/// the variant is informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange {
    Added { id: String, index: usize },
    Removed { id: String, index: usize },
    Reset { len: usize },
}

pub type CollectionListener = Box<dyn Fn(&CollectionChange) + Send + Sync>;

pub trait Collection: Send + Sync {
    fn models(&self) -> Vec<Arc<dyn Model>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, id: &str) -> Option<Arc<dyn Model>>;

    fn subscribe(&self, listener: CollectionListener) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

#[derive(Default)]
pub struct ModelCollection {
    models: RwLock<Vec<Arc<dyn Model>>>,
    changes: Emitter<CollectionChange>,
}

impl ModelCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append, or insert at `index` when given. Returns the final position.
    pub fn add(&self, model: Arc<dyn Model>, index: Option<usize>) -> usize {
        let id = model.id();
        let position = {
            let mut models = self.models.write();
            let position = index.unwrap_or(models.len()).min(models.len());
            models.insert(position, model);
            position
        };
        self.changes.emit(&CollectionChange::Added {
            id,
            index: position,
        });
        position
    }

    pub fn remove(&self, id: &str) -> Option<Arc<dyn Model>> {
        let (removed, index) = {
            let mut models = self.models.write();
            let index = models.iter().position(|m| m.id() == id)?;
            (models.remove(index), index)
        };
        self.changes.emit(&CollectionChange::Removed {
            id: id.to_string(),
            index,
        });
        Some(removed)
    }

    pub fn reset(&self, models: Vec<Arc<dyn Model>>) {
        let len = models.len();
        *self.models.write() = models;
        self.changes.emit(&CollectionChange::Reset { len });
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.models.read().iter().position(|m| m.id() == id)
    }

    pub fn first(&self) -> Option<Arc<dyn Model>> {
        self.models.read().first().cloned()
    }
}

impl Collection for ModelCollection {
    fn models(&self) -> Vec<Arc<dyn Model>> {
        self.models.read().clone()
    }

    fn len(&self) -> usize {
        self.models.read().len()
    }

    fn get(&self, id: &str) -> Option<Arc<dyn Model>> {
        self.models.read().iter().find(|m| m.id() == id).cloned()
    }

    fn subscribe(&self, listener: CollectionListener) -> SubscriptionId {
        self.changes.subscribe(move |change| listener(change))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.changes.unsubscribe(id)
    }
}

impl fmt::Debug for ModelCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.models.read().iter().map(|m| m.id()).collect();
        f.debug_struct("ModelCollection").field("ids", &ids).finish()
    }
}
