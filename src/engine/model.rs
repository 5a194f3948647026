//! Engine-owned models

use crate::events::{Emitter, SubscriptionId};
use crate::reactive::Attributes;
use parking_lot::{ReentrantMutex, RwLock};
use serde_json::Value;
use std::fmt;

/// One attribute change on a model. `value` is `None` when the attribute was unset.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    pub model_id: String,
    pub key: String,
    pub value: Option<Value>,
}

pub type ModelListener = Box<dyn Fn(&AttributeChange) + Send + Sync>;

/// A named attribute bag owned by the engine.
///
/// `set`/`unset` are the only legal mutation paths. Implementations emit one
/// [`AttributeChange`] per attribute that actually changed.
pub trait Model: Send + Sync {
    fn id(&self) -> String;

    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value);

    fn unset(&self, key: &str);

    fn attributes(&self) -> Attributes;

    fn subscribe(&self, listener: ModelListener) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    fn subscriber_count(&self) -> usize;
}

/// Plain in-process [`Model`].
///
/// Mutations from different threads are serialized together with their
/// change notification, so listeners see changes in the order they were
/// applied. Listeners may call back into the same model.
pub struct AttributeModel {
    id: String,
    attributes: RwLock<Attributes>,
    changes: Emitter<AttributeChange>,
    ordering: ReentrantMutex<()>,
}

impl AttributeModel {
    /// The `id` attribute is always present and equal to `id`.
    pub fn new(id: impl Into<String>, mut attributes: Attributes) -> Self {
        let id = id.into();
        attributes.insert("id".to_string(), Value::String(id.clone()));
        AttributeModel {
            id,
            attributes: RwLock::new(attributes),
            changes: Emitter::new(),
            ordering: ReentrantMutex::new(()),
        }
    }

    pub fn set_many(&self, attributes: Attributes) {
        for (key, value) in attributes {
            self.set(&key, value);
        }
    }
}

impl Model for AttributeModel {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.attributes.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        let _order = self.ordering.lock();
        {
            let mut attributes = self.attributes.write();
            if attributes.get(key) == Some(&value) {
                return;
            }
            attributes.insert(key.to_string(), value.clone());
        }
        self.changes.emit(&AttributeChange {
            model_id: self.id.clone(),
            key: key.to_string(),
            value: Some(value),
        });
    }

    fn unset(&self, key: &str) {
        let _order = self.ordering.lock();
        if self.attributes.write().remove(key).is_none() {
            return;
        }
        self.changes.emit(&AttributeChange {
            model_id: self.id.clone(),
            key: key.to_string(),
            value: None,
        });
    }

    fn attributes(&self) -> Attributes {
        self.attributes.read().clone()
    }

    fn subscribe(&self, listener: ModelListener) -> SubscriptionId {
        self.changes.subscribe(move |change| listener(change))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.changes.unsubscribe(id)
    }

    fn subscriber_count(&self) -> usize {
        self.changes.len()
    }
}

impl fmt::Debug for AttributeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeModel")
            .field("id", &self.id)
            .field("attributes", &*self.attributes.read())
            .finish()
    }
}
