//! Observation layer consumed by the UI
//!
//! [`Observable`] holds one value and notifies watchers on every write.
//! [`ReactiveRecord`] holds a field map and notifies per field, so a binding
//! on `name` is not invalidated by a change to `slug`.

use crate::events::{Emitter, SubscriptionId};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type Attributes = Map<String, Value>;

// ============================================================================
// Observable
// ============================================================================

/// A single observable value with a write version counter.
pub struct Observable<T> {
    value: RwLock<T>,
    version: AtomicU64,
    watchers: Emitter<T>,
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Observable {
            value: RwLock::new(value),
            version: AtomicU64::new(0),
            watchers: Emitter::new(),
        }
    }

    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.read())
    }

    /// Replace the value and notify watchers with the new value.
    pub fn set(&self, value: T) {
        let snapshot = value.clone();
        *self.value.write() = value;
        self.version.fetch_add(1, Ordering::AcqRel);
        self.watchers.emit(&snapshot);
    }

    /// Mutate in place and notify watchers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let snapshot = {
            let mut guard = self.value.write();
            f(&mut guard);
            guard.clone()
        };
        self.version.fetch_add(1, Ordering::AcqRel);
        self.watchers.emit(&snapshot);
    }

    /// Replace the value and return the previous one.
    pub fn replace(&self, value: T) -> T {
        let snapshot = value.clone();
        let previous = std::mem::replace(&mut *self.value.write(), value);
        self.version.fetch_add(1, Ordering::AcqRel);
        self.watchers.emit(&snapshot);
        previous
    }

    /// Number of writes since creation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn watch<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.watchers.subscribe(f)
    }

    pub fn unwatch(&self, id: SubscriptionId) -> bool {
        self.watchers.unsubscribe(id)
    }
}

impl<T: Clone + Default + Send + Sync + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.value.read())
            .field("version", &self.version.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// ReactiveRecord
// ============================================================================

/// Field-level change delivered to record watchers. `value` is `None` when
/// the field was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub key: String,
    pub value: Option<Value>,
}

/// An observable attribute map with per-field notification.
pub struct ReactiveRecord {
    fields: RwLock<Attributes>,
    version: AtomicU64,
    watchers: Emitter<FieldChange>,
    field_watchers: Mutex<HashMap<String, Arc<Emitter<Option<Value>>>>>,
}

impl ReactiveRecord {
    pub fn new(fields: Attributes) -> Self {
        ReactiveRecord {
            fields: RwLock::new(fields),
            version: AtomicU64::new(0),
            watchers: Emitter::new(),
            field_watchers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.fields.read().get(key).cloned()
    }

    pub fn snapshot(&self) -> Attributes {
        self.fields.read().clone()
    }

    pub fn len(&self) -> usize {
        self.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.read().is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Write one field. Returns false (and notifies nobody) when the stored
    /// value is already equal.
    pub fn apply(&self, key: &str, value: Option<Value>) -> bool {
        {
            let mut fields = self.fields.write();
            match &value {
                Some(v) => {
                    if fields.get(key) == Some(v) {
                        return false;
                    }
                    fields.insert(key.to_string(), v.clone());
                }
                None => {
                    if fields.remove(key).is_none() {
                        return false;
                    }
                }
            }
        }
        self.version.fetch_add(1, Ordering::AcqRel);

        let field_emitter = self.field_watchers.lock().get(key).cloned();
        if let Some(emitter) = field_emitter {
            emitter.emit(&value);
        }
        self.watchers.emit(&FieldChange {
            key: key.to_string(),
            value,
        });
        true
    }

    /// Apply every differing field of `attributes`; fields absent from it are removed.
    pub fn merge_snapshot(&self, attributes: &Attributes) -> usize {
        let stale: Vec<String> = self
            .fields
            .read()
            .keys()
            .filter(|k| !attributes.contains_key(*k))
            .cloned()
            .collect();
        let mut changed = 0;
        for key in stale {
            changed += usize::from(self.apply(&key, None));
        }
        for (key, value) in attributes {
            changed += usize::from(self.apply(key, Some(value.clone())));
        }
        changed
    }

    /// Watch every field change.
    pub fn watch<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&FieldChange) + Send + Sync + 'static,
    {
        self.watchers.subscribe(f)
    }

    /// Watch a single field.
    pub fn watch_field<F>(&self, key: &str, f: F) -> SubscriptionId
    where
        F: Fn(&Option<Value>) + Send + Sync + 'static,
    {
        self.field_watchers
            .lock()
            .entry(key.to_string())
            .or_default()
            .subscribe(f)
    }

    pub fn unwatch(&self, id: SubscriptionId) -> bool {
        if self.watchers.unsubscribe(id) {
            return true;
        }
        self.field_watchers
            .lock()
            .values()
            .any(|emitter| emitter.unsubscribe(id))
    }
}

impl fmt::Debug for ReactiveRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveRecord")
            .field("fields", &*self.fields.read())
            .field("version", &self.version())
            .finish()
    }
}
