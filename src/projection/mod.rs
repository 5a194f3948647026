//! Reactive projections of engine models and collections
//!
//! A [`Projection`] is either a live mirror of a [`Model`] or a plain value
//! that was not a model. Live mirrors subscribe to attribute changes and apply
//! only the changed field; [`ModelMirror::decouple`] removes the subscription
//! exactly once. Dropping a mirror decouples it.

mod collection;

pub use collection::{reactive_collection, CollectionMirror};

use crate::engine::Model;
use crate::events::SubscriptionId;
use crate::reactive::{Attributes, ReactiveRecord};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Input to [`reactive_model`]: something that is a live model, or is not.
#[derive(Clone)]
pub enum Resource {
    Model(Arc<dyn Model>),
    Plain(Value),
}

impl Resource {
    /// A missing model becomes an empty plain object.
    pub fn from_option(model: Option<Arc<dyn Model>>) -> Self {
        match model {
            Some(model) => Resource::Model(model),
            None => Resource::Plain(Value::Object(Attributes::new())),
        }
    }
}

impl From<Arc<dyn Model>> for Resource {
    fn from(model: Arc<dyn Model>) -> Self {
        Resource::Model(model)
    }
}

impl From<Value> for Resource {
    fn from(value: Value) -> Self {
        Resource::Plain(value)
    }
}

/// Live mirror of one model.
pub struct ModelMirror {
    source: Arc<dyn Model>,
    record: Arc<ReactiveRecord>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl ModelMirror {
    fn attach(source: Arc<dyn Model>) -> Arc<Self> {
        let record = Arc::new(ReactiveRecord::new(Attributes::new()));
        let sink = record.clone();
        let subscription = source.subscribe(Box::new(move |change| {
            sink.apply(&change.key, change.value.clone());
        }));
        record.merge_snapshot(&source.attributes());
        trace!(model = %source.id(), %subscription, "model mirror attached");

        Arc::new(ModelMirror {
            source,
            record,
            subscription: Mutex::new(Some(subscription)),
        })
    }

    pub fn id(&self) -> String {
        self.source.id()
    }

    pub fn record(&self) -> &Arc<ReactiveRecord> {
        &self.record
    }

    pub fn source(&self) -> &Arc<dyn Model> {
        &self.source
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.record.get(key)
    }

    pub fn snapshot(&self) -> Attributes {
        self.record.snapshot()
    }

    /// Write through the model's own setter; the mirror updates from the
    /// resulting change notification.
    pub fn set(&self, key: &str, value: Value) {
        self.source.set(key, value);
    }

    pub fn is_coupled(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Stop mirroring. Returns false when already decoupled.
    pub fn decouple(&self) -> bool {
        let Some(subscription) = self.subscription.lock().take() else {
            return false;
        };
        self.source.unsubscribe(subscription);
        trace!(model = %self.source.id(), %subscription, "model mirror decoupled");
        true
    }
}

impl Drop for ModelMirror {
    fn drop(&mut self) {
        self.decouple();
    }
}

impl fmt::Debug for ModelMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelMirror")
            .field("id", &self.source.id())
            .field("fields", &self.record.snapshot())
            .field("coupled", &self.is_coupled())
            .finish()
    }
}

/// Observable view of a model, or the unchanged non-model value.
#[derive(Clone)]
pub enum Projection {
    Live(Arc<ModelMirror>),
    Plain(Value),
}

impl Projection {
    pub fn is_live(&self) -> bool {
        matches!(self, Projection::Live(_))
    }

    /// The detach capability; absent for plain values.
    pub fn as_live(&self) -> Option<&Arc<ModelMirror>> {
        match self {
            Projection::Live(mirror) => Some(mirror),
            Projection::Plain(_) => None,
        }
    }

    pub fn id(&self) -> Option<String> {
        match self {
            Projection::Live(mirror) => Some(mirror.id()),
            Projection::Plain(value) => value.get("id").and_then(Value::as_str).map(String::from),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Projection::Live(mirror) => mirror.get(key),
            Projection::Plain(value) => value.get(key).cloned(),
        }
    }

    /// Current fields as a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Projection::Live(mirror) => Value::Object(mirror.snapshot()),
            Projection::Plain(value) => value.clone(),
        }
    }

    /// Decouple a live mirror. Plain values have nothing to detach and
    /// return false.
    pub fn decouple(&self) -> bool {
        self.as_live().is_some_and(|mirror| mirror.decouple())
    }
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Plain(Value::Object(Attributes::new()))
    }
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projection::Live(mirror) => f.debug_tuple("Live").field(mirror).finish(),
            Projection::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
        }
    }
}

/// Mirror a live model; non-model input comes back unchanged.
pub fn reactive_model(resource: impl Into<Resource>) -> Projection {
    match resource.into() {
        Resource::Model(model) => Projection::Live(ModelMirror::attach(model)),
        Resource::Plain(value) => Projection::Plain(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AttributeModel;
    use serde_json::json;

    fn model(id: &str, attrs: Value) -> Arc<dyn Model> {
        Arc::new(AttributeModel::new(
            id,
            attrs.as_object().cloned().unwrap_or_default(),
        ))
    }

    #[test]
    fn test_mirror_tracks_every_mutation() {
        let source = model("p1", json!({"name": "Home"}));
        let projection = reactive_model(source.clone());

        source.set("name", json!("Landing"));
        source.set("slug", json!("landing"));
        source.unset("slug");
        source.set("custom", json!({"head": "<meta>"}));

        assert_eq!(projection.to_value(), Value::Object(source.attributes()));
    }

    #[test]
    fn test_decouple_stops_updates_and_is_idempotent() {
        let source = model("p1", json!({"name": "Home"}));
        let projection = reactive_model(source.clone());
        assert_eq!(source.subscriber_count(), 1);

        assert!(projection.decouple());
        assert!(!projection.decouple());
        assert_eq!(source.subscriber_count(), 0);

        source.set("name", json!("Changed"));
        assert_eq!(projection.get("name"), Some(json!("Home")));
    }

    #[test]
    fn test_set_forwards_through_model_setter() {
        let source = model("p1", json!({}));
        let projection = reactive_model(source.clone());
        let mirror = projection.as_live().unwrap();

        mirror.set("name", json!("About"));
        assert_eq!(source.get("name"), Some(json!("About")));
        assert_eq!(mirror.get("name"), Some(json!("About")));
    }

    #[test]
    fn test_plain_value_passes_through_without_detach() {
        let projection = reactive_model(json!({"id": "x", "name": "raw"}));
        assert!(!projection.is_live());
        assert!(projection.as_live().is_none());
        assert!(!projection.decouple());
        assert_eq!(projection.id().as_deref(), Some("x"));
        assert_eq!(projection.to_value(), json!({"id": "x", "name": "raw"}));
    }

    #[test]
    fn test_dropping_last_handle_decouples() {
        let source = model("p1", json!({}));
        let projection = reactive_model(source.clone());
        let clone = projection.clone();
        drop(projection);
        assert_eq!(source.subscriber_count(), 1);
        drop(clone);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn test_only_changed_field_is_notified() {
        let source = model("p1", json!({"name": "Home", "slug": "index"}));
        let projection = reactive_model(source.clone());
        let record = projection.as_live().unwrap().record().clone();
        let before = record.version();

        source.set("slug", json!("home"));
        assert_eq!(record.version(), before + 1);
        assert_eq!(record.get("name"), Some(json!("Home")));
    }
}
