use super::{reactive_model, ModelMirror, Projection};
use crate::engine::Collection;
use serde_json::Value;
use std::sync::Arc;

/// Eager snapshot of a collection's members, each a live [`Projection`].
///
/// Member order and count are fixed at construction; the owning bridge
/// rebuilds the mirror when the collection changes and decouples the old one.
#[derive(Debug, Default)]
pub struct CollectionMirror {
    items: Vec<Projection>,
}

impl CollectionMirror {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Projection> {
        self.items.get(index)
    }

    pub fn find(&self, id: &str) -> Option<&Projection> {
        self.items
            .iter()
            .find(|item| item.id().as_deref() == Some(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Projection> {
        self.items.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.items.iter().filter_map(Projection::id).collect()
    }

    pub fn mirrors(&self) -> impl Iterator<Item = &Arc<ModelMirror>> {
        self.items.iter().filter_map(Projection::as_live)
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.items.iter().map(Projection::to_value).collect())
    }

    /// Decouple every member. Returns how many were still coupled.
    pub fn decouple_all(&self) -> usize {
        self.items.iter().filter(|item| item.decouple()).count()
    }
}

/// Project every current member of `collection`, in order.
pub fn reactive_collection(collection: &dyn Collection) -> CollectionMirror {
    CollectionMirror {
        items: collection
            .models()
            .into_iter()
            .map(|model| reactive_model(model))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AttributeModel, Model, ModelCollection};
    use crate::reactive::Attributes;
    use serde_json::json;

    fn page(id: &str) -> Arc<dyn Model> {
        Arc::new(AttributeModel::new(id, Attributes::new()))
    }

    #[test]
    fn test_snapshot_preserves_order() {
        let collection = ModelCollection::new();
        collection.add(page("a"), None);
        collection.add(page("b"), None);
        collection.add(page("c"), Some(1));

        let mirror = reactive_collection(&collection);
        assert_eq!(mirror.ids(), vec!["a", "c", "b"]);
        assert_eq!(mirror.mirrors().count(), 3);
    }

    #[test]
    fn test_rebuild_after_structural_change() {
        let collection = ModelCollection::new();
        let a = page("a");
        collection.add(a.clone(), None);
        collection.add(page("b"), None);

        let old = reactive_collection(&collection);
        collection.remove("b");
        collection.add(page("d"), Some(0));
        let new = reactive_collection(&collection);
        assert_eq!(old.decouple_all(), 2);

        assert_eq!(new.ids(), vec!["d", "a"]);
        a.set("name", json!("A"));
        assert_eq!(new.find("a").and_then(|p| p.get("name")), Some(json!("A")));
        assert_eq!(old.find("a").and_then(|p| p.get("name")), None);
        assert_eq!(a.subscriber_count(), 1);
    }
}
