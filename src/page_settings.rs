//! Page settings form model
//!
//! Flattens a page's `name`, `slug` and its `custom` bag (SEO title,
//! description and keywords, extra head/body markup) into one struct, and
//! writes an edited struct back. Older pages keep SEO fields under
//! `custom.tdk.{title,description,keywords}` and markup under
//! `custom.head` / `custom.body`; those are read as fallbacks. Writes always
//! use the flat `custom` keys and keep unrelated `custom` entries.

use crate::engine::Model;
use crate::projection::{Projection, Resource};
use crate::reactive::Attributes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSettings {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub tdk_title: String,
    pub tdk_description: String,
    pub tdk_keywords: String,
    pub custom_head: String,
    pub custom_body: String,
}

fn text(map: &Attributes, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn first_text(candidates: &[Option<String>]) -> String {
    candidates.iter().flatten().next().cloned().unwrap_or_default()
}

impl PageSettings {
    /// Read settings from a page's attribute map.
    pub fn from_attributes(attributes: &Attributes) -> Self {
        let custom = attributes
            .get("custom")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let tdk = custom
            .get("tdk")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        PageSettings {
            id: first_text(&[text(attributes, "id")]),
            name: first_text(&[text(attributes, "name")]),
            slug: first_text(&[text(attributes, "slug"), text(&custom, "slug")]),
            tdk_title: first_text(&[text(&custom, "tdkTitle"), text(&tdk, "title")]),
            tdk_description: first_text(&[
                text(&custom, "tdkDescription"),
                text(&tdk, "description"),
            ]),
            tdk_keywords: first_text(&[text(&custom, "tdkKeywords"), text(&tdk, "keywords")]),
            custom_head: first_text(&[text(&custom, "customHead"), text(&custom, "head")]),
            custom_body: first_text(&[text(&custom, "customBody"), text(&custom, "body")]),
        }
    }

    /// Read from a live model or a plain object; anything else yields
    /// empty settings.
    pub fn read(resource: &Resource) -> Self {
        match resource {
            Resource::Model(model) => Self::from_attributes(&model.attributes()),
            Resource::Plain(Value::Object(map)) => Self::from_attributes(map),
            Resource::Plain(_) => Self::default(),
        }
    }

    pub fn from_projection(projection: &Projection) -> Self {
        match projection.to_value() {
            Value::Object(map) => Self::from_attributes(&map),
            _ => Self::default(),
        }
    }

    /// The page's `custom` bag with these settings merged over it.
    fn merged_custom(&self, current: Option<&Value>) -> Value {
        let mut custom = current
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let entries = [
            ("slug", &self.slug),
            ("tdkTitle", &self.tdk_title),
            ("tdkDescription", &self.tdk_description),
            ("tdkKeywords", &self.tdk_keywords),
            ("customHead", &self.custom_head),
            ("customBody", &self.custom_body),
        ];
        for (key, value) in entries {
            custom.insert(key.to_string(), Value::String(value.clone()));
        }
        Value::Object(custom)
    }

    /// Write through the model's setter: `name`, `slug`, then the merged
    /// `custom` bag.
    pub fn apply_to_model(&self, model: &dyn Model) {
        let custom = self.merged_custom(model.get("custom").as_ref());
        model.set("name", Value::String(self.name.clone()));
        model.set("slug", Value::String(self.slug.clone()));
        model.set("custom", custom);
    }

    /// Write into a plain page object. Values without a `name` field are not
    /// pages and are left alone; returns whether anything was written.
    pub fn apply_to_value(&self, page: &mut Value) -> bool {
        let Some(map) = page.as_object_mut() else {
            return false;
        };
        if !map.contains_key("name") {
            return false;
        }
        let custom = self.merged_custom(map.get("custom"));
        map.insert("name".into(), Value::String(self.name.clone()));
        map.insert("slug".into(), Value::String(self.slug.clone()));
        map.insert("custom".into(), custom);
        true
    }

    pub fn apply(&self, resource: &mut Resource) -> bool {
        match resource {
            Resource::Model(model) => {
                self.apply_to_model(model.as_ref());
                true
            }
            Resource::Plain(value) => self.apply_to_value(value),
        }
    }
}
