//! In-process editor engine
//!
//! `MemoryEditor` keeps pages, per-page component trees, global css/js,
//! assets and modal state in memory, emits the same domain events a real
//! engine emits, and persists through whatever [`StorageProvider`] is active.
//! Used by the demo binary, the integration tests and the DST harness.

use super::{
    Collection, ComponentNode, Editor, EngineConfig, EngineFuture, ModalProps, Model,
    ModelCollection, ProjectData, StorageManager,
};
use super::model::AttributeModel;
use crate::error::{EngineError, StorageError};
use crate::events::{EngineEvent, EventBus, EventPayload, SubscriptionId};
use crate::reactive::Attributes;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Top-level keys the engine requests on load.
pub const PROJECT_KEYS: [&str; 5] = ["pages", "styles", "scripts", "assets", "selectedPage"];

const DEFAULT_PAGE_ID: &str = "home";

pub struct MemoryEditor {
    this: Weak<MemoryEditor>,
    config: EngineConfig,
    events: EventBus,
    storage: StorageManager,
    pages: Arc<ModelCollection>,
    page_listeners: Mutex<HashMap<String, SubscriptionId>>,
    selected: RwLock<Option<String>>,
    components: RwLock<HashMap<String, ComponentNode>>,
    css: RwLock<String>,
    js: RwLock<String>,
    assets: RwLock<Vec<String>>,
    modal: RwLock<ModalProps>,
    next_page: AtomicU64,
}

impl MemoryEditor {
    pub fn new() -> Arc<Self> {
        Self::from_config(&EngineConfig::default())
    }

    /// A fresh engine with one selected page, `home`.
    pub fn from_config(config: &EngineConfig) -> Arc<Self> {
        let editor = Arc::new_cyclic(|this| MemoryEditor {
            this: this.clone(),
            config: config.clone(),
            events: EventBus::new(),
            storage: StorageManager::new(),
            pages: Arc::new(ModelCollection::new()),
            page_listeners: Mutex::new(HashMap::new()),
            selected: RwLock::new(None),
            components: RwLock::new(HashMap::new()),
            css: RwLock::new(String::new()),
            js: RwLock::new(String::new()),
            assets: RwLock::new(Vec::new()),
            modal: RwLock::new(ModalProps::default()),
            next_page: AtomicU64::new(1),
        });

        let mut attributes = Attributes::new();
        attributes.insert("name".into(), Value::String("Home".into()));
        attributes.insert("slug".into(), Value::String("index".into()));
        let home = editor.track_page(DEFAULT_PAGE_ID, attributes);
        editor.pages.add(home, None);
        editor
            .components
            .write()
            .insert(DEFAULT_PAGE_ID.to_string(), ComponentNode::element("body"));
        *editor.selected.write() = Some(DEFAULT_PAGE_ID.to_string());
        editor
    }

    /// [`from_config`](Self::from_config) as a trait object, for
    /// [`EngineHandle::initialize`](super::EngineHandle::initialize).
    pub fn build(config: &EngineConfig) -> Arc<dyn Editor> {
        Self::from_config(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn modal(&self) -> ModalProps {
        self.modal.read().clone()
    }

    pub fn assets(&self) -> Vec<String> {
        self.assets.read().clone()
    }

    pub fn add_asset(&self, url: &str) {
        self.assets.write().push(url.to_string());
        self.events
            .emit(&EngineEvent::AssetUpdate, &EventPayload::Data(Value::String(url.into())));
        self.events.emit(&EngineEvent::Update, &EventPayload::None);
    }

    /// Replace a page's component tree.
    pub fn set_page_content(&self, page_id: &str, root: ComponentNode) -> Result<(), EngineError> {
        if self.pages.get(page_id).is_none() {
            return Err(EngineError::PageNotFound(page_id.to_string()));
        }
        self.components.write().insert(page_id.to_string(), root);
        self.emit_component_update(page_id);
        Ok(())
    }

    /// Snapshot of everything `store` persists.
    pub fn project_data(&self) -> ProjectData {
        let components = self.components.read();
        let pages: Vec<Value> = self
            .pages
            .models()
            .iter()
            .map(|page| {
                let mut attributes = page.attributes();
                if let Some(component) = components
                    .get(&page.id())
                    .and_then(|node| serde_json::to_value(node).ok())
                {
                    attributes.insert("component".into(), component);
                }
                Value::Object(attributes)
            })
            .collect();

        let mut data = ProjectData::new();
        data.insert("pages".into(), Value::Array(pages));
        data.insert("styles".into(), Value::String(self.css.read().clone()));
        data.insert("scripts".into(), Value::String(self.js.read().clone()));
        data.insert(
            "assets".into(),
            Value::Array(self.assets.read().iter().cloned().map(Value::String).collect()),
        );
        if let Some(selected) = self.selected.read().clone() {
            data.insert("selectedPage".into(), Value::String(selected));
        }
        data
    }

    /// Replace engine state with the keys present in `data`.
    pub fn apply_project_data(&self, data: &ProjectData) {
        if let Some(Value::Array(pages)) = data.get("pages") {
            let mut models: Vec<Arc<dyn Model>> = Vec::with_capacity(pages.len());
            let mut components = HashMap::new();
            for page in pages {
                let Some(attributes) = page.as_object() else {
                    warn!("skipping non-object page entry on load");
                    continue;
                };
                let mut attributes = attributes.clone();
                let component = attributes
                    .remove("component")
                    .and_then(|v| serde_json::from_value::<ComponentNode>(v).ok())
                    .unwrap_or_else(|| ComponentNode::element("body"));
                let id = match attributes.get("id").and_then(Value::as_str) {
                    Some(id) => id.to_string(),
                    None => self.generate_page_id(),
                };
                components.insert(id.clone(), component);
                models.push(self.track_page(&id, attributes));
            }

            let retained: Vec<String> = models.iter().map(|m| m.id()).collect();
            for old in self.pages.models() {
                if !retained.contains(&old.id()) {
                    self.untrack_page(old.as_ref());
                }
            }
            *self.components.write() = components;
            self.pages.reset(models);
        }

        if let Some(css) = data.get("styles").and_then(Value::as_str) {
            *self.css.write() = css.to_string();
        }
        if let Some(js) = data.get("scripts").and_then(Value::as_str) {
            *self.js.write() = js.to_string();
        }
        if let Some(Value::Array(assets)) = data.get("assets") {
            *self.assets.write() = assets
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }

        let requested = data.get("selectedPage").and_then(Value::as_str);
        let selected = match requested {
            Some(id) if self.pages.get(id).is_some() => Some(id.to_string()),
            _ => self.current_selection().or_else(|| self.pages.first().map(|p| p.id())),
        };
        *self.selected.write() = selected;
        self.events.emit(&EngineEvent::Page, &EventPayload::None);
    }

    fn current_selection(&self) -> Option<String> {
        let selected = self.selected.read().clone()?;
        self.pages.get(&selected).map(|_| selected)
    }

    fn generate_page_id(&self) -> String {
        loop {
            let id = format!("page-{}", self.next_page.fetch_add(1, Ordering::Relaxed));
            if self.pages.get(&id).is_none() {
                return id;
            }
        }
    }

    /// Build a page model whose attribute changes surface as `update`.
    fn track_page(&self, id: &str, attributes: Attributes) -> Arc<dyn Model> {
        let model = Arc::new(AttributeModel::new(id, attributes));
        let this = self.this.clone();
        let listener = model.subscribe(Box::new(move |change| {
            if let Some(editor) = this.upgrade() {
                editor
                    .events
                    .emit(&EngineEvent::Update, &EventPayload::Model(change.model_id.clone()));
            }
        }));
        if let Some(previous) = self.page_listeners.lock().insert(id.to_string(), listener) {
            if let Some(old) = self.pages.get(id) {
                old.unsubscribe(previous);
            }
        }
        model
    }

    fn untrack_page(&self, page: &dyn Model) {
        if let Some(listener) = self.page_listeners.lock().remove(&page.id()) {
            page.unsubscribe(listener);
        }
    }

    fn resolve_page(&self, page: Option<&str>) -> Result<String, EngineError> {
        let id = match page {
            Some(id) => id.to_string(),
            None => self.selected.read().clone().ok_or(EngineError::NoSelectedPage)?,
        };
        if self.pages.get(&id).is_none() {
            return Err(EngineError::PageNotFound(id));
        }
        Ok(id)
    }

    fn emit_component_update(&self, page_id: &str) {
        let payload = EventPayload::Model(page_id.to_string());
        self.events.emit(&EngineEvent::ComponentUpdate, &payload);
        self.events.emit(&EngineEvent::Update, &payload);
    }

    fn report_storage_error(&self, operation: &str, err: StorageError) -> EngineError {
        warn!(operation, error = %err, "storage operation failed");
        self.events
            .emit(&EngineEvent::StorageError, &EventPayload::Error(err.to_string()));
        EngineError::Storage(err)
    }
}

impl Editor for MemoryEditor {
    fn events(&self) -> &EventBus {
        &self.events
    }

    fn storage(&self) -> &StorageManager {
        &self.storage
    }

    fn pages(&self) -> Arc<dyn Collection> {
        self.pages.clone()
    }

    fn selected_page(&self) -> Option<Arc<dyn Model>> {
        let selected = self.selected.read().clone()?;
        self.pages.get(&selected)
    }

    fn select_page(&self, id: &str) -> Result<(), EngineError> {
        if self.pages.get(id).is_none() {
            return Err(EngineError::PageNotFound(id.to_string()));
        }
        *self.selected.write() = Some(id.to_string());
        self.events
            .emit(&EngineEvent::Page, &EventPayload::Model(id.to_string()));
        Ok(())
    }

    fn add_page(&self, attributes: Attributes) -> Result<Arc<dyn Model>, EngineError> {
        let id = match attributes.get("id").and_then(Value::as_str) {
            Some(id) if self.pages.get(id).is_some() => {
                return Err(EngineError::DuplicatePage(id.to_string()))
            }
            Some(id) => id.to_string(),
            None => self.generate_page_id(),
        };
        let model = self.track_page(&id, attributes);
        self.components
            .write()
            .insert(id.clone(), ComponentNode::element("body"));
        self.pages.add(model.clone(), None);

        let payload = EventPayload::Model(id);
        self.events.emit(&EngineEvent::Page, &payload);
        self.events.emit(&EngineEvent::Update, &payload);
        Ok(model)
    }

    fn remove_page(&self, id: &str) -> Result<Arc<dyn Model>, EngineError> {
        let removed = self
            .pages
            .remove(id)
            .ok_or_else(|| EngineError::PageNotFound(id.to_string()))?;
        self.untrack_page(removed.as_ref());
        self.components.write().remove(id);

        let was_selected = self.selected.read().as_deref() == Some(id);
        if was_selected {
            *self.selected.write() = self.pages.first().map(|p| p.id());
        }

        let payload = EventPayload::Model(id.to_string());
        self.events.emit(&EngineEvent::Page, &payload);
        self.events.emit(&EngineEvent::Update, &payload);
        Ok(removed)
    }

    fn open_modal(&self, props: ModalProps) {
        let props = ModalProps { open: true, ..props };
        *self.modal.write() = props.clone();
        self.events
            .emit(&EngineEvent::Modal, &EventPayload::Modal(props));
    }

    fn close_modal(&self) {
        let props = {
            let mut modal = self.modal.write();
            modal.open = false;
            modal.clone()
        };
        self.events
            .emit(&EngineEvent::Modal, &EventPayload::Modal(props));
    }

    fn html(&self, page: Option<&str>) -> Result<String, EngineError> {
        let id = self.resolve_page(page)?;
        Ok(self
            .components
            .read()
            .get(&id)
            .map(ComponentNode::to_html)
            .unwrap_or_default())
    }

    fn css(&self, page: Option<&str>) -> Result<String, EngineError> {
        self.resolve_page(page)?;
        Ok(self.css.read().clone())
    }

    fn js(&self) -> Result<String, EngineError> {
        Ok(self.js.read().clone())
    }

    fn set_components(&self, html: &str) -> Result<(), EngineError> {
        if html.rfind('<') > html.rfind('>') {
            return Err(EngineError::InvalidCode {
                kind: "html".into(),
                reason: "unterminated tag".into(),
            });
        }
        let id = self.resolve_page(None)?;
        self.components
            .write()
            .insert(id.clone(), ComponentNode::raw(html));
        self.emit_component_update(&id);
        Ok(())
    }

    fn set_style(&self, css: &str) -> Result<(), EngineError> {
        if css.matches('{').count() != css.matches('}').count() {
            return Err(EngineError::InvalidCode {
                kind: "css".into(),
                reason: "unbalanced braces".into(),
            });
        }
        *self.css.write() = css.to_string();
        self.events.emit(&EngineEvent::Update, &EventPayload::None);
        Ok(())
    }

    fn set_js(&self, js: &str) -> Result<(), EngineError> {
        *self.js.write() = js.to_string();
        self.events.emit(&EngineEvent::Update, &EventPayload::None);
        Ok(())
    }

    fn wrapper(&self) -> Option<ComponentNode> {
        let selected = self.selected.read().clone()?;
        self.components.read().get(&selected).cloned()
    }

    fn load(&self) -> EngineFuture<'_, ProjectData> {
        Box::pin(async move {
            let keys: Vec<String> = PROJECT_KEYS.iter().map(|k| k.to_string()).collect();
            let provider = match self.storage.current() {
                Ok(provider) => provider,
                Err(err) => return Err(self.report_storage_error("load", err)),
            };
            match provider.load(&keys).await {
                Ok(data) => {
                    debug!(keys = data.len(), "project loaded");
                    self.apply_project_data(&data);
                    self.events.emit(
                        &EngineEvent::StorageLoad,
                        &EventPayload::Data(Value::Object(data.clone())),
                    );
                    Ok(data)
                }
                Err(err) => Err(self.report_storage_error("load", err)),
            }
        })
    }

    fn store(&self) -> EngineFuture<'_, ProjectData> {
        Box::pin(async move {
            let data = self.project_data();
            let provider = match self.storage.current() {
                Ok(provider) => provider,
                Err(err) => return Err(self.report_storage_error("store", err)),
            };
            match provider.store(&data).await {
                Ok(()) => {
                    debug!(pages = self.pages.len(), "project stored");
                    self.events.emit(&EngineEvent::StorageStore, &EventPayload::None);
                    Ok(data)
                }
                Err(err) => Err(self.report_storage_error("store", err)),
            }
        })
    }
}

impl fmt::Debug for MemoryEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEditor")
            .field("pages", &self.pages)
            .field("selected", &*self.selected.read())
            .field("storage", &self.storage)
            .finish()
    }
}
