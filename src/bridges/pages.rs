//! Pages bridge
//!
//! Mirrors the engine's page collection and the selected page. Every `page`
//! event rebuilds both: the previous mirrors are decoupled first, so each
//! page model carries at most one subscription from this bridge.

use super::EditorSlot;
use crate::engine::{AttachPolicy, Editor, EngineHandle, Model};
use crate::error::BridgeResult;
use crate::events::EngineEvent;
use crate::lifecycle::{Attached, BridgeKind};
use crate::projection::{reactive_collection, reactive_model, CollectionMirror, Projection, Resource};
use crate::reactive::{Attributes, Observable};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PagesState {
    pages: Observable<Arc<CollectionMirror>>,
    selected: Observable<Projection>,
    editor: EditorSlot,
}

impl PagesState {
    fn new() -> Self {
        PagesState {
            pages: Observable::new(Arc::new(CollectionMirror::default())),
            selected: Observable::new(Projection::default()),
            editor: EditorSlot::default(),
        }
    }

    /// Current mirror of the page collection, in engine order.
    pub fn pages(&self) -> Arc<CollectionMirror> {
        self.pages.get()
    }

    pub fn pages_observable(&self) -> &Observable<Arc<CollectionMirror>> {
        &self.pages
    }

    /// The selected page, or an empty plain object when nothing is selected.
    pub fn selected(&self) -> Projection {
        self.selected.get()
    }

    pub fn selected_observable(&self) -> &Observable<Projection> {
        &self.selected
    }

    pub fn is_live(&self) -> bool {
        self.editor.is_bound()
    }

    pub fn select(&self, id: &str) -> BridgeResult<()> {
        let editor = self.editor.get(BridgeKind::Pages)?;
        editor.select_page(id)?;
        Ok(())
    }

    pub fn add(&self, attributes: Attributes) -> BridgeResult<Arc<dyn Model>> {
        let editor = self.editor.get(BridgeKind::Pages)?;
        Ok(editor.add_page(attributes)?)
    }

    pub fn remove(&self, id: &str) -> BridgeResult<Arc<dyn Model>> {
        let editor = self.editor.get(BridgeKind::Pages)?;
        Ok(editor.remove_page(id)?)
    }

    /// Re-derive both mirrors from the engine.
    pub fn refresh(&self, editor: &dyn Editor) {
        let stale = self.pages.with(|mirror| mirror.decouple_all());
        self.pages.set(Arc::new(reactive_collection(editor.pages().as_ref())));

        self.selected.with(Projection::decouple);
        self.selected
            .set(reactive_model(Resource::from_option(editor.selected_page())));
        debug!(
            pages = self.pages.with(|mirror| mirror.len()),
            decoupled = stale,
            "pages mirror refreshed"
        );
    }

    fn decouple_all(&self) -> usize {
        let mut decoupled = self.pages.with(|mirror| mirror.decouple_all());
        if self.selected.with(Projection::decouple) {
            decoupled += 1;
        }
        decoupled
    }

    fn go_live(self: &Arc<Self>, handle: &EngineHandle, editor: &Arc<dyn Editor>) {
        self.editor.bind(editor);
        self.refresh(editor.as_ref());

        let state = Arc::downgrade(self);
        let engine = Arc::downgrade(editor);
        let listener = editor.events().on(EngineEvent::Page, move |_| {
            if let (Some(state), Some(editor)) = (state.upgrade(), engine.upgrade()) {
                state.refresh(editor.as_ref());
            }
        });

        let state = Arc::downgrade(self);
        let engine = Arc::downgrade(editor);
        let teardown = Box::new(move || {
            if let Some(editor) = engine.upgrade() {
                editor.events().off(listener);
            }
            if let Some(state) = state.upgrade() {
                let decoupled = state.decouple_all();
                debug!(decoupled, "pages bridge torn down");
            }
        });
        if handle.registry().add_teardown(BridgeKind::Pages, teardown).is_err() {
            warn!("pages bridge missing from registry; teardown not recorded");
        }
        handle.registry().mark_live(BridgeKind::Pages);
        info!(pages = self.pages.with(|mirror| mirror.len()), "pages bridge live");
    }
}

impl fmt::Debug for PagesState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagesState")
            .field("pages", &self.pages.with(|mirror| mirror.ids()))
            .field("selected", &self.selected.with(Projection::id))
            .field("live", &self.is_live())
            .finish()
    }
}

/// Attach the pages bridge. Allowed before or after init; after init the
/// mirrors are built immediately.
pub fn use_pages(handle: &Arc<EngineHandle>) -> BridgeResult<Arc<PagesState>> {
    let attached = handle.attach(BridgeKind::Pages, AttachPolicy::Anytime, |_| {
        Ok(Arc::new(PagesState::new()))
    })?;
    let state = match attached {
        Attached::Cached(state) => return Ok(state),
        Attached::Fresh(state) => state,
    };

    let bridge = state.clone();
    let weak_handle = Arc::downgrade(handle);
    handle.on_init(Box::new(move |editor| {
        if let Some(handle) = weak_handle.upgrade() {
            bridge.go_live(&handle, editor);
        }
    }));
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEditor;
    use crate::error::BridgeError;
    use serde_json::json;

    fn named(name: &str) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("name".into(), json!(name));
        attributes
    }

    #[test]
    fn test_operations_before_init_are_refused() {
        let handle = EngineHandle::new();
        let pages = use_pages(&handle).unwrap();
        assert!(!pages.is_live());
        assert!(matches!(
            pages.select("home"),
            Err(BridgeError::NotInitialized {
                bridge: BridgeKind::Pages
            })
        ));
        assert!(pages.pages().is_empty());
        assert!(!pages.selected().is_live());
    }

    #[test]
    fn test_attach_after_init_mirrors_immediately() {
        let handle = EngineHandle::new();
        let editor = handle.initialize(MemoryEditor::build).unwrap();
        let pages = use_pages(&handle).unwrap();

        assert_eq!(pages.pages().ids(), vec!["home"]);
        assert_eq!(pages.selected().id().as_deref(), Some("home"));
        assert_eq!(editor.events().listener_count(&EngineEvent::Page), 1);
        assert!(Arc::ptr_eq(&pages, &use_pages(&handle).unwrap()));
        assert_eq!(editor.events().listener_count(&EngineEvent::Page), 1);
    }

    #[test]
    fn test_reselect_decouples_previous_selection() {
        let handle = EngineHandle::new();
        let pages = use_pages(&handle).unwrap();
        let editor = handle.initialize(MemoryEditor::build).unwrap();

        let about = pages.add(named("About")).unwrap();
        let home = editor.pages().get("home").unwrap();
        let first = pages.selected();
        assert_eq!(first.id().as_deref(), Some("home"));

        pages.select(&about.id()).unwrap();
        let second = pages.selected();
        assert_eq!(second.id(), Some(about.id()));
        assert!(!first.as_live().unwrap().is_coupled());

        // One subscription each from the collection mirror, plus the
        // selection for the selected page, plus the engine's own listener.
        assert_eq!(home.subscriber_count(), 2);
        assert_eq!(about.subscriber_count(), 3);

        about.set("name", json!("About us"));
        assert_eq!(second.get("name"), Some(json!("About us")));
        assert_eq!(
            pages.pages().find(&about.id()).and_then(|p| p.get("name")),
            Some(json!("About us"))
        );
    }

    #[test]
    fn test_remove_rebuilds_collection() {
        let handle = EngineHandle::new();
        let pages = use_pages(&handle).unwrap();
        handle.initialize(MemoryEditor::build).unwrap();

        let about = pages.add(named("About")).unwrap();
        let before = pages.pages();
        assert_eq!(before.len(), 2);

        pages.remove(&about.id()).unwrap();
        assert_eq!(pages.pages().ids(), vec!["home"]);
        assert_eq!(before.mirrors().filter(|m| m.is_coupled()).count(), 0);
        assert_eq!(about.subscriber_count(), 0);
    }

    #[test]
    fn test_shutdown_detaches_everything() {
        let handle = EngineHandle::new();
        let pages = use_pages(&handle).unwrap();
        let editor = handle.initialize(MemoryEditor::build).unwrap();
        let home = editor.pages().get("home").unwrap();
        assert_eq!(home.subscriber_count(), 3);

        handle.shutdown();
        assert_eq!(editor.events().listener_count(&EngineEvent::Page), 0);
        assert_eq!(home.subscriber_count(), 1);
        assert!(pages.pages().mirrors().all(|m| !m.is_coupled()));
    }
}
