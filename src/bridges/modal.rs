//! Modal bridge
//!
//! Switches the engine to a custom (UI-rendered) modal before init and then
//! mirrors every `modal` event into a [`ModalView`].

use super::EditorSlot;
use crate::engine::{AttachPolicy, Editor, EngineHandle, ModalProps};
use crate::error::BridgeResult;
use crate::events::{EngineEvent, EventPayload};
use crate::lifecycle::{Attached, BridgeKind};
use crate::reactive::{Attributes, Observable};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the UI renders. `title` and `content` are markup: text is escaped,
/// elements are passed through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModalView {
    pub open: bool,
    pub title: String,
    pub content: String,
    pub attributes: Attributes,
}

impl From<&ModalProps> for ModalView {
    fn from(props: &ModalProps) -> Self {
        ModalView {
            open: props.open,
            title: props.title.to_html(),
            content: props.content.to_html(),
            attributes: props.attributes.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ModalState {
    view: Observable<ModalView>,
    editor: EditorSlot,
}

impl ModalState {
    pub fn view(&self) -> ModalView {
        self.view.get()
    }

    pub fn view_observable(&self) -> &Observable<ModalView> {
        &self.view
    }

    pub fn is_open(&self) -> bool {
        self.view.with(|view| view.open)
    }

    pub fn close(&self) -> BridgeResult<()> {
        self.editor.get(BridgeKind::Modal)?.close_modal();
        Ok(())
    }

    fn go_live(self: &Arc<Self>, handle: &EngineHandle, editor: &Arc<dyn Editor>) {
        self.editor.bind(editor);

        let state = Arc::downgrade(self);
        let listener = editor.events().on(EngineEvent::Modal, move |payload| {
            let (Some(state), EventPayload::Modal(props)) = (state.upgrade(), payload) else {
                return;
            };
            debug!(open = props.open, "modal state changed");
            state.view.set(ModalView::from(props));
        });

        let engine = Arc::downgrade(editor);
        let teardown = Box::new(move || {
            if let Some(editor) = engine.upgrade() {
                editor.events().off(listener);
            }
        });
        if handle.registry().add_teardown(BridgeKind::Modal, teardown).is_err() {
            warn!("modal bridge missing from registry; teardown not recorded");
        }
        handle.registry().mark_live(BridgeKind::Modal);
        info!("modal bridge live");
    }
}

/// Attach the modal bridge. Must run before the engine initializes.
pub fn use_modal(handle: &Arc<EngineHandle>) -> BridgeResult<Arc<ModalState>> {
    let attached = handle.attach(BridgeKind::Modal, AttachPolicy::BeforeInit, |config| {
        config.modal.custom = true;
        Ok(Arc::new(ModalState {
            view: Observable::new(ModalView::default()),
            editor: EditorSlot::default(),
        }))
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
    use crate::engine::{MemoryEditor, ModalContent};
    use crate::error::BridgeError;
    use serde_json::json;

    #[test]
    fn test_custom_modal_configured_before_init() {
        let handle = EngineHandle::new();
        let modal = use_modal(&handle).unwrap();
        assert!(handle.config().modal.custom);
        assert!(matches!(
            modal.close(),
            Err(BridgeError::NotInitialized {
                bridge: BridgeKind::Modal
            })
        ));
    }

    #[test]
    fn test_modal_events_are_mirrored() {
        let handle = EngineHandle::new();
        let modal = use_modal(&handle).unwrap();
        let editor = handle.initialize(MemoryEditor::build).unwrap();

        let mut attributes = Attributes::new();
        attributes.insert("class".into(), json!("wide"));
        editor.open_modal(ModalProps {
            open: true,
            title: ModalContent::Text("Import <code>".into()),
            content: ModalContent::Element("<form></form>".into()),
            attributes,
        });

        let view = modal.view();
        assert!(view.open);
        assert_eq!(view.title, "Import &lt;code&gt;");
        assert_eq!(view.content, "<form></form>");
        assert_eq!(view.attributes.get("class"), Some(&json!("wide")));

        modal.close().unwrap();
        assert!(!modal.is_open());
    }

    #[test]
    fn test_attach_after_init_refused() {
        let handle = EngineHandle::new();
        handle.initialize(MemoryEditor::build).unwrap();
        assert!(matches!(
            use_modal(&handle),
            Err(BridgeError::AlreadyInitialized {
                bridge: BridgeKind::Modal
            })
        ));
        assert!(!handle.config().modal.custom);
    }
}
