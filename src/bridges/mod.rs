//! Engine bridges
//!
//! Each `use_*` function attaches one bridge kind to an [`EngineHandle`] and
//! returns its shared state. Attaching a kind twice returns the same `Arc`
//! (the handle's registry is the idempotence guard), so callers may invoke
//! them freely from wherever they need the state.
//!
//! | Bridge | Attach | Live on init |
//! |---|---|---|
//! | storage | before init only | provider registered, autoload, autosave armed |
//! | pages | any time | collection + selection mirrored on `page` |
//! | modal | before init only | modal state mirrored on `modal` |
//! | code editor | any time | html/css/js mirrored on `page` and `update` |
//!
//! [`EngineHandle`]: crate::engine::EngineHandle

mod code_editor;
mod drafts;
mod modal;
mod pages;
mod storage;

pub use code_editor::{use_code_editor, CodeEditorState, CodeKind};
pub use drafts::DraftStore;
pub use modal::{use_modal, ModalState, ModalView};
pub use pages::{use_pages, PagesState};
pub use storage::{use_kv_storage, KvStorageProvider, StorageState, StorageStatus, PROVIDER_NAME};

use crate::engine::Editor;
use crate::error::{BridgeError, BridgeResult};
use crate::lifecycle::BridgeKind;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::warn;

/// Spawn onto the current runtime; without one the task is dropped with a
/// warning.
pub(crate) fn spawn_detached<F>(task: &'static str, future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(future);
        }
        Err(_) => warn!(task, "no tokio runtime available; task dropped"),
    }
}

/// The live editor as seen by a bridge: empty until init, weak afterwards so
/// the engine is owned by its handle alone.
#[derive(Default)]
pub(crate) struct EditorSlot {
    editor: RwLock<Option<Weak<dyn Editor>>>,
}

impl EditorSlot {
    pub(crate) fn bind(&self, editor: &Arc<dyn Editor>) {
        *self.editor.write() = Some(Arc::downgrade(editor));
    }

    pub(crate) fn get(&self, bridge: BridgeKind) -> BridgeResult<Arc<dyn Editor>> {
        self.editor
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(BridgeError::NotInitialized { bridge })
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.editor.read().as_ref().is_some_and(|e| e.strong_count() > 0)
    }
}

impl std::fmt::Debug for EditorSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSlot")
            .field("bound", &self.is_bound())
            .finish()
    }
}
