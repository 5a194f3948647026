//! Code editor bridge
//!
//! Keeps an HTML/CSS/JS snapshot of the selected page and writes edits back
//! through the engine. A failed refresh keeps the previous snapshot.

use super::EditorSlot;
use crate::engine::{AttachPolicy, Editor, EngineHandle};
use crate::error::{BridgeResult, EngineError};
use crate::events::EngineEvent;
use crate::lifecycle::{Attached, BridgeKind};
use crate::reactive::Observable;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeKind {
    Html,
    Css,
    Js,
}

impl CodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeKind::Html => "html",
            CodeKind::Css => "css",
            CodeKind::Js => "js",
        }
    }
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct CodeEditorState {
    html: Observable<String>,
    css: Observable<String>,
    js: Observable<String>,
    editor: EditorSlot,
    failed_refreshes: AtomicU64,
}

impl CodeEditorState {
    fn new() -> Self {
        CodeEditorState {
            html: Observable::new(String::new()),
            css: Observable::new(String::new()),
            js: Observable::new(String::new()),
            editor: EditorSlot::default(),
            failed_refreshes: AtomicU64::new(0),
        }
    }

    pub fn code(&self, kind: CodeKind) -> String {
        self.observable(kind).get()
    }

    pub fn observable(&self, kind: CodeKind) -> &Observable<String> {
        match kind {
            CodeKind::Html => &self.html,
            CodeKind::Css => &self.css,
            CodeKind::Js => &self.js,
        }
    }

    pub fn failed_refreshes(&self) -> u64 {
        self.failed_refreshes.load(Ordering::Relaxed)
    }

    /// Re-read all three snapshots for the selected page. Does nothing
    /// before init.
    pub fn refresh_code(&self) {
        let Ok(editor) = self.editor.get(BridgeKind::CodeEditor) else {
            return;
        };
        self.refresh_from(editor.as_ref());
    }

    fn refresh_from(&self, editor: &dyn Editor) {
        match read_code(editor) {
            Ok((html, css, js)) => {
                set_if_changed(&self.html, html);
                set_if_changed(&self.css, css);
                set_if_changed(&self.js, js);
            }
            Err(err) => {
                self.failed_refreshes.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "code refresh failed; keeping previous snapshot");
            }
        }
    }

    /// Write `value` back into the engine as the page's components, the
    /// global style or the global script.
    pub fn update_code(&self, kind: CodeKind, value: &str) -> BridgeResult<()> {
        let editor = self.editor.get(BridgeKind::CodeEditor)?;
        let applied = match kind {
            CodeKind::Html => editor.set_components(value),
            CodeKind::Css => editor.set_style(value),
            CodeKind::Js => editor.set_js(value),
        };
        if let Err(err) = applied {
            warn!(%kind, error = %err, "code update rejected");
            return Err(err.into());
        }
        debug!(%kind, len = value.len(), "code updated");
        Ok(())
    }

    fn go_live(self: &Arc<Self>, handle: &EngineHandle, editor: &Arc<dyn Editor>) {
        self.editor.bind(editor);
        self.refresh_from(editor.as_ref());

        let listeners: Vec<_> = [EngineEvent::Page, EngineEvent::Update]
            .into_iter()
            .map(|event| {
                let state = Arc::downgrade(self);
                let engine = Arc::downgrade(editor);
                editor.events().on(event, move |_| {
                    if let (Some(state), Some(editor)) = (state.upgrade(), engine.upgrade()) {
                        state.refresh_from(editor.as_ref());
                    }
                })
            })
            .collect();

        let engine = Arc::downgrade(editor);
        let teardown = Box::new(move || {
            if let Some(editor) = engine.upgrade() {
                for listener in listeners {
                    editor.events().off(listener);
                }
            }
        });
        if handle
            .registry()
            .add_teardown(BridgeKind::CodeEditor, teardown)
            .is_err()
        {
            warn!("code editor bridge missing from registry; teardown not recorded");
        }
        handle.registry().mark_live(BridgeKind::CodeEditor);
        info!("code editor bridge live");
    }
}

fn read_code(editor: &dyn Editor) -> Result<(String, String, String), EngineError> {
    let page = editor.selected_page().map(|page| page.id());
    let html = editor.html(page.as_deref())?;
    let css = editor.css(page.as_deref())?;
    let js = editor.js()?;
    Ok((html, css, js))
}

fn set_if_changed(observable: &Observable<String>, value: String) {
    if observable.with(|current| *current != value) {
        observable.set(value);
    }
}

impl fmt::Debug for CodeEditorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeEditorState")
            .field("html_len", &self.html.with(String::len))
            .field("css_len", &self.css.with(String::len))
            .field("js_len", &self.js.with(String::len))
            .field("editor", &self.editor)
            .finish()
    }
}

/// Attach the code editor bridge. Allowed before or after init.
pub fn use_code_editor(handle: &Arc<EngineHandle>) -> BridgeResult<Arc<CodeEditorState>> {
    let attached = handle.attach(BridgeKind::CodeEditor, AttachPolicy::Anytime, |_| {
        Ok(Arc::new(CodeEditorState::new()))
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
