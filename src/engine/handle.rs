//! Engine handle: the object bridges attach to before the engine exists
//!
//! The handle carries the `initialized` flag, the mutable engine
//! configuration, the per-handle bridge registry and the init callbacks.
//! `initialize` builds the live [`Editor`] from the configuration exactly once
//! and then runs every queued callback with it.

use super::Editor;
use crate::error::{BridgeError, BridgeResult};
use crate::lifecycle::{Attached, BridgeKind, BridgeRegistry};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Storage section of the engine configuration, written by the storage bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageManagerConfig {
    /// Provider name the engine should use
    #[serde(rename = "type")]
    pub kind: String,
    /// Logical document id the project is stored under
    pub id: String,
    pub autosave: bool,
    pub autoload: bool,
    pub steps_before_save: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalConfig {
    /// The UI renders the modal; the engine only reports its state
    pub custom: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub storage_manager: Option<StorageManagerConfig>,
    #[serde(default)]
    pub modal: ModalConfig,
}

pub type InitCallback = Box<dyn FnOnce(&Arc<dyn Editor>) + Send>;

/// Who may attach a bridge kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachPolicy {
    /// Configures the engine, so only before init
    BeforeInit,
    /// Reads live state only; before or after init
    Anytime,
}

pub struct EngineHandle {
    initialized: AtomicBool,
    config: RwLock<EngineConfig>,
    registry: BridgeRegistry,
    init_callbacks: Mutex<Vec<InitCallback>>,
    editor: RwLock<Option<Arc<dyn Editor>>>,
}

impl EngineHandle {
    pub fn new() -> Arc<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Arc<Self> {
        Arc::new(EngineHandle {
            initialized: AtomicBool::new(false),
            config: RwLock::new(config),
            registry: BridgeRegistry::new(),
            init_callbacks: Mutex::new(Vec::new()),
            editor: RwLock::new(None),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    pub fn registry(&self) -> &BridgeRegistry {
        &self.registry
    }

    pub fn editor(&self) -> Option<Arc<dyn Editor>> {
        self.editor.read().clone()
    }

    /// Attach bridge `kind`, or return its cached mirror.
    ///
    /// A fresh attach under [`AttachPolicy::BeforeInit`] fails with
    /// [`BridgeError::AlreadyInitialized`] once the engine is live, before
    /// `configure` runs. `configure` may write the engine configuration.
    pub fn attach<T, F>(
        &self,
        kind: BridgeKind,
        policy: AttachPolicy,
        configure: F,
    ) -> BridgeResult<Attached<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce(&mut EngineConfig) -> BridgeResult<Arc<T>>,
    {
        self.registry.get_or_attach(kind, || {
            if policy == AttachPolicy::BeforeInit && self.is_initialized() {
                return Err(BridgeError::AlreadyInitialized { bridge: kind });
            }
            let mut config = self.config.write();
            configure(&mut config)
        })
    }

    /// Run `callback` with the live editor: now if already initialized,
    /// otherwise when `initialize` runs.
    pub fn on_init(&self, callback: InitCallback) {
        let mut pending = self.init_callbacks.lock();
        if !self.is_initialized() {
            pending.push(callback);
            return;
        }
        drop(pending);
        if let Some(editor) = self.editor() {
            callback(&editor);
        }
    }

    /// Build the live editor from the current configuration and run the
    /// queued init callbacks, in registration order.
    pub fn initialize<F>(&self, build: F) -> BridgeResult<Arc<dyn Editor>>
    where
        F: FnOnce(&EngineConfig) -> Arc<dyn Editor>,
    {
        let (editor, callbacks) = {
            let mut pending = self.init_callbacks.lock();
            if self.is_initialized() {
                return Err(BridgeError::EngineAlreadyInitialized);
            }
            let config = self.config();
            let editor = build(&config);
            *self.editor.write() = Some(editor.clone());
            self.initialized.store(true, Ordering::Release);
            (editor, std::mem::take(&mut *pending))
        };

        info!(
            callbacks = callbacks.len(),
            bridges = self.registry.len(),
            "engine initialized"
        );
        for callback in callbacks {
            callback(&editor);
        }
        Ok(editor)
    }

    /// Tear down every attached bridge: engine listeners removed, mirrors
    /// decoupled, pending autosave flushed. Returns the number of bridges.
    pub fn shutdown(&self) -> usize {
        self.init_callbacks.lock().clear();
        let count = self.registry.teardown_all();
        info!(bridges = count, "engine handle shut down");
        count
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("initialized", &self.is_initialized())
            .field("config", &*self.config.read())
            .field("registry", &self.registry)
            .finish()
    }
}
