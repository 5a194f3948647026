//! Storage Bridge
//!
//! Before init: records the `kv` backend and the autosave policy in the
//! engine configuration. On init: registers [`KvStorageProvider`] with the
//! engine's storage manager, makes it current, starts the initial load and
//! arms one [`DebouncedWriter`] against every mutation event.

use super::spawn_detached;
use crate::config::AutosaveConfig;
use crate::engine::{
    AttachPolicy, Editor, EngineHandle, ProjectData, StorageFuture, StorageManagerConfig,
    StorageProvider,
};
use crate::error::{BridgeResult, StorageError};
use crate::events::{EngineEvent, SubscriptionId};
use crate::kv::KvStore;
use crate::lifecycle::{Attached, BridgeKind};
use crate::reactive::Observable;
use crate::scheduler::DebouncedWriter;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Name the provider is registered and selected under.
pub const PROVIDER_NAME: &str = "kv";

/// Document id used when the engine configuration does not name one.
pub const DEFAULT_DOCUMENT_ID: &str = "project";

/// Outcome counters of the provider, observable by the UI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageStatus {
    pub loads: u64,
    pub stores: u64,
    pub failures: u64,
    pub last_error: Option<String>,
    /// Keys returned by the most recent successful load
    pub last_loaded_keys: Vec<String>,
}

/// Engine storage provider backed by a [`KvStore`]. The whole project is one
/// record under `document_id`.
pub struct KvStorageProvider {
    store: Arc<dyn KvStore>,
    document_id: String,
    status: Arc<Observable<StorageStatus>>,
}

impl KvStorageProvider {
    pub fn new(
        store: Arc<dyn KvStore>,
        document_id: impl Into<String>,
        status: Arc<Observable<StorageStatus>>,
    ) -> Self {
        KvStorageProvider {
            store,
            document_id: document_id.into(),
            status,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    fn record_failure(&self, operation: &'static str, err: &StorageError) {
        warn!(operation, document = %self.document_id, error = %err, "storage provider failed");
        let message = err.to_string();
        self.status.update(|status| {
            status.failures += 1;
            status.last_error = Some(message);
        });
    }
}

/// Keep the requested top-level keys that exist with a non-null value.
fn filter_record(
    document_id: &str,
    record: Option<Value>,
    keys: &[String],
) -> Result<ProjectData, StorageError> {
    let record = match record {
        None => return Ok(ProjectData::new()),
        Some(Value::Object(record)) => record,
        Some(other) => {
            return Err(StorageError::Corrupt {
                key: document_id.to_string(),
                reason: format!("expected an object record, found {}", json_kind(&other)),
            })
        }
    };
    Ok(keys
        .iter()
        .filter_map(|key| match record.get(key) {
            Some(value) if !value.is_null() => Some((key.clone(), value.clone())),
            _ => None,
        })
        .collect())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl StorageProvider for KvStorageProvider {
    fn load<'a>(&'a self, keys: &'a [String]) -> StorageFuture<'a, ProjectData> {
        Box::pin(async move {
            let loaded = self
                .store
                .get(&self.document_id)
                .await
                .and_then(|record| filter_record(&self.document_id, record, keys));
            match loaded {
                Ok(data) => {
                    let loaded_keys: Vec<String> = data.keys().cloned().collect();
                    info!(document = %self.document_id, keys = loaded_keys.len(), "project record loaded");
                    self.status.update(|status| {
                        status.loads += 1;
                        status.last_loaded_keys = loaded_keys;
                    });
                    Ok(data)
                }
                Err(err) => {
                    self.record_failure("load", &err);
                    Err(err)
                }
            }
        })
    }

    fn store<'a>(&'a self, data: &'a ProjectData) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let record = Value::Object(data.clone());
            match self.store.put(&self.document_id, &record).await {
                Ok(()) => {
                    info!(document = %self.document_id, keys = data.len(), "project record stored");
                    self.status.update(|status| status.stores += 1);
                    Ok(())
                }
                Err(err) => {
                    self.record_failure("store", &err);
                    Err(err)
                }
            }
        })
    }
}

impl fmt::Debug for KvStorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvStorageProvider")
            .field("document_id", &self.document_id)
            .finish()
    }
}

/// Shared state of the storage bridge.
pub struct StorageState {
    store: Arc<dyn KvStore>,
    autosave: AutosaveConfig,
    status: Arc<Observable<StorageStatus>>,
    writer: Arc<DebouncedWriter>,
    document_id: Mutex<Option<String>>,
    changes_since_save: AtomicU32,
}

impl StorageState {
    fn new(store: Arc<dyn KvStore>, autosave: &AutosaveConfig) -> Self {
        StorageState {
            store,
            autosave: autosave.clone(),
            status: Arc::new(Observable::new(StorageStatus::default())),
            writer: DebouncedWriter::from_config(autosave),
            document_id: Mutex::new(None),
            changes_since_save: AtomicU32::new(0),
        }
    }

    pub fn status(&self) -> StorageStatus {
        self.status.get()
    }

    pub fn status_observable(&self) -> &Observable<StorageStatus> {
        &self.status
    }

    pub fn autosave(&self) -> &AutosaveConfig {
        &self.autosave
    }

    /// The document id the provider reads and writes; `None` before init.
    pub fn document_id(&self) -> Option<String> {
        self.document_id.lock().clone()
    }

    pub fn writer(&self) -> &Arc<DebouncedWriter> {
        &self.writer
    }

    pub fn is_write_pending(&self) -> bool {
        self.writer.is_pending()
    }

    /// Start the pending autosave now instead of after the quiet period.
    pub fn flush(&self) -> bool {
        self.writer.flush()
    }

    /// Count one mutation; true when enough have accumulated to arm a save.
    fn note_change(&self) -> bool {
        let threshold = self.autosave.steps_before_save.max(1);
        let seen = self.changes_since_save.fetch_add(1, Ordering::AcqRel) + 1;
        if seen < threshold {
            return false;
        }
        self.changes_since_save.store(0, Ordering::Release);
        true
    }

    fn go_live(self: &Arc<Self>, handle: &EngineHandle, editor: &Arc<dyn Editor>) {
        let document_id = handle
            .config()
            .storage_manager
            .map(|storage| storage.id)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_DOCUMENT_ID.to_string());
        *self.document_id.lock() = Some(document_id.clone());

        let provider = Arc::new(KvStorageProvider::new(
            self.store.clone(),
            document_id.clone(),
            self.status.clone(),
        ));
        let storage = editor.storage();
        storage.add(PROVIDER_NAME, provider);
        if let Err(err) = storage.set_current(PROVIDER_NAME) {
            warn!(error = %err, "could not select key-value storage provider");
        }

        if self.autosave.autoload {
            let editor = editor.clone();
            spawn_detached("initial load", async move {
                if let Err(err) = editor.load().await {
                    debug!(error = %err, "initial load failed");
                }
            });
        }

        let mut listeners: Vec<SubscriptionId> = Vec::new();
        if self.autosave.enabled {
            for event in EngineEvent::mutation_events() {
                let state = Arc::downgrade(self);
                let engine = Arc::downgrade(editor);
                listeners.push(editor.events().on(event, move |_| {
                    if let Some(state) = state.upgrade() {
                        state.schedule_store(engine.clone());
                    }
                }));
            }
        }

        let engine = Arc::downgrade(editor);
        let writer = self.writer.clone();
        let teardown = Box::new(move || {
            if let Some(editor) = engine.upgrade() {
                for listener in listeners {
                    editor.events().off(listener);
                }
            }
            if writer.flush() {
                debug!("pending autosave flushed on teardown");
            }
        });
        if handle.registry().add_teardown(BridgeKind::Storage, teardown).is_err() {
            warn!("storage bridge missing from registry; teardown not recorded");
        }
        handle.registry().mark_live(BridgeKind::Storage);
        info!(document = %document_id, autosave = self.autosave.enabled, "storage bridge live");
    }

    fn schedule_store(&self, engine: Weak<dyn Editor>) {
        if !self.note_change() {
            return;
        }
        self.writer.schedule(move || {
            let Some(editor) = engine.upgrade() else {
                return;
            };
            spawn_detached("autosave", async move {
                if let Err(err) = editor.store().await {
                    debug!(error = %err, "autosave store failed");
                }
            });
        });
    }
}

impl fmt::Debug for StorageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageState")
            .field("document_id", &self.document_id())
            .field("status", &self.status())
            .field("writer", &self.writer)
            .finish()
    }
}

/// Attach the storage bridge to `handle`, persisting through `store`.
///
/// Must run before the engine initializes; a second call returns the same
/// state without registering anything twice.
pub fn use_kv_storage(
    handle: &Arc<EngineHandle>,
    store: Arc<dyn KvStore>,
    autosave: &AutosaveConfig,
) -> BridgeResult<Arc<StorageState>> {
    let attached = handle.attach(BridgeKind::Storage, AttachPolicy::BeforeInit, |config| {
        let document_id = config
            .storage_manager
            .as_ref()
            .map(|storage| storage.id.clone())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_DOCUMENT_ID.to_string());
        config.storage_manager = Some(StorageManagerConfig {
            kind: PROVIDER_NAME.to_string(),
            id: document_id,
            autosave: autosave.enabled,
            autoload: autosave.autoload,
            steps_before_save: autosave.steps_before_save,
        });
        Ok(Arc::new(StorageState::new(store, autosave)))
    })?;

    let state = match attached {
        Attached::Cached(state) => return Ok(state),
        Attached::Fresh(state) => state,
    };
    debug!(delay_ms = autosave.delay.as_millis() as u64, "storage bridge configured");

    let bridge = state.clone();
    let weak_handle = Arc::downgrade(handle);
    handle.on_init(Box::new(move |editor| {
        if let Some(handle) = weak_handle.upgrade() {
            bridge.go_live(&handle, editor);
        }
    }));
    Ok(state)
}
