//! Editor engine bridge
//!
//! Mirrors an externally owned, imperative editor engine (models, collections
//! and an event emitter) into observable projections for a UI, and persists the
//! engine's project state to a key-value store with debounced autosave.
//!
//! Layering, leaves first:
//! - [`kv`]: durable async get/put of whole JSON records
//! - [`scheduler`]: coalescing debounce for autosave triggers
//! - [`projection`]: live mirrors of engine models and collections
//! - [`lifecycle`]: per-handle bridge registry and attach state machine
//! - [`bridges`]: storage, pages, modal and code editor bridges

pub mod bridges;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod kv;
pub mod lifecycle;
pub mod observability;
pub mod page_settings;
pub mod projection;
pub mod reactive;
pub mod scheduler;
pub mod simulator;
pub mod stylesheet;

pub use bridges::{
    use_code_editor, use_kv_storage, use_modal, use_pages, CodeEditorState, CodeKind, DraftStore,
    ModalState, ModalView, PagesState, StorageState, StorageStatus,
};
pub use config::{AutosaveConfig, BridgeConfig, KvBackend, KvStoreConfig};
pub use engine::{
    AttributeModel, Collection, Editor, EngineConfig, EngineHandle, MemoryEditor, Model,
    ModelCollection,
};
pub use error::{BridgeError, EngineError, StorageError};
pub use events::{EngineEvent, EventPayload, SubscriptionId};
pub use kv::{InMemoryKvStore, KvStore, LocalFsKvStore};
pub use lifecycle::{BridgeKind, BridgeState};
pub use projection::{reactive_collection, reactive_model, CollectionMirror, Projection, Resource};
pub use scheduler::DebouncedWriter;
