//! Editor engine surface
//!
//! The engine owns its models, collections and events; the bridges only read
//! them, subscribe to them and forward writes through the engine's setters.
//!
//! - [`Model`] / [`Collection`]: the mutable object graph
//! - [`Editor`]: the live engine handed to init callbacks
//! - [`StorageProvider`] / [`StorageManager`]: pluggable persistence
//! - [`EngineHandle`]: the pre-init handle bridges attach to
//! - [`MemoryEditor`]: an in-process engine implementing all of the above

mod collection;
mod component;
mod handle;
mod memory;
mod modal;
mod model;
mod storage;

pub use collection::{Collection, CollectionChange, CollectionListener, ModelCollection};
pub use component::ComponentNode;
pub use handle::{
    AttachPolicy, EngineConfig, EngineHandle, InitCallback, ModalConfig, StorageManagerConfig,
};
pub use memory::{MemoryEditor, PROJECT_KEYS};
pub use modal::{escape_html, ModalContent, ModalProps};
pub use model::{AttributeChange, AttributeModel, Model, ModelListener};
pub use storage::{ProjectData, StorageFuture, StorageManager, StorageProvider};

use crate::error::EngineError;
use crate::events::EventBus;
use crate::reactive::Attributes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

/// The initialized editor engine.
pub trait Editor: Send + Sync {
    fn events(&self) -> &EventBus;

    fn storage(&self) -> &StorageManager;

    // Pages

    fn pages(&self) -> Arc<dyn Collection>;

    fn selected_page(&self) -> Option<Arc<dyn Model>>;

    fn select_page(&self, id: &str) -> Result<(), EngineError>;

    fn add_page(&self, attributes: Attributes) -> Result<Arc<dyn Model>, EngineError>;

    fn remove_page(&self, id: &str) -> Result<Arc<dyn Model>, EngineError>;

    // Modal

    fn open_modal(&self, props: ModalProps);

    fn close_modal(&self);

    // Code snapshots, scoped to a page (the selected one when `None`)

    fn html(&self, page: Option<&str>) -> Result<String, EngineError>;

    fn css(&self, page: Option<&str>) -> Result<String, EngineError>;

    fn js(&self) -> Result<String, EngineError>;

    fn set_components(&self, html: &str) -> Result<(), EngineError>;

    fn set_style(&self, css: &str) -> Result<(), EngineError>;

    fn set_js(&self, js: &str) -> Result<(), EngineError>;

    /// Root component of the selected page.
    fn wrapper(&self) -> Option<ComponentNode>;

    // Persistence entry points

    /// Load through the active provider and apply the result. Failures are
    /// also emitted as `storage:error`.
    fn load(&self) -> EngineFuture<'_, ProjectData>;

    /// Store the current project through the active provider. Failures are
    /// also emitted as `storage:error`.
    fn store(&self) -> EngineFuture<'_, ProjectData>;
}
