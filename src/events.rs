//! Event plumbing shared by the engine and the bridges
//!
//! - [`Emitter`]: a listener list for one kind of notification (model
//!   attribute changes, collection changes, observable updates)
//! - [`EventBus`]: the engine's named domain events (`update`, `page`,
//!   `modal`, ...) with fan-out to every registered handler
//!
//! Handlers are cloned out of the lock before they run, so a handler may
//! subscribe, unsubscribe or emit again without deadlocking.

use crate::engine::ModalProps;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Identifies one registered handler. Unique across every emitter in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn next() -> Self {
        SubscriptionId(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

pub type Handler<A> = Arc<dyn Fn(&A) + Send + Sync>;

// ============================================================================
// Emitter
// ============================================================================

/// Ordered listener list. Handlers run in registration order.
pub struct Emitter<A: ?Sized> {
    handlers: Mutex<Vec<(SubscriptionId, Handler<A>)>>,
}

impl<A: ?Sized> Emitter<A> {
    pub fn new() -> Self {
        Emitter {
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        let handler: Handler<A> = Arc::new(handler);
        self.handlers.lock().push((id, handler));
        id
    }

    /// Returns false when the id was not registered (already removed).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn emit(&self, arg: &A) {
        let snapshot: Vec<Handler<A>> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in snapshot {
            handler(arg);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.lock().is_empty()
    }

    pub fn clear(&self) {
        self.handlers.lock().clear();
    }
}

impl<A: ?Sized> Default for Emitter<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized> fmt::Debug for Emitter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("handlers", &self.len())
            .finish()
    }
}

// ============================================================================
// Engine domain events
// ============================================================================

/// Named events the editor engine emits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EngineEvent {
    /// Any change to the project (content, style, structure)
    Update,
    ComponentUpdate,
    AssetUpdate,
    /// Page list or page selection changed
    Page,
    /// Modal opened, closed or changed content
    Modal,
    StorageLoad,
    StorageStore,
    StorageError,
    Custom(String),
}

impl EngineEvent {
    pub fn as_str(&self) -> &str {
        match self {
            EngineEvent::Update => "update",
            EngineEvent::ComponentUpdate => "component:update",
            EngineEvent::AssetUpdate => "asset:update",
            EngineEvent::Page => "page",
            EngineEvent::Modal => "modal",
            EngineEvent::StorageLoad => "storage:load",
            EngineEvent::StorageStore => "storage:store",
            EngineEvent::StorageError => "storage:error",
            EngineEvent::Custom(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "update" => EngineEvent::Update,
            "component:update" => EngineEvent::ComponentUpdate,
            "asset:update" => EngineEvent::AssetUpdate,
            "page" => EngineEvent::Page,
            "modal" => EngineEvent::Modal,
            "storage:load" => EngineEvent::StorageLoad,
            "storage:store" => EngineEvent::StorageStore,
            "storage:error" => EngineEvent::StorageError,
            other => EngineEvent::Custom(other.to_string()),
        }
    }

    /// Events that mean "the project content changed and should be persisted".
    pub fn mutation_events() -> [EngineEvent; 3] {
        [
            EngineEvent::Update,
            EngineEvent::ComponentUpdate,
            EngineEvent::AssetUpdate,
        ]
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Argument delivered with an engine event.
#[derive(Debug, Clone, Default)]
pub enum EventPayload {
    #[default]
    None,
    /// Id of the model the event concerns
    Model(String),
    Modal(ModalProps),
    Error(String),
    Data(Value),
}

/// The engine's named-event emitter.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<EngineEvent, Vec<(SubscriptionId, Handler<EventPayload>)>>>,
    emitted: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: EngineEvent, handler: F) -> SubscriptionId
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        let handler: Handler<EventPayload> = Arc::new(handler);
        self.listeners
            .lock()
            .entry(event)
            .or_default()
            .push((id, handler));
        id
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let mut removed = false;
        for handlers in listeners.values_mut() {
            let before = handlers.len();
            handlers.retain(|(existing, _)| *existing != id);
            removed |= handlers.len() != before;
        }
        removed
    }

    pub fn emit(&self, event: &EngineEvent, payload: &EventPayload) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        let snapshot: Vec<Handler<EventPayload>> = match self.listeners.lock().get(event) {
            Some(handlers) => handlers.iter().map(|(_, h)| h.clone()).collect(),
            None => return,
        };
        for handler in snapshot {
            handler(payload);
        }
    }

    pub fn listener_count(&self, event: &EngineEvent) -> usize {
        self.listeners.lock().get(event).map_or(0, Vec::len)
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners.lock().values().map(Vec::len).sum()
    }

    pub fn emitted_count(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.total_listeners())
            .field("emitted", &self.emitted_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emitter_runs_handlers_in_order() {
        let emitter: Emitter<u32> = Emitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        emitter.subscribe(move |v| first.lock().push(("a", *v)));
        let second = seen.clone();
        emitter.subscribe(move |v| second.lock().push(("b", *v)));

        emitter.emit(&7);
        assert_eq!(*seen.lock(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_unsubscribe_twice_reports_false() {
        let emitter: Emitter<()> = Emitter::new();
        let id = emitter.subscribe(|_| {});
        assert!(emitter.unsubscribe(id));
        assert!(!emitter.unsubscribe(id));
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let emitter: Arc<Emitter<()>> = Arc::new(Emitter::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let emitter_ref = Arc::downgrade(&emitter);
        let slot_ref = slot.clone();
        let calls_ref = calls.clone();
        let id = emitter.subscribe(move |_| {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            if let (Some(emitter), Some(id)) = (emitter_ref.upgrade(), *slot_ref.lock()) {
                emitter.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        emitter.emit(&());
        emitter.emit(&());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bus_routes_by_event_name() {
        let bus = EventBus::new();
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = updates.clone();
        bus.on(EngineEvent::Update, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&EngineEvent::Update, &EventPayload::None);
        bus.emit(&EngineEvent::Page, &EventPayload::None);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(bus.emitted_count(), 2);
    }

    #[test]
    fn test_bus_off_removes_listener() {
        let bus = EventBus::new();
        let id = bus.on(EngineEvent::AssetUpdate, |_| {});
        assert_eq!(bus.listener_count(&EngineEvent::AssetUpdate), 1);
        assert!(bus.off(id));
        assert_eq!(bus.listener_count(&EngineEvent::AssetUpdate), 0);
        assert!(!bus.off(id));
    }

    #[test]
    fn test_event_names_round_trip() {
        for event in [
            EngineEvent::Update,
            EngineEvent::ComponentUpdate,
            EngineEvent::AssetUpdate,
            EngineEvent::Page,
            EngineEvent::Modal,
            EngineEvent::StorageError,
        ] {
            assert_eq!(EngineEvent::from_name(event.as_str()), event);
        }
        assert_eq!(
            EngineEvent::from_name("block:drag"),
            EngineEvent::Custom("block:drag".to_string())
        );
    }
}
