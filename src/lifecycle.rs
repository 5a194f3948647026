//! Bridge registry and attach state machine
//!
//! Each engine handle owns one [`BridgeRegistry`]. An entry holds the built
//! mirror for one bridge kind, its [`BridgeState`] and the teardown functions
//! that undo its subscriptions.
//!
//! ```text
//! Unattached --attach (before init, or any time for pages)--> Configured
//! Configured --init callback ran-->                            Live
//! Live       --domain event-->                                 Live
//! any        --shutdown-->                                     Unattached
//! ```

use crate::error::{BridgeError, BridgeResult};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeKind {
    Storage,
    Pages,
    Modal,
    CodeEditor,
    Named(&'static str),
}

impl BridgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeKind::Storage => "storage",
            BridgeKind::Pages => "pages",
            BridgeKind::Modal => "modal",
            BridgeKind::CodeEditor => "code-editor",
            BridgeKind::Named(name) => *name,
        }
    }
}

impl fmt::Display for BridgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Unattached,
    /// Mirror built and engine configuration written; waiting for init
    Configured,
    /// Subscriptions attached to the live engine
    Live,
}

pub type Teardown = Box<dyn FnOnce() + Send>;

/// Result of [`BridgeRegistry::get_or_attach`].
pub enum Attached<T> {
    /// Built by this call; the caller wires subscriptions
    Fresh(Arc<T>),
    /// Already registered; nothing to wire
    Cached(Arc<T>),
}

impl<T> Attached<T> {
    pub fn into_inner(self) -> Arc<T> {
        match self {
            Attached::Fresh(mirror) | Attached::Cached(mirror) => mirror,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Attached::Fresh(_))
    }
}

struct BridgeEntry {
    state: BridgeState,
    mirror: Arc<dyn Any + Send + Sync>,
    teardowns: Vec<Teardown>,
}

#[derive(Default)]
pub struct BridgeRegistry {
    entries: Mutex<HashMap<BridgeKind, BridgeEntry>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached mirror for `kind`, or run `build` and register its
    /// result as `Configured`. `build` runs under the registry lock and must
    /// not call back into the registry.
    pub fn get_or_attach<T, F>(&self, kind: BridgeKind, build: F) -> BridgeResult<Attached<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> BridgeResult<Arc<T>>,
    {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&kind) {
            let mirror = entry
                .mirror
                .clone()
                .downcast::<T>()
                .map_err(|_| BridgeError::MirrorTypeMismatch { bridge: kind })?;
            return Ok(Attached::Cached(mirror));
        }

        let mirror = build()?;
        let erased: Arc<dyn Any + Send + Sync> = mirror.clone();
        entries.insert(
            kind,
            BridgeEntry {
                state: BridgeState::Configured,
                mirror: erased,
                teardowns: Vec::new(),
            },
        );
        debug!(bridge = %kind, "bridge configured");
        Ok(Attached::Fresh(mirror))
    }

    pub fn get<T: Any + Send + Sync>(&self, kind: BridgeKind) -> Option<Arc<T>> {
        let mirror = self.entries.lock().get(&kind)?.mirror.clone();
        mirror.downcast::<T>().ok()
    }

    pub fn state(&self, kind: BridgeKind) -> BridgeState {
        self.entries
            .lock()
            .get(&kind)
            .map_or(BridgeState::Unattached, |entry| entry.state)
    }

    /// Returns false when `kind` is not registered.
    pub fn mark_live(&self, kind: BridgeKind) -> bool {
        match self.entries.lock().get_mut(&kind) {
            Some(entry) => {
                entry.state = BridgeState::Live;
                debug!(bridge = %kind, "bridge live");
                true
            }
            None => false,
        }
    }

    /// Queue `teardown` to run on shutdown. When `kind` is not registered the
    /// teardown is handed back.
    pub fn add_teardown(&self, kind: BridgeKind, teardown: Teardown) -> Result<(), Teardown> {
        match self.entries.lock().get_mut(&kind) {
            Some(entry) => {
                entry.teardowns.push(teardown);
                Ok(())
            }
            None => Err(teardown),
        }
    }

    pub fn kinds(&self) -> Vec<BridgeKind> {
        self.entries.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove every entry and run its teardowns, in registration order per
    /// entry. Returns the number of entries removed.
    pub fn teardown_all(&self) -> usize {
        let drained: Vec<(BridgeKind, BridgeEntry)> = self.entries.lock().drain().collect();
        let count = drained.len();
        for (kind, entry) in drained {
            let teardowns = entry.teardowns.len();
            for teardown in entry.teardowns {
                teardown();
            }
            debug!(bridge = %kind, teardowns, "bridge torn down");
        }
        count
    }
}

impl fmt::Debug for BridgeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states: Vec<(BridgeKind, BridgeState)> = self
            .entries
            .lock()
            .iter()
            .map(|(kind, entry)| (*kind, entry.state))
            .collect();
        f.debug_struct("BridgeRegistry").field("entries", &states).finish()
    }
}
