//! Change listeners and the observer view of a controller

use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

type Callback = Arc<dyn Fn() + Send + Sync>;
type CallbackMap = Mutex<IndexMap<u64, Callback>>;

/// Observers notified, without payload, whenever a controller changes state
#[derive(Clone, Default)]
pub struct Listeners {
    callbacks: Arc<CallbackMap>,
    next_id: Arc<AtomicU64>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; call `remove` on the handle to unregister
    ///
    /// Dropping the handle keeps the callback registered.
    pub fn add(&self, callback: impl Fn() + Send + Sync + 'static) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(callback));

        ListenerHandle {
            id,
            callbacks: Arc::downgrade(&self.callbacks),
        }
    }

    /// Call every listener in registration order
    pub fn notify(&self) {
        // Snapshot so a callback may add or remove listeners
        let callbacks: Vec<Callback> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for callback in callbacks {
            callback();
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Remover returned by [`Listeners::add`]
///
/// Keeping the handle does not keep the listener alive; it is removed only
/// when [`ListenerHandle::remove`] is called.
pub struct ListenerHandle {
    id: u64,
    callbacks: Weak<CallbackMap>,
}

impl ListenerHandle {
    /// Unregister the listener; calling it again is a no-op
    pub fn remove(&self) -> bool {
        self.callbacks.upgrade().is_some_and(|callbacks| {
            callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .shift_remove(&self.id)
                .is_some()
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Status {
    pub name: String,
    pub state: String,
    pub is_on: bool,
}

/// Read-only view of a running controller
///
/// Cheap to clone and safe to use from any task. Listeners are called from
/// the controller's task right after each state change.
#[derive(Clone)]
pub struct ControllerView {
    status: Arc<RwLock<Status>>,
    listeners: Listeners,
}

impl ControllerView {
    pub(crate) fn new(status: Arc<RwLock<Status>>, listeners: Listeners) -> Self {
        Self { status, listeners }
    }

    /// Display name of the controller
    pub fn name(&self) -> String {
        self.read().name.clone()
    }

    /// Current state, e.g. `on_manual` or `wasp_in_box`
    pub fn state(&self) -> String {
        self.read().state.clone()
    }

    pub fn is_on(&self) -> bool {
        self.read().is_on
    }

    pub fn add_listener(&self, callback: impl Fn() + Send + Sync + 'static) -> ListenerHandle {
        self.listeners.add(callback)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Status> {
        self.status.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ControllerView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.read();
        f.debug_struct("ControllerView")
            .field("name", &status.name)
            .field("state", &status.state)
            .field("is_on", &status.is_on)
            .finish()
    }
}
