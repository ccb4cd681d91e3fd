//! Event bus for state-change delivery
//!
//! Controllers track a fixed set of entity ids and receive only the
//! `state_changed` events for those entities on a private channel. Observers
//! that want everything (logging, diagnostics) subscribe to a broadcast feed.
//! Tracking is revoked explicitly with [`EventBus::untrack`]; a listener whose
//! receiver was dropped is pruned on the next delivery.

use dashmap::DashMap;
use smartify_core::{Context, Event, StateChangedData};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

/// Default channel capacity for broadcast observers
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A unique identifier for an entity listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Receiving end of an entity-filtered subscription
pub struct StateChangeListener {
    /// Pass to [`EventBus::untrack`] to revoke the subscription
    pub id: ListenerId,
    /// State changes of the tracked entities, in firing order
    pub rx: mpsc::UnboundedReceiver<Event<StateChangedData>>,
}

struct Tracker {
    entity_ids: HashSet<String>,
    tx: mpsc::UnboundedSender<Event<StateChangedData>>,
}

/// The event bus for state-change events
pub struct EventBus {
    /// Entity-filtered listeners
    trackers: DashMap<ListenerId, Tracker>,
    /// Sender for observers of every state change
    observers: broadcast::Sender<Event<StateChangedData>>,
    /// Counter for generating unique listener IDs
    next_listener_id: AtomicU64,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the given observer channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (observers, _) = broadcast::channel(capacity);
        Self {
            trackers: DashMap::new(),
            observers,
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Start tracking state changes of the given entities
    pub fn track_state_change<I, S>(&self, entity_ids: I) -> StateChangeListener
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::SeqCst));
        let entity_ids: HashSet<String> = entity_ids.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::unbounded_channel();

        debug!(listener = id.0, entities = entity_ids.len(), "Tracking state changes");
        self.trackers.insert(id, Tracker { entity_ids, tx });

        StateChangeListener { id, rx }
    }

    /// Stop tracking; returns false when the listener was already gone
    pub fn untrack(&self, id: ListenerId) -> bool {
        let removed = self.trackers.remove(&id).is_some();
        if removed {
            debug!(listener = id.0, "Stopped tracking state changes");
        }
        removed
    }

    /// Subscribe to every state change
    pub fn subscribe(&self) -> broadcast::Receiver<Event<StateChangedData>> {
        self.observers.subscribe()
    }

    /// Fire a state change to every listener tracking the entity
    pub fn fire_state_changed(&self, data: StateChangedData, context: Context) {
        let event = Event::typed(data, context);
        let entity_id = event.data.entity_id.to_string();
        trace!(entity_id = %entity_id, "Firing state_changed");

        let mut closed = Vec::new();
        for tracker in self.trackers.iter() {
            if tracker.entity_ids.contains(&entity_id) && tracker.tx.send(event.clone()).is_err() {
                closed.push(*tracker.key());
            }
        }
        for id in closed {
            self.trackers.remove(&id);
        }

        // No observers is not an error
        let _ = self.observers.send(event);
    }

    /// Get the number of live entity listeners
    pub fn listener_count(&self) -> usize {
        self.trackers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;
