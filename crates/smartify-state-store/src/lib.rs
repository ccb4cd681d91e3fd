//! Entity state storage for the Smartify host
//!
//! The StateStore holds the last written state of every entity and fires a
//! `state_changed` event on the bus whenever a write changes the value or
//! the attributes. Rewrites of an identical state are silent.

use dashmap::DashMap;
use smartify_core::{Context, EntityId, State, StateChangedData};
use smartify_event_bus::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// The state store tracks all entity states
pub struct StateStore {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// Event bus for firing state change events
    event_bus: Arc<EventBus>,
}

impl StateStore {
    /// Create a new state store with the given event bus
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            event_bus,
        }
    }

    /// Set the state of an entity
    ///
    /// The context is stored on the new state and carried by the
    /// `state_changed` event, so listeners can tell who caused the change.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context.clone()),
            None => State::new(entity_id.clone(), state, attributes, context.clone()),
        };

        if old_state.as_ref() == Some(&new_state) {
            trace!(state = %new_state.state, "State unchanged");
            self.states.insert(key, new_state.clone());
            return new_state;
        }

        debug!(
            from = old_state.as_ref().map(|s| s.state.as_str()).unwrap_or("-"),
            to = %new_state.state,
            "Setting entity state"
        );

        self.states.insert(key, new_state.clone());
        self.event_bus.fire_state_changed(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );

        new_state
    }

    /// Get the current state of an entity
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get the state value, or None if the entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    /// Check if an entity is in exactly the given state
    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    /// Remove an entity's state
    ///
    /// Fires a `state_changed` event with `new_state: None`.
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let old_state = self.states.remove(&entity_id.to_string()).map(|(_, s)| s);

        if let Some(state) = &old_state {
            debug!("Removing entity state");
            self.event_bus.fire_state_changed(
                StateChangedData {
                    entity_id: entity_id.clone(),
                    old_state: Some(state.clone()),
                    new_state: None,
                },
                context,
            );
        }

        old_state
    }

    /// Get the total number of entities
    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

/// Thread-safe wrapper for StateStore
pub type SharedStateStore = Arc<StateStore>;
