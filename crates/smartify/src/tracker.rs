//! Entity state tracker
//!
//! Sits between the bus and a controller. A state change reaches the
//! controller only when the new value is real (not `unknown`/`unavailable`)
//! and differs from the last value seen for that entity.
//!
//! Service calls issued by the controller are stamped with a fresh
//! [`Context`] whose id is kept as an in-flight token. A state change caused
//! by such a call is an echo of the controller's own actuation: it updates
//! the last seen value but is never forwarded.

use smartify_core::{Context, Event, State, StateChangedData};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// How long a call's context is remembered for echo suppression
const IN_FLIGHT_TTL: Duration = Duration::from_secs(60);

/// Deduplicating filter for one controller's tracked entities
#[derive(Debug, Default)]
pub struct EntityTracker {
    /// Last value seen per entity
    last_values: HashMap<String, String>,
    /// Contexts of recent actuation calls, oldest first
    in_flight: VecDeque<(String, Instant)>,
}

impl EntityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context for an outgoing call and remember it
    pub fn issue_context(&mut self) -> Context {
        self.prune(Instant::now());
        let context = Context::new();
        self.in_flight.push_back((context.id.clone(), Instant::now()));
        context
    }

    /// Whether a context belongs to one of this controller's own calls
    pub fn is_own(&self, context: &Context) -> bool {
        let now = Instant::now();
        self.in_flight
            .iter()
            .any(|(id, issued)| now.duration_since(*issued) < IN_FLIGHT_TTL && context.originates_from(id))
    }

    /// Filter a live `state_changed` event
    ///
    /// Returns the new state when it should reach the controller.
    pub fn filter(&mut self, event: &Event<StateChangedData>) -> Option<State> {
        let new_state = event.data.new_state.as_ref()?;

        if self.is_own(&event.context) {
            trace!(entity_id = %new_state.entity_id, state = %new_state.state, "Ignoring echo of own call");
            if !new_state.is_transient() {
                self.last_values
                    .insert(new_state.entity_id.to_string(), new_state.state.clone());
            }
            return None;
        }

        self.accept(new_state).then(|| new_state.clone())
    }

    /// Record a state; true when it is a real value that changed
    ///
    /// Used directly when seeding from the state store at setup.
    pub fn accept(&mut self, state: &State) -> bool {
        if state.is_transient() {
            trace!(entity_id = %state.entity_id, state = %state.state, "Ignoring transient state");
            return false;
        }

        let key = state.entity_id.to_string();
        if self.last_values.get(&key) == Some(&state.state) {
            return false;
        }

        self.last_values.insert(key, state.state.clone());
        true
    }

    /// Last value seen for an entity
    pub fn last_value(&self, entity_id: &str) -> Option<&str> {
        self.last_values.get(entity_id).map(String::as_str)
    }

    /// Forget all values and tokens
    pub fn reset(&mut self) {
        self.last_values.clear();
        self.in_flight.clear();
    }

    fn prune(&mut self, now: Instant) {
        while let Some((_, issued)) = self.in_flight.front() {
            if now.duration_since(*issued) < IN_FLIGHT_TTL {
                break;
            }
            self.in_flight.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn event(entity_id: &str, value: &str, context: Context) -> Event<StateChangedData> {
        let entity_id: smartify_core::EntityId = entity_id.parse().unwrap();
        let state = State::new(entity_id.clone(), value, HashMap::new(), context.clone());
        Event::typed(
            StateChangedData {
                entity_id,
                old_state: None,
                new_state: Some(state),
            },
            context,
        )
    }

    #[tokio::test]
    async fn test_forwards_only_changes() {
        let mut tracker = EntityTracker::new();

        assert!(tracker.filter(&event("sensor.humidity", "40", Context::new())).is_some());
        assert!(tracker.filter(&event("sensor.humidity", "40", Context::new())).is_none());
        assert!(tracker.filter(&event("sensor.humidity", "41", Context::new())).is_some());
        assert_eq!(tracker.last_value("sensor.humidity"), Some("41"));
    }

    #[tokio::test]
    async fn test_transient_values_are_not_cached() {
        let mut tracker = EntityTracker::new();

        assert!(tracker.filter(&event("fan.bedroom", "on", Context::new())).is_some());
        assert!(tracker.filter(&event("fan.bedroom", "unavailable", Context::new())).is_none());
        assert!(tracker.filter(&event("fan.bedroom", "unknown", Context::new())).is_none());
        assert_eq!(tracker.last_value("fan.bedroom"), Some("on"));

        // Coming back with the same value is not a change
        assert!(tracker.filter(&event("fan.bedroom", "on", Context::new())).is_none());
    }

    #[tokio::test]
    async fn test_removed_entity_is_ignored() {
        let mut tracker = EntityTracker::new();
        let mut removed = event("light.hall", "on", Context::new());
        removed.data.new_state = None;
        assert!(tracker.filter(&removed).is_none());
    }

    #[tokio::test]
    async fn test_echo_of_own_call_is_suppressed() {
        let mut tracker = EntityTracker::new();
        assert!(tracker.filter(&event("fan.bath", "off", Context::new())).is_some());

        let context = tracker.issue_context();
        assert!(tracker.filter(&event("fan.bath", "on", context.clone())).is_none());
        assert!(tracker.filter(&event("fan.bath", "on", context.child())).is_none());
        assert_eq!(tracker.last_value("fan.bath"), Some("on"));

        // A genuine external change afterwards is delivered
        assert!(tracker.filter(&event("fan.bath", "off", Context::new())).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_expire() {
        let mut tracker = EntityTracker::new();
        let context = tracker.issue_context();
        assert!(tracker.is_own(&context));

        tokio::time::advance(IN_FLIGHT_TTL).await;
        assert!(!tracker.is_own(&context));

        tracker.issue_context();
        assert_eq!(tracker.in_flight.len(), 1);
    }
}
