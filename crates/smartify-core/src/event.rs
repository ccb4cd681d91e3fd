//! Events delivered to controllers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, EntityId, State};

/// Event type string used for state changes
pub const STATE_CHANGED: &str = "state_changed";

/// Trait for typed event payloads
pub trait EventData: Clone + Send + Sync + 'static {
    /// The event type string for this payload
    fn event_type() -> &'static str;
}

/// An event carrying typed data and the context of its cause
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T> {
    /// The type of event
    pub event_type: String,

    /// The event data
    pub data: T,

    /// When the event was fired
    pub time_fired: DateTime<Utc>,

    /// Context tracking the origin of the event
    pub context: Context,
}

impl<T: EventData> Event<T> {
    /// Create a typed event stamped with the current time
    pub fn typed(data: T, context: Context) -> Self {
        Self {
            event_type: T::event_type().to_string(),
            data,
            time_fired: Utc::now(),
            context,
        }
    }
}

/// Payload of a `state_changed` event
///
/// `old_state` is `None` for a newly created entity and `new_state` is
/// `None` for a removed one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangedData {
    pub entity_id: EntityId,
    pub old_state: Option<State>,
    pub new_state: Option<State>,
}

impl EventData for StateChangedData {
    fn event_type() -> &'static str {
        STATE_CHANGED
    }
}
