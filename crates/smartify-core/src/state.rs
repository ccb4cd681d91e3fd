//! State type representing an entity's current value

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{attributes, Context, EntityId, IGNORE_STATES, ON_OFF_STATES};

/// The state of an entity at a point in time
///
/// The value is always a string (`"on"`, `"23.5"`, `"unavailable"`);
/// units, display names and actuator details travel as attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// The entity this state belongs to
    pub entity_id: EntityId,

    /// The state value
    pub state: String,

    /// Additional attributes associated with the state
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the value last changed
    pub last_changed: DateTime<Utc>,

    /// When the state was last written, even if unchanged
    pub last_updated: DateTime<Utc>,

    /// Context of the change that produced this state
    pub context: Context,
}

impl State {
    /// Create a new state stamped with the current time
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Derive the next state, keeping `last_changed` when the value is the same
    pub fn with_update(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        let new_state = new_state.into();
        let last_changed = if self.state == new_state {
            self.last_changed
        } else {
            now
        };

        Self {
            entity_id: self.entity_id.clone(),
            state: new_state,
            attributes: new_attributes,
            last_changed,
            last_updated: now,
            context,
        }
    }

    /// Whether the value is a placeholder (`unknown`/`unavailable`)
    pub fn is_transient(&self) -> bool {
        IGNORE_STATES.contains(&self.state.as_str())
    }

    /// Whether the value is `on` or `off`
    pub fn is_on_off(&self) -> bool {
        ON_OFF_STATES.contains(&self.state.as_str())
    }

    /// Display name: the `friendly_name` attribute, else the entity id
    pub fn name(&self) -> String {
        self.attribute::<String>(attributes::FRIENDLY_NAME)
            .unwrap_or_else(|| self.entity_id.to_string())
    }

    /// The `unit_of_measurement` attribute, if reported
    pub fn unit(&self) -> Option<String> {
        self.attribute(attributes::UNIT_OF_MEASUREMENT)
    }

    /// Get an attribute value by key
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps and context are not part of the semantic value
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}
