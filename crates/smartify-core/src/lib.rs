//! Core types for Smartify
//!
//! This crate holds the value types exchanged between the Smartify control
//! core and the platform hosting it: entity identifiers, entity states,
//! state-change events, service calls, and the [`Context`] that ties a state
//! change back to the call that caused it.

mod context;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::{Event, EventData, StateChangedData};
pub use service_call::ServiceCall;
pub use state::State;

/// State value of an entity that is switched on
pub const STATE_ON: &str = "on";

/// State value of an entity that is switched off
pub const STATE_OFF: &str = "off";

/// Placeholder reported before an entity has a real value
pub const STATE_UNKNOWN: &str = "unknown";

/// Placeholder reported while an entity cannot be reached
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Transient values that never reach a controller
pub const IGNORE_STATES: [&str; 2] = [STATE_UNKNOWN, STATE_UNAVAILABLE];

/// Values of a binary entity
pub const ON_OFF_STATES: [&str; 2] = [STATE_ON, STATE_OFF];

/// Well-known entity attribute keys
pub mod attributes {
    pub const ENTITY_ID: &str = "entity_id";
    pub const FRIENDLY_NAME: &str = "friendly_name";
    pub const UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";
    pub const PERCENTAGE: &str = "percentage";
    pub const PERCENTAGE_STEP: &str = "percentage_step";
    pub const BRIGHTNESS_PCT: &str = "brightness_pct";
}

/// Actuator domains and the services the controllers call on them
pub mod services {
    pub const DOMAIN_FAN: &str = "fan";
    pub const DOMAIN_LIGHT: &str = "light";

    pub const TURN_ON: &str = "turn_on";
    pub const TURN_OFF: &str = "turn_off";
    pub const SET_PERCENTAGE: &str = "set_percentage";
}

/// Units of measurement understood by the helpers
pub mod units {
    pub const CELSIUS: &str = "°C";
    pub const FAHRENHEIT: &str = "°F";
    pub const PERCENTAGE: &str = "%";
    pub const GRAMS_PER_CUBIC_METER: &str = "g/m³";
}
