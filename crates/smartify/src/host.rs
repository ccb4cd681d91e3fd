//! Handles to the hosting platform

use smartify_core::units;
use smartify_event_bus::SharedEventBus;
use smartify_service_registry::SharedServiceRegistry;
use smartify_state_store::SharedStateStore;

/// The collaborators a controller talks to
///
/// Controllers read entity states from `states`, receive their changes from
/// `bus` and actuate devices through `services`.
#[derive(Clone)]
pub struct Host {
    pub bus: SharedEventBus,
    pub states: SharedStateStore,
    pub services: SharedServiceRegistry,
    /// Unit temperatures are expressed in when a sensor reports none
    pub temperature_unit: String,
}

impl Host {
    pub fn new(bus: SharedEventBus, states: SharedStateStore, services: SharedServiceRegistry) -> Self {
        Self {
            bus,
            states,
            services,
            temperature_unit: units::CELSIUS.to_string(),
        }
    }

    pub fn with_temperature_unit(mut self, unit: impl Into<String>) -> Self {
        self.temperature_unit = unit.into();
        self
    }
}
