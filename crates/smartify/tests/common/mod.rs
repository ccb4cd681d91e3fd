//! Test host for the controller integration tests
//!
//! Provides an isolated host with fake `fan` and `light` services. The fake
//! services record every call and write back the state the real device
//! would report, carrying the caller's context the way a device integration
//! does.

#![allow(dead_code)]

use serde_json::json;
use smartify::{build_controller, ControllerHandle, Host};
use smartify_config::{ControllerConfig, Value};
use smartify_core::{attributes, services, Context, EntityId, ServiceCall, State, STATE_OFF, STATE_ON};
use smartify_event_bus::EventBus;
use smartify_service_registry::ServiceRegistry;
use smartify_state_store::StateStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A test host with captured service calls
pub struct TestHass {
    pub host: Host,
    captured_service_calls: Arc<Mutex<Vec<ServiceCall>>>,
}

impl TestHass {
    /// Create a test host using `°C`
    pub fn new() -> Self {
        Self::with_temperature_unit("°C")
    }

    pub fn with_temperature_unit(unit: &str) -> Self {
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateStore::new(bus.clone()));
        let services = Arc::new(ServiceRegistry::new());
        let captured_service_calls = Arc::new(Mutex::new(Vec::new()));

        for domain in [services::DOMAIN_FAN, services::DOMAIN_LIGHT] {
            for service in [services::TURN_ON, services::TURN_OFF, services::SET_PERCENTAGE] {
                let states = states.clone();
                let captured = captured_service_calls.clone();
                services.register(domain, service, move |call: ServiceCall| {
                    let states = states.clone();
                    let captured = captured.clone();
                    async move {
                        report_device_state(&states, &call);
                        captured.lock().unwrap().push(call);
                        Ok(())
                    }
                });
            }
        }

        Self {
            host: Host::new(bus, states, services).with_temperature_unit(unit),
            captured_service_calls,
        }
    }

    /// Set the state of an entity, as an external change
    pub fn set_state(&self, entity_id: &str, state: &str) -> State {
        self.set_state_with(entity_id, state, HashMap::new())
    }

    pub fn set_state_with(
        &self,
        entity_id: &str,
        state: &str,
        attributes: HashMap<String, serde_json::Value>,
    ) -> State {
        let entity_id: EntityId = entity_id.parse().expect("Invalid entity_id");
        self.host.states.set(entity_id, state, attributes, Context::new())
    }

    /// Assert that an entity is in a specific state
    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        let state = self.host.states.get_state(entity_id);
        assert_eq!(
            state.as_deref(),
            Some(expected),
            "Expected entity {} to be in state '{}', but was {:?}",
            entity_id,
            expected,
            state
        );
    }

    /// Start a controller from a YAML mapping
    pub async fn start(&self, yaml: &str) -> ControllerHandle {
        let value: Value = serde_yaml::from_str(yaml).expect("Invalid YAML");
        let config = ControllerConfig::from_yaml(value).expect("Invalid controller config");
        build_controller(&self.host, &config)
            .expect("Controller failed to build")
            .start()
            .await
    }

    pub fn captured_service_calls(&self) -> Vec<ServiceCall> {
        self.captured_service_calls.lock().unwrap().clone()
    }

    /// `domain.service` of every captured call, in order
    pub fn service_ids(&self) -> Vec<String> {
        self.captured_service_calls()
            .iter()
            .map(ServiceCall::service_id)
            .collect()
    }

    /// Percentages of every captured `set_percentage` call
    pub fn percentages(&self) -> Vec<i64> {
        self.captured_service_calls()
            .iter()
            .filter(|call| call.service == services::SET_PERCENTAGE)
            .filter_map(|call| call.get::<i64>(attributes::PERCENTAGE))
            .collect()
    }

    pub fn clear_service_calls(&self) {
        self.captured_service_calls.lock().unwrap().clear();
    }
}

impl Default for TestHass {
    fn default() -> Self {
        Self::new()
    }
}

/// Let controller tasks drain their queues
///
/// Tests run with paused time, so this only moves the clock by a few
/// milliseconds.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn fan_attributes(percentage_step: f64) -> HashMap<String, serde_json::Value> {
    HashMap::from([(attributes::PERCENTAGE_STEP.to_string(), json!(percentage_step))])
}

fn report_device_state(states: &StateStore, call: &ServiceCall) {
    for entity_id in call.entity_ids() {
        let mut attrs = states
            .get(&entity_id)
            .map(|s| s.attributes)
            .unwrap_or_default();

        let value = if call.service == services::SET_PERCENTAGE {
            let percentage = call.get::<f64>(attributes::PERCENTAGE).unwrap_or(0.0);
            attrs.insert(attributes::PERCENTAGE.to_string(), json!(percentage));
            if percentage > 0.0 {
                STATE_ON
            } else {
                STATE_OFF
            }
        } else if call.service == services::TURN_ON {
            STATE_ON
        } else {
            STATE_OFF
        };

        let entity_id: EntityId = entity_id.parse().expect("Invalid entity_id");
        states.set(entity_id, value, attrs, call.context.clone());
    }
}
