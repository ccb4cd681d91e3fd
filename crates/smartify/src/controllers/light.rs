//! Light controller
//!
//! Follows a binary trigger entity (usually a motion or occupancy sensor).
//! The trigger turns the light on when it is dark enough and every required
//! condition holds, and always turns it off again. A light switched on by
//! hand enters `on_manual` and is turned off by the auto-off timer.

use super::ordered_ids;
use crate::engine::{Engine, Machine};
use crate::error::ControllerResult;
use crate::required::RequiredConditions;
use async_trait::async_trait;
use serde_json::json;
use smartify_config::ControllerConfig;
use smartify_core::{attributes, services, EntityId, State, STATE_OFF, STATE_ON};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightState {
    Init,
    Off,
    On,
    OnManual,
    OffManual,
}

impl LightState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightState::Init => "init",
            LightState::Off => "off",
            LightState::On => "on",
            LightState::OnManual => "on_manual",
            LightState::OffManual => "off_manual",
        }
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events fed to the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightEvent {
    Off,
    On,
    TriggerOff,
    TriggerOn,
    Timer,
}

impl LightEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightEvent::Off => "off",
            LightEvent::On => "on",
            LightEvent::TriggerOff => "trigger_off",
            LightEvent::TriggerOn => "trigger_on",
            LightEvent::Timer => "timer",
        }
    }
}

impl fmt::Display for LightEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Light {
    controlled_entity: EntityId,
    brightness_pct: Option<f64>,
    trigger_entity: Option<EntityId>,
    illuminance_sensor: Option<EntityId>,
    illuminance_cutoff: Option<f64>,
    auto_off_period: Option<Duration>,
    required: RequiredConditions,
}

impl Light {
    pub fn from_config(config: &ControllerConfig) -> ControllerResult<Self> {
        Ok(Self {
            controlled_entity: config.require(&config.controlled_entity, "controlled_entity")?.clone(),
            brightness_pct: config.brightness_pct,
            trigger_entity: config.trigger_entity.clone(),
            illuminance_sensor: config.illuminance_sensor.clone(),
            illuminance_cutoff: config.illuminance_cutoff,
            auto_off_period: config.auto_off_period(),
            required: RequiredConditions::new(&config.required_on_entities, &config.required_off_entities),
        })
    }

    /// No sensor, no cutoff, or a reading at or below the cutoff
    fn acceptable_illuminance(&self, engine: &Engine<LightState>) -> bool {
        let (Some(sensor), Some(cutoff)) = (&self.illuminance_sensor, self.illuminance_cutoff) else {
            return true;
        };
        let Some(state) = engine.entity_state(sensor) else {
            return true;
        };

        match state.state.trim().parse::<f64>() {
            Ok(lux) if lux.is_finite() => lux <= cutoff,
            _ => {
                warn!(
                    controller = %engine.name(),
                    "{} reported non-numeric value '{}'",
                    sensor,
                    state.state
                );
                false
            }
        }
    }

    async fn set_light_mode(&self, engine: &mut Engine<LightState>, on: bool) -> ControllerResult<()> {
        let mut data = serde_json::Map::new();
        if let (true, Some(brightness)) = (on, self.brightness_pct) {
            data.insert(attributes::BRIGHTNESS_PCT.to_string(), json!(brightness));
        }
        let service = if on { services::TURN_ON } else { services::TURN_OFF };

        engine
            .service_call(services::DOMAIN_LIGHT, service, serde_json::Value::Object(data))
            .await
    }
}

#[async_trait]
impl Machine for Light {
    type State = LightState;
    type Event = LightEvent;

    fn title(&self) -> String {
        self.controlled_entity.to_string()
    }

    fn controlled_entity(&self) -> Option<EntityId> {
        Some(self.controlled_entity.clone())
    }

    fn tracked_entity_ids(&self) -> Vec<EntityId> {
        ordered_ids(std::iter::once(&self.controlled_entity).chain(self.trigger_entity.as_ref()))
    }

    fn initial_state(&self) -> LightState {
        LightState::Init
    }

    fn is_on(state: LightState) -> bool {
        state == LightState::On
    }

    fn on_state_change(&mut self, _engine: &Engine<LightState>, state: &State) -> Option<LightEvent> {
        if !state.is_on_off() {
            return None;
        }
        let on = state.state == STATE_ON;

        if state.entity_id == self.controlled_entity {
            Some(if on { LightEvent::On } else { LightEvent::Off })
        } else if self.trigger_entity.as_ref() == Some(&state.entity_id) {
            Some(if on {
                LightEvent::TriggerOn
            } else {
                LightEvent::TriggerOff
            })
        } else {
            None
        }
    }

    fn on_timer_expired(&self) -> LightEvent {
        LightEvent::Timer
    }

    async fn on_event(&mut self, engine: &mut Engine<LightState>, event: LightEvent) -> ControllerResult<()> {
        use LightEvent as E;
        use LightState as S;

        match (engine.state(), event) {
            (S::Init, E::Off) => engine.set_state(S::Off),

            (S::Init, E::On) | (S::Off, E::On) => {
                if engine.is_entity_state(self.trigger_entity.as_ref(), STATE_ON) {
                    engine.set_state(S::On);
                } else {
                    engine.set_state(S::OnManual);
                    engine.set_timer(self.auto_off_period);
                }
            }

            (S::Off, E::TriggerOn) => {
                if self.acceptable_illuminance(engine) && self.required.is_satisfied(&engine.host().states) {
                    engine.set_state(S::On);
                    self.set_light_mode(engine, true).await?;
                }
            }

            (S::On, E::Off) => {
                if engine.is_entity_state(self.trigger_entity.as_ref(), STATE_OFF) {
                    engine.set_state(S::Off);
                } else {
                    engine.set_state(S::OffManual);
                    engine.set_timer(None);
                }
            }

            (S::On, E::TriggerOff) => {
                engine.set_state(S::Off);
                engine.set_timer(None);
                self.set_light_mode(engine, false).await?;
            }

            (S::On, E::Timer) | (S::OnManual, E::Timer) => {
                engine.set_state(S::Off);
                self.set_light_mode(engine, false).await?;
            }

            (S::OffManual, E::On) => engine.set_state(S::On),

            (S::OffManual, E::TriggerOff) => engine.set_state(S::Off),

            (S::OnManual, E::Off) => {
                engine.set_state(S::Off);
                engine.set_timer(None);
            }

            (S::OnManual, E::TriggerOn) => {
                engine.set_state(S::On);
                engine.set_timer(None);
            }

            (state, event) => debug!(
                controller = %engine.name(),
                state = %state,
                "Ignored '{}' event",
                event
            ),
        }
        Ok(())
    }
}
