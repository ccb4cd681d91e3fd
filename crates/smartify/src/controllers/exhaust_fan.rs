//! Exhaust fan controller
//!
//! Compares the absolute humidity of the room with a reference (another room
//! or outdoors) and switches the fan with hysteresis: on when the difference
//! rises above the rising threshold, off when it falls below the falling
//! threshold.

use super::{ordered_ids, read_measurement};
use crate::engine::{Engine, Machine};
use crate::error::ControllerResult;
use crate::util::{absolute_humidity, Measurement};
use async_trait::async_trait;
use serde_json::json;
use smartify_config::ControllerConfig;
use smartify_core::{services, units, EntityId, State, STATE_OFF, STATE_ON};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExhaustFanState {
    Init,
    Off,
    On,
    OnManual,
    OffManual,
}

impl ExhaustFanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExhaustFanState::Init => "init",
            ExhaustFanState::Off => "off",
            ExhaustFanState::On => "on",
            ExhaustFanState::OnManual => "on_manual",
            ExhaustFanState::OffManual => "off_manual",
        }
    }
}

impl fmt::Display for ExhaustFanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events fed to the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExhaustFanEvent {
    Off,
    On,
    Timer,
    Refresh,
}

impl ExhaustFanEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExhaustFanEvent::Off => "off",
            ExhaustFanEvent::On => "on",
            ExhaustFanEvent::Timer => "timer",
            ExhaustFanEvent::Refresh => "refresh",
        }
    }
}

impl fmt::Display for ExhaustFanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ExhaustFan {
    controlled_entity: EntityId,
    temp_sensor: EntityId,
    humidity_sensor: EntityId,
    ref_temp_sensor: EntityId,
    ref_humidity_sensor: EntityId,
    rising_threshold: f64,
    falling_threshold: f64,
    manual_control_period: Option<Duration>,
    temp: Option<Measurement>,
    humidity: Option<Measurement>,
    ref_temp: Option<Measurement>,
    ref_humidity: Option<Measurement>,
}

impl ExhaustFan {
    pub fn from_config(config: &ControllerConfig) -> ControllerResult<Self> {
        Ok(Self {
            controlled_entity: config.require(&config.controlled_entity, "controlled_entity")?.clone(),
            temp_sensor: config.require(&config.temp_sensor, "temp_sensor")?.clone(),
            humidity_sensor: config.require(&config.humidity_sensor, "humidity_sensor")?.clone(),
            ref_temp_sensor: config
                .require(&config.reference_temp_sensor, "reference_temp_sensor")?
                .clone(),
            ref_humidity_sensor: config
                .require(&config.reference_humidity_sensor, "reference_humidity_sensor")?
                .clone(),
            rising_threshold: config.rising_threshold(),
            falling_threshold: config.falling_threshold(),
            manual_control_period: config.manual_control_period(),
            temp: None,
            humidity: None,
            ref_temp: None,
            ref_humidity: None,
        })
    }

    /// Local minus reference absolute humidity, once all four readings are known
    fn humidity_difference(&self) -> Option<f64> {
        match (&self.temp, &self.humidity, &self.ref_temp, &self.ref_humidity) {
            (Some(temp), Some(humidity), Some(ref_temp), Some(ref_humidity)) => Some(
                absolute_humidity(temp, humidity.value) - absolute_humidity(ref_temp, ref_humidity.value),
            ),
            _ => None,
        }
    }

    /// Apply hysteresis to the fan; returns whether it should run
    async fn set_fan_mode(&self, engine: &mut Engine<ExhaustFanState>) -> ControllerResult<bool> {
        let Some(difference) = self.humidity_difference() else {
            return Ok(false);
        };

        let Some(fan) = engine.entity_state(&self.controlled_entity) else {
            warn!(controller = %engine.name(), "Controlled entity '{}' is missing", self.controlled_entity);
            return Ok(false);
        };
        let curr_mode = fan.state.as_str();

        let new_mode = if curr_mode == STATE_OFF && difference > self.rising_threshold {
            STATE_ON
        } else if curr_mode == STATE_ON && difference < self.falling_threshold {
            STATE_OFF
        } else {
            curr_mode
        };

        if new_mode != curr_mode {
            debug!(
                controller = %engine.name(),
                state = %engine.state(),
                "Turning fan {} for humidity difference {:.2} {}",
                new_mode,
                difference,
                units::GRAMS_PER_CUBIC_METER
            );
            let service = if new_mode == STATE_ON {
                services::TURN_ON
            } else {
                services::TURN_OFF
            };
            engine
                .service_call(services::DOMAIN_FAN, service, json!({}))
                .await?;
        }

        Ok(new_mode == STATE_ON)
    }

    async fn resume(&self, engine: &mut Engine<ExhaustFanState>) -> ControllerResult<()> {
        let fan_on = self.set_fan_mode(engine).await?;
        engine.set_state(if fan_on {
            ExhaustFanState::On
        } else {
            ExhaustFanState::Off
        });
        Ok(())
    }
}

#[async_trait]
impl Machine for ExhaustFan {
    type State = ExhaustFanState;
    type Event = ExhaustFanEvent;

    fn title(&self) -> String {
        self.controlled_entity.to_string()
    }

    fn controlled_entity(&self) -> Option<EntityId> {
        Some(self.controlled_entity.clone())
    }

    fn tracked_entity_ids(&self) -> Vec<EntityId> {
        ordered_ids([
            &self.controlled_entity,
            &self.temp_sensor,
            &self.humidity_sensor,
            &self.ref_temp_sensor,
            &self.ref_humidity_sensor,
        ])
    }

    fn initial_state(&self) -> ExhaustFanState {
        ExhaustFanState::Init
    }

    fn is_on(state: ExhaustFanState) -> bool {
        state == ExhaustFanState::On
    }

    fn setup_event(&self) -> Option<ExhaustFanEvent> {
        Some(ExhaustFanEvent::Refresh)
    }

    fn on_state_change(&mut self, engine: &Engine<ExhaustFanState>, state: &State) -> Option<ExhaustFanEvent> {
        let entity_id = &state.entity_id;
        let temperature_unit = engine.host().temperature_unit.as_str();

        if *entity_id == self.controlled_entity {
            if !state.is_on_off() {
                return None;
            }
            return Some(if state.state == STATE_ON {
                ExhaustFanEvent::On
            } else {
                ExhaustFanEvent::Off
            });
        }

        if *entity_id == self.temp_sensor {
            self.temp = read_measurement(engine.name(), state, temperature_unit);
        } else if *entity_id == self.humidity_sensor {
            self.humidity = read_measurement(engine.name(), state, units::PERCENTAGE);
        } else if *entity_id == self.ref_temp_sensor {
            self.ref_temp = read_measurement(engine.name(), state, temperature_unit);
        } else if *entity_id == self.ref_humidity_sensor {
            self.ref_humidity = read_measurement(engine.name(), state, units::PERCENTAGE);
        } else {
            return None;
        }
        Some(ExhaustFanEvent::Refresh)
    }

    fn on_timer_expired(&self) -> ExhaustFanEvent {
        ExhaustFanEvent::Timer
    }

    async fn on_event(
        &mut self,
        engine: &mut Engine<ExhaustFanState>,
        event: ExhaustFanEvent,
    ) -> ControllerResult<()> {
        use ExhaustFanEvent as E;
        use ExhaustFanState as S;

        match (engine.state(), event) {
            (S::Init, E::Off) => engine.set_state(S::Off),

            (S::Init, E::On) => engine.set_state(S::On),

            (S::Off, E::On) => {
                engine.set_state(if self.manual_control_period.is_some() {
                    S::OnManual
                } else {
                    S::On
                });
                engine.set_timer(self.manual_control_period);
            }

            (S::Off, E::Refresh) => {
                if self.set_fan_mode(engine).await? {
                    engine.set_state(S::On);
                }
            }

            (S::On, E::Off) => {
                engine.set_state(if self.manual_control_period.is_some() {
                    S::OffManual
                } else {
                    S::Off
                });
                engine.set_timer(self.manual_control_period);
            }

            (S::On, E::Refresh) => {
                if !self.set_fan_mode(engine).await? {
                    engine.set_state(S::Off);
                }
            }

            (S::OffManual, E::On) | (S::OnManual, E::Off) => {
                engine.set_timer(None);
                self.resume(engine).await?;
            }

            (S::OffManual, E::Timer) | (S::OnManual, E::Timer) => self.resume(engine).await?,

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
