//! Ceiling fan controller
//!
//! Sets the fan speed from the summer simmer index (SSI) of the room. The
//! SSI range maps linearly onto the speed range; below the range the fan is
//! off. An external on/off of the fan suspends automatic control for the
//! manual control period.

use super::{ordered_ids, read_measurement};
use crate::engine::{Engine, Machine};
use crate::error::ControllerResult;
use crate::required::RequiredConditions;
use crate::util::{convert_temperature, extrapolate_value, summer_simmer_index, Measurement};
use async_trait::async_trait;
use serde_json::json;
use smartify_config::{
    ControllerConfig, DEFAULT_CEILING_SSI_MAX_FAHRENHEIT, DEFAULT_CEILING_SSI_MIN_FAHRENHEIT,
};
use smartify_core::{attributes, services, units, EntityId, State, STATE_ON};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CeilingFanState {
    Init,
    Off,
    On,
    OnManual,
    OffManual,
}

impl CeilingFanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CeilingFanState::Init => "init",
            CeilingFanState::Off => "off",
            CeilingFanState::On => "on",
            CeilingFanState::OnManual => "on_manual",
            CeilingFanState::OffManual => "off_manual",
        }
    }
}

impl fmt::Display for CeilingFanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events fed to the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CeilingFanEvent {
    Off,
    On,
    Timer,
    Refresh,
}

impl CeilingFanEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CeilingFanEvent::Off => "off",
            CeilingFanEvent::On => "on",
            CeilingFanEvent::Timer => "timer",
            CeilingFanEvent::Refresh => "refresh",
        }
    }
}

impl fmt::Display for CeilingFanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CeilingFan {
    controlled_entity: EntityId,
    temp_sensor: EntityId,
    humidity_sensor: EntityId,
    ssi_range: (f64, f64),
    speed_range: (f64, f64),
    manual_control_period: Option<Duration>,
    required: RequiredConditions,
    /// Last on/off value of each required entity
    required_states: HashMap<EntityId, String>,
    temp: Option<Measurement>,
    humidity: Option<Measurement>,
}

impl CeilingFan {
    /// `temperature_unit` is the unit the SSI range is expressed in
    pub fn from_config(config: &ControllerConfig, temperature_unit: &str) -> ControllerResult<Self> {
        let default_ssi = |fahrenheit: f64| {
            (convert_temperature(fahrenheit, units::FAHRENHEIT, temperature_unit) * 10.0).round() / 10.0
        };

        Ok(Self {
            controlled_entity: config.require(&config.controlled_entity, "controlled_entity")?.clone(),
            temp_sensor: config.require(&config.temp_sensor, "temp_sensor")?.clone(),
            humidity_sensor: config.require(&config.humidity_sensor, "humidity_sensor")?.clone(),
            ssi_range: (
                config.ssi_min.unwrap_or_else(|| default_ssi(DEFAULT_CEILING_SSI_MIN_FAHRENHEIT)),
                config.ssi_max.unwrap_or_else(|| default_ssi(DEFAULT_CEILING_SSI_MAX_FAHRENHEIT)),
            ),
            speed_range: (
                *config.require(&config.speed_min, "speed_min")?,
                *config.require(&config.speed_max, "speed_max")?,
            ),
            manual_control_period: config.manual_control_period(),
            required: RequiredConditions::new(&config.required_on_entities, &config.required_off_entities),
            required_states: HashMap::new(),
            temp: None,
            humidity: None,
        })
    }

    fn have_required(&self) -> bool {
        self.required
            .is_satisfied_with(|entity_id| self.required_states.get(entity_id).cloned())
    }

    /// Compute the speed and set it if it changed; returns whether the fan should run
    async fn update_fan_speed(&self, engine: &mut Engine<CeilingFanState>) -> ControllerResult<bool> {
        let (Some(temp), Some(humidity)) = (&self.temp, &self.humidity) else {
            return Ok(false);
        };

        let ssi = summer_simmer_index(temp, humidity.value, &engine.host().temperature_unit);
        let ssi_speed = extrapolate_value(ssi, self.ssi_range, self.speed_range, Some(0.0), None);

        let Some(fan) = engine.entity_state(&self.controlled_entity) else {
            warn!(controller = %engine.name(), "Controlled entity '{}' is missing", self.controlled_entity);
            return Ok(false);
        };

        let speed_step = fan
            .attribute::<f64>(attributes::PERCENTAGE_STEP)
            .filter(|step| *step > 0.0)
            .unwrap_or(100.0);

        let curr_speed = if fan.state == STATE_ON {
            fan.attribute::<f64>(attributes::PERCENTAGE).unwrap_or(100.0) as i64
        } else {
            0
        };

        let new_speed = if self.have_required() {
            quantize(ssi_speed, speed_step)
        } else {
            0
        };

        if new_speed != curr_speed {
            debug!(
                controller = %engine.name(),
                state = %engine.state(),
                "Changing speed to {} percent for SSI={:.1}",
                new_speed,
                ssi
            );
            engine
                .service_call(
                    services::DOMAIN_FAN,
                    services::SET_PERCENTAGE,
                    json!({ "percentage": new_speed }),
                )
                .await?;
        }

        Ok(new_speed > 0)
    }

    /// Recompute after leaving a manual state
    async fn resume(&self, engine: &mut Engine<CeilingFanState>) -> ControllerResult<()> {
        let fan_on = self.update_fan_speed(engine).await?;
        engine.set_state(if fan_on {
            CeilingFanState::On
        } else {
            CeilingFanState::Off
        });
        Ok(())
    }
}

/// Round a speed down to a whole number of steps
fn quantize(speed: f64, step: f64) -> i64 {
    let stepped = (speed / step).floor() * step;
    ((stepped * 1000.0).round() / 1000.0) as i64
}

#[async_trait]
impl Machine for CeilingFan {
    type State = CeilingFanState;
    type Event = CeilingFanEvent;

    fn title(&self) -> String {
        self.controlled_entity.to_string()
    }

    fn controlled_entity(&self) -> Option<EntityId> {
        Some(self.controlled_entity.clone())
    }

    fn tracked_entity_ids(&self) -> Vec<EntityId> {
        ordered_ids(
            [&self.controlled_entity, &self.temp_sensor, &self.humidity_sensor]
                .into_iter()
                .chain(self.required.entity_ids()),
        )
    }

    fn initial_state(&self) -> CeilingFanState {
        CeilingFanState::Init
    }

    fn is_on(state: CeilingFanState) -> bool {
        state == CeilingFanState::On
    }

    fn setup_event(&self) -> Option<CeilingFanEvent> {
        Some(CeilingFanEvent::Refresh)
    }

    fn poll(&self) -> Option<(Duration, CeilingFanEvent)> {
        Some((POLL_INTERVAL, CeilingFanEvent::Refresh))
    }

    fn on_state_change(&mut self, engine: &Engine<CeilingFanState>, state: &State) -> Option<CeilingFanEvent> {
        let entity_id = &state.entity_id;

        if *entity_id == self.controlled_entity && state.is_on_off() {
            Some(if state.state == STATE_ON {
                CeilingFanEvent::On
            } else {
                CeilingFanEvent::Off
            })
        } else if *entity_id == self.temp_sensor {
            self.temp = read_measurement(engine.name(), state, &engine.host().temperature_unit);
            None
        } else if *entity_id == self.humidity_sensor {
            self.humidity = read_measurement(engine.name(), state, units::PERCENTAGE);
            None
        } else if self.required.contains(entity_id) && state.is_on_off() {
            self.required_states.insert(entity_id.clone(), state.state.clone());
            Some(CeilingFanEvent::Refresh)
        } else {
            None
        }
    }

    fn on_timer_expired(&self) -> CeilingFanEvent {
        CeilingFanEvent::Timer
    }

    async fn on_event(
        &mut self,
        engine: &mut Engine<CeilingFanState>,
        event: CeilingFanEvent,
    ) -> ControllerResult<()> {
        use CeilingFanEvent as E;
        use CeilingFanState as S;

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
                if self.update_fan_speed(engine).await? {
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
                if !self.update_fan_speed(engine).await? {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::testing::FakeHost;
    use crate::engine::Controller;
    use smartify_config::ControllerType;
    use std::collections::HashMap;

    fn config() -> ControllerConfig {
        let mut config = ControllerConfig::new(ControllerType::CeilingFan);
        config.controlled_entity = Some("fan.bedroom".parse().unwrap());
        config.temp_sensor = Some("sensor.bedroom_temperature".parse().unwrap());
        config.humidity_sensor = Some("sensor.bedroom_humidity".parse().unwrap());
        config.speed_min = Some(0.0);
        config.speed_max = Some(100.0);
        config
    }

    fn fan_attrs(step: f64) -> HashMap<String, serde_json::Value> {
        HashMap::from([(attributes::PERCENTAGE_STEP.to_string(), json!(step))])
    }

    #[test]
    fn test_default_ssi_range_follows_host_unit() {
        let fan = CeilingFan::from_config(&config(), units::FAHRENHEIT).unwrap();
        assert_eq!(fan.ssi_range, (81.0, 91.0));

        let fan = CeilingFan::from_config(&config(), units::CELSIUS).unwrap();
        assert_eq!(fan.ssi_range, (27.2, 32.8));
    }

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(57.0, 100.0), 0);
        assert_eq!(quantize(100.0, 100.0), 100);
        assert_eq!(quantize(57.0, 25.0), 50);
        assert_eq!(quantize(66.666_67, 33.333_333), 66);
        assert_eq!(quantize(0.0, 10.0), 0);
    }

    #[test]
    fn test_tracked_entities() {
        let mut config = config();
        config.required_on_entities = vec!["binary_sensor.bed_occupied".parse().unwrap()];
        let fan = CeilingFan::from_config(&config, units::CELSIUS).unwrap();

        let tracked: Vec<String> = fan.tracked_entity_ids().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            tracked,
            [
                "fan.bedroom",
                "sensor.bedroom_temperature",
                "sensor.bedroom_humidity",
                "binary_sensor.bed_occupied"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_turns_fan_on_when_hot() {
        let fake = FakeHost::new();
        fake.set_with("fan.bedroom", "off", fan_attrs(25.0));
        fake.set("sensor.bedroom_temperature", "31");
        fake.set("sensor.bedroom_humidity", "40");

        let fan = CeilingFan::from_config(&config(), units::CELSIUS).unwrap();
        let mut controller = Controller::new(fake.host.clone(), fan);
        controller.setup().await;

        // INIT + OFF then REFRESH from OFF computes a speed
        assert_eq!(controller.state(), CeilingFanState::On);
        assert_eq!(fake.calls(), ["fan.set_percentage"]);
        let speed = fake.calls.lock().unwrap()[0].get::<i64>("percentage").unwrap();
        assert!(speed > 0 && speed % 25 == 0, "speed {speed}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cool_room_keeps_fan_off() {
        let fake = FakeHost::new();
        fake.set("fan.bedroom", "off");
        fake.set("sensor.bedroom_temperature", "20");
        fake.set("sensor.bedroom_humidity", "40");

        let fan = CeilingFan::from_config(&config(), units::CELSIUS).unwrap();
        let mut controller = Controller::new(fake.host.clone(), fan);
        controller.setup().await;

        assert_eq!(controller.state(), CeilingFanState::Off);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_temperature_keeps_fan_off() {
        let fake = FakeHost::new();
        fake.set("fan.bedroom", "off");
        fake.set("sensor.bedroom_temperature", "hot");
        fake.set("sensor.bedroom_humidity", "80");

        let fan = CeilingFan::from_config(&config(), units::CELSIUS).unwrap();
        let mut controller = Controller::new(fake.host.clone(), fan);
        controller.setup().await;

        assert!(controller.machine().temp.is_none());
        assert_eq!(controller.state(), CeilingFanState::Off);
        assert!(fake.calls().is_empty());
    }
}
