//! Occupancy controller
//!
//! A virtual binary sensor combining motion sensors, door sensors and other
//! presence entities (media players, computers, beds). Motion while every
//! door is closed means someone is inside a closed room: the `wasp_in_box`
//! state holds occupancy without a timer until a door opens.
//!
//! Door sensors follow the binary sensor convention: `on` is open.

use super::ordered_ids;
use crate::engine::{Engine, Machine};
use crate::error::ControllerResult;
use crate::required::RequiredConditions;
use async_trait::async_trait;
use smartify_config::ControllerConfig;
use smartify_core::{EntityId, State, STATE_OFF, STATE_ON};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OccupancyState {
    Unoccupied,
    Motion,
    WaspInBox,
    Other,
}

impl OccupancyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyState::Unoccupied => "unoccupied",
            OccupancyState::Motion => "motion",
            OccupancyState::WaspInBox => "wasp_in_box",
            OccupancyState::Other => "other",
        }
    }
}

impl fmt::Display for OccupancyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events fed to the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OccupancyEvent {
    Motion,
    Timer,
    Update,
    DoorOpen,
}

impl OccupancyEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyEvent::Motion => "motion",
            OccupancyEvent::Timer => "timer",
            OccupancyEvent::Update => "update",
            OccupancyEvent::DoorOpen => "door_open",
        }
    }
}

impl fmt::Display for OccupancyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Occupancy {
    sensor_name: String,
    controlled_entity: Option<EntityId>,
    motion_sensors: Vec<EntityId>,
    motion_off_period: Option<Duration>,
    other_entities: Vec<EntityId>,
    door_sensors: Vec<EntityId>,
    required: RequiredConditions,
}

impl Occupancy {
    pub fn from_config(config: &ControllerConfig) -> ControllerResult<Self> {
        Ok(Self {
            sensor_name: config.require(&config.sensor_name, "sensor_name")?.clone(),
            controlled_entity: config.controlled_entity.clone(),
            motion_sensors: config.motion_sensors.clone(),
            motion_off_period: config.motion_off_period(),
            other_entities: config.other_entities.clone(),
            door_sensors: config.door_sensors.clone(),
            required: RequiredConditions::new(&config.required_on_entities, &config.required_off_entities),
        })
    }

    fn have_other(&self, engine: &Engine<OccupancyState>) -> bool {
        self.other_entities
            .iter()
            .any(|entity_id| engine.is_entity_state(Some(entity_id), STATE_ON))
    }

    /// At least one door sensor, and every one of them closed
    fn doors_closed(&self, engine: &Engine<OccupancyState>) -> bool {
        !self.door_sensors.is_empty()
            && self
                .door_sensors
                .iter()
                .all(|entity_id| engine.is_entity_state(Some(entity_id), STATE_OFF))
    }

    fn have_required(&self, engine: &Engine<OccupancyState>) -> bool {
        self.required.is_satisfied(&engine.host().states)
    }

    fn enter_unoccupied(&self, engine: &mut Engine<OccupancyState>) {
        engine.set_timer(None);
        engine.set_state(OccupancyState::Unoccupied);
    }

    /// Enter `motion`, restarting the motion-off timer
    fn enter_motion(&self, engine: &mut Engine<OccupancyState>) {
        engine.set_timer(self.motion_off_period);
        engine.set_state(OccupancyState::Motion);
    }

    fn enter_wasp_in_box(&self, engine: &mut Engine<OccupancyState>) {
        engine.set_timer(None);
        engine.set_state(OccupancyState::WaspInBox);
    }

    fn enter_other(&self, engine: &mut Engine<OccupancyState>) {
        engine.set_timer(None);
        engine.set_state(OccupancyState::Other);
    }

    fn on_motion(&self, engine: &mut Engine<OccupancyState>) {
        if self.doors_closed(engine) {
            self.enter_wasp_in_box(engine);
        } else {
            self.enter_motion(engine);
        }
    }
}

#[async_trait]
impl Machine for Occupancy {
    type State = OccupancyState;
    type Event = OccupancyEvent;

    fn title(&self) -> String {
        self.sensor_name.clone()
    }

    fn controlled_entity(&self) -> Option<EntityId> {
        self.controlled_entity.clone()
    }

    fn tracked_entity_ids(&self) -> Vec<EntityId> {
        ordered_ids(
            self.controlled_entity
                .iter()
                .chain(&self.motion_sensors)
                .chain(&self.other_entities)
                .chain(&self.door_sensors)
                .chain(self.required.entity_ids()),
        )
    }

    fn initial_state(&self) -> OccupancyState {
        OccupancyState::Unoccupied
    }

    fn is_on(state: OccupancyState) -> bool {
        state != OccupancyState::Unoccupied
    }

    fn on_state_change(&mut self, _engine: &Engine<OccupancyState>, state: &State) -> Option<OccupancyEvent> {
        let entity_id = &state.entity_id;
        let on = state.state == STATE_ON;

        if self.motion_sensors.contains(entity_id) {
            on.then_some(OccupancyEvent::Motion)
        } else if self.other_entities.contains(entity_id) {
            state.is_on_off().then_some(OccupancyEvent::Update)
        } else if self.door_sensors.contains(entity_id) {
            on.then_some(OccupancyEvent::DoorOpen)
        } else if self.required.contains(entity_id) {
            state.is_on_off().then_some(OccupancyEvent::Update)
        } else {
            None
        }
    }

    fn on_timer_expired(&self) -> OccupancyEvent {
        OccupancyEvent::Timer
    }

    async fn on_event(
        &mut self,
        engine: &mut Engine<OccupancyState>,
        event: OccupancyEvent,
    ) -> ControllerResult<()> {
        use OccupancyEvent as E;
        use OccupancyState as S;

        match (engine.state(), event) {
            (S::Unoccupied, E::Motion) if self.have_required(engine) => self.on_motion(engine),

            (S::Unoccupied, E::Update) if self.have_required(engine) => {
                if self.have_other(engine) {
                    self.enter_other(engine);
                }
            }

            (S::Motion, E::Motion) | (S::Other, E::Motion) => self.on_motion(engine),

            (S::Motion, E::Timer) => {
                if self.have_other(engine) {
                    self.enter_other(engine);
                } else {
                    self.enter_unoccupied(engine);
                }
            }

            (S::Motion, E::Update) | (S::WaspInBox, E::Update) if !self.have_required(engine) => {
                self.enter_unoccupied(engine)
            }

            (S::WaspInBox, E::DoorOpen) => self.enter_motion(engine),

            (S::Other, E::Update) => {
                if !(self.have_other(engine) && self.have_required(engine)) {
                    self.enter_unoccupied(engine);
                }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::testing::FakeHost;
    use crate::engine::Controller;
    use smartify_config::ControllerType;

    fn ids(list: &[&str]) -> Vec<EntityId> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn config() -> ControllerConfig {
        let mut config = ControllerConfig::new(ControllerType::Occupancy);
        config.sensor_name = Some("Office".into());
        config.motion_sensors = ids(&["binary_sensor.office_motion"]);
        config.door_sensors = ids(&["binary_sensor.office_door", "binary_sensor.closet_door"]);
        config.other_entities = ids(&["media_player.office_speaker"]);
        config.motion_off_minutes = Some(5.0);
        config
    }

    async fn started(fake: &FakeHost, config: &ControllerConfig) -> (Controller<Occupancy>, crate::engine::StateChanges) {
        let mut controller = Controller::new(fake.host.clone(), Occupancy::from_config(config).unwrap());
        let changes = controller.setup().await.unwrap();
        (controller, changes)
    }

    #[test]
    fn test_is_on() {
        assert!(!Occupancy::is_on(OccupancyState::Unoccupied));
        assert!(Occupancy::is_on(OccupancyState::Motion));
        assert!(Occupancy::is_on(OccupancyState::WaspInBox));
        assert!(Occupancy::is_on(OccupancyState::Other));
    }

    #[tokio::test]
    async fn test_doors_closed_needs_every_door() {
        let fake = FakeHost::new();
        fake.set("binary_sensor.office_door", "off");
        let (controller, _changes) = started(&fake, &config()).await;
        let machine = controller.machine();

        // Closet door unknown to the host
        assert!(!machine.doors_closed(controller.engine()));

        fake.set("binary_sensor.closet_door", "off");
        assert!(machine.doors_closed(controller.engine()));

        fake.set("binary_sensor.office_door", "on");
        assert!(!machine.doors_closed(controller.engine()));

        let mut no_doors = config();
        no_doors.door_sensors.clear();
        let (controller, _changes) = started(&fake, &no_doors).await;
        assert!(!controller.machine().doors_closed(controller.engine()));
    }

    #[tokio::test]
    async fn test_other_presence_without_motion() {
        let fake = FakeHost::new();
        fake.set("media_player.office_speaker", "off");
        let (mut controller, mut changes) = started(&fake, &config()).await;
        assert_eq!(controller.state(), OccupancyState::Unoccupied);

        fake.set("media_player.office_speaker", "on");
        controller.handle_state_changed(changes.try_recv().unwrap()).await;
        assert_eq!(controller.state(), OccupancyState::Other);
        assert!(controller.view().is_on());

        fake.set("media_player.office_speaker", "off");
        controller.handle_state_changed(changes.try_recv().unwrap()).await;
        assert_eq!(controller.state(), OccupancyState::Unoccupied);
    }

    #[tokio::test]
    async fn test_required_gate() {
        let fake = FakeHost::new();
        let mut config = config();
        config.required_off_entities = ids(&["input_boolean.away_mode"]);
        fake.set("input_boolean.away_mode", "on");
        let (mut controller, mut changes) = started(&fake, &config).await;

        fake.set("binary_sensor.office_motion", "on");
        controller.handle_state_changed(changes.try_recv().unwrap()).await;
        assert_eq!(controller.state(), OccupancyState::Unoccupied);

        fake.set("input_boolean.away_mode", "off");
        controller.handle_state_changed(changes.try_recv().unwrap()).await;
        fake.set("binary_sensor.office_motion", "off");
        fake.set("binary_sensor.office_motion", "on");
        while let Ok(change) = changes.try_recv() {
            controller.handle_state_changed(change).await;
        }
        assert_eq!(controller.state(), OccupancyState::Motion);

        // Losing the gate clears occupancy
        fake.set("input_boolean.away_mode", "on");
        controller.handle_state_changed(changes.try_recv().unwrap()).await;
        assert_eq!(controller.state(), OccupancyState::Unoccupied);
        assert!(!controller.engine().timer().is_pending());
    }
}
