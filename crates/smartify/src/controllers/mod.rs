//! The four controller types

use crate::actor::ControllerHandle;
use crate::engine::Controller;
use crate::error::ControllerResult;
use crate::host::Host;
use crate::listeners::ControllerView;
use crate::util::{float_with_unit, Measurement};
use smartify_config::{ControllerConfig, ControllerType};
use smartify_core::{EntityId, State};
use tracing::warn;

mod ceiling_fan;
mod exhaust_fan;
mod light;
mod occupancy;

pub use ceiling_fan::{CeilingFan, CeilingFanEvent, CeilingFanState};
pub use exhaust_fan::{ExhaustFan, ExhaustFanEvent, ExhaustFanState};
pub use light::{Light, LightEvent, LightState};
pub use occupancy::{Occupancy, OccupancyEvent, OccupancyState};

/// A controller of any type, ready to start
pub enum AnyController {
    CeilingFan(Controller<CeilingFan>),
    ExhaustFan(Controller<ExhaustFan>),
    Light(Controller<Light>),
    Occupancy(Controller<Occupancy>),
}

impl AnyController {
    pub fn controller_type(&self) -> ControllerType {
        match self {
            AnyController::CeilingFan(_) => ControllerType::CeilingFan,
            AnyController::ExhaustFan(_) => ControllerType::ExhaustFan,
            AnyController::Light(_) => ControllerType::Light,
            AnyController::Occupancy(_) => ControllerType::Occupancy,
        }
    }

    pub fn view(&self) -> ControllerView {
        match self {
            AnyController::CeilingFan(c) => c.view(),
            AnyController::ExhaustFan(c) => c.view(),
            AnyController::Light(c) => c.view(),
            AnyController::Occupancy(c) => c.view(),
        }
    }

    /// Spawn the controller task and wait for its setup to finish
    pub async fn start(self) -> ControllerHandle {
        match self {
            AnyController::CeilingFan(c) => ControllerHandle::start(c).await,
            AnyController::ExhaustFan(c) => ControllerHandle::start(c).await,
            AnyController::Light(c) => ControllerHandle::start(c).await,
            AnyController::Occupancy(c) => ControllerHandle::start(c).await,
        }
    }
}

/// Build the controller a configuration describes
pub fn build_controller(host: &Host, config: &ControllerConfig) -> ControllerResult<AnyController> {
    config.validate()?;

    let controller = match config.controller_type {
        ControllerType::CeilingFan => AnyController::CeilingFan(Controller::new(
            host.clone(),
            CeilingFan::from_config(config, &host.temperature_unit)?,
        )),
        ControllerType::ExhaustFan => {
            AnyController::ExhaustFan(Controller::new(host.clone(), ExhaustFan::from_config(config)?))
        }
        ControllerType::Light => {
            AnyController::Light(Controller::new(host.clone(), Light::from_config(config)?))
        }
        ControllerType::Occupancy => {
            AnyController::Occupancy(Controller::new(host.clone(), Occupancy::from_config(config)?))
        }
    };
    Ok(controller)
}

/// Parse a numeric reading, logging values that are not numbers
fn read_measurement(controller: &str, state: &State, default_unit: &str) -> Option<Measurement> {
    let measurement = float_with_unit(state, default_unit);
    if measurement.is_none() {
        warn!(
            controller = %controller,
            "{} reported non-numeric value '{}'",
            state.entity_id,
            state.state
        );
    }
    measurement
}

/// Build an ordered, duplicate-free list of entity ids
fn ordered_ids<'a>(groups: impl IntoIterator<Item = &'a EntityId>) -> Vec<EntityId> {
    let mut ids: Vec<EntityId> = Vec::new();
    for id in groups {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    ids
}
