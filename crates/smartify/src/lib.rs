//! Smartify control core
//!
//! Closed-loop controllers for fans, lights and a virtual occupancy sensor.
//! Each controller is a finite state machine driven by state changes of the
//! entities it tracks and by a single cancelable timer:
//!
//! - [`CeilingFan`] sets the fan speed from the summer simmer index
//! - [`ExhaustFan`] switches on absolute humidity difference with hysteresis
//! - [`Light`] follows a trigger entity with manual override and auto-off
//! - [`Occupancy`] combines motion, door and presence entities
//!
//! A [`Controller`] pairs a [`Machine`] (the transition table) with an
//! [`Engine`] (state, timer, listeners, actuation). [`ControllerHandle`] runs
//! one controller as a task so its transitions are serialized, and
//! [`ControllerRegistry`] owns every running controller.

mod actor;
pub mod controllers;
mod engine;
mod error;
mod host;
mod listeners;
mod registry;
mod required;
mod timer;
mod tracker;
pub mod util;

pub use actor::ControllerHandle;
pub use controllers::{
    build_controller, AnyController, CeilingFan, CeilingFanEvent, CeilingFanState, ExhaustFan, ExhaustFanEvent,
    ExhaustFanState, Light, LightEvent, LightState, Occupancy, OccupancyEvent, OccupancyState,
};
pub use engine::{Controller, Engine, Machine, StateChanges, StateValue};
pub use error::{ControllerError, ControllerResult};
pub use host::Host;
pub use listeners::{ControllerView, ListenerHandle, Listeners};
pub use registry::{slugify, unique_id, ControllerRegistry};
pub use required::RequiredConditions;
pub use timer::{Poll, Timer};
pub use tracker::EntityTracker;
