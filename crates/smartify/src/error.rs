//! Error types for the control core

use smartify_config::ConfigError;
use smartify_service_registry::ServiceError;
use thiserror::Error;

/// Result type for controller operations
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Errors raised while building or running controllers
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The controller configuration is unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An actuation call failed
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// An actuation was requested by a controller without an actuator
    #[error("controller '{0}' has no controlled entity")]
    NoControlledEntity(String),

    /// No controller is registered under this unique id
    #[error("no controller with unique id '{0}'")]
    NotFound(String),

    /// A controller with this unique id is already registered
    #[error("controller '{0}' is already registered")]
    AlreadyRegistered(String),

    /// The controller task has exited
    #[error("controller '{0}' is not running")]
    Stopped(String),
}
