//! Configuration for Smartify
//!
//! Controllers are declared in YAML under a `smartify:` key:
//!
//! ```yaml
//! smartify:
//!   temperature_unit: "°F"
//!   controllers:
//!     - type: exhaust_fan
//!       controlled_entity: fan.bathroom_exhaust
//!       temp_sensor: sensor.bathroom_temperature
//!       humidity_sensor: sensor.bathroom_humidity
//!       reference_temp_sensor: sensor.hallway_temperature
//!       reference_humidity_sensor: sensor.hallway_humidity
//!       manual_control_minutes: !env_var EXHAUST_MANUAL_MINUTES 15
//! ```
//!
//! The loader understands `!include`, `!secret` and `!env_var`. Each entry
//! under `controllers` is parsed on its own, so one malformed controller
//! does not prevent the others from loading.

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use schema::{
    load_config, ControllerConfig, ControllerType, SmartifyConfig, DEFAULT_CEILING_SSI_MAX_FAHRENHEIT,
    DEFAULT_CEILING_SSI_MIN_FAHRENHEIT, DEFAULT_EXHAUST_FALLING_THRESHOLD,
    DEFAULT_EXHAUST_MANUAL_MINUTES, DEFAULT_EXHAUST_RISING_THRESHOLD, DOMAIN,
};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
