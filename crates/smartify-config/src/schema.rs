//! Typed controller configuration
//!
//! Option names match the YAML keys one to one. Entity options are parsed
//! into [`EntityId`] so a malformed id is rejected before a controller is
//! built.

use crate::error::{ConfigError, ConfigResult};
use crate::loader::YamlLoader;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use smartify_core::units;
use smartify_core::EntityId;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Top-level configuration key
pub const DOMAIN: &str = "smartify";

pub const DEFAULT_CEILING_SSI_MIN_FAHRENHEIT: f64 = 81.0;
pub const DEFAULT_CEILING_SSI_MAX_FAHRENHEIT: f64 = 91.0;

pub const DEFAULT_EXHAUST_FALLING_THRESHOLD: f64 = 0.5;
pub const DEFAULT_EXHAUST_RISING_THRESHOLD: f64 = 2.0;
pub const DEFAULT_EXHAUST_MANUAL_MINUTES: f64 = 15.0;

/// Longest accepted timer window, one year
pub const MAX_PERIOD_MINUTES: f64 = 365.0 * 24.0 * 60.0;

/// Supported controller types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerType {
    CeilingFan,
    ExhaustFan,
    Light,
    Occupancy,
}

impl ControllerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerType::CeilingFan => "ceiling_fan",
            ControllerType::ExhaustFan => "exhaust_fan",
            ControllerType::Light => "light",
            ControllerType::Occupancy => "occupancy",
        }
    }
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControllerType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ceiling_fan" => Ok(ControllerType::CeilingFan),
            "exhaust_fan" => Ok(ControllerType::ExhaustFan),
            "light" => Ok(ControllerType::Light),
            "occupancy" => Ok(ControllerType::Occupancy),
            other => Err(ConfigError::InvalidControllerType(other.to_string())),
        }
    }
}

/// Configuration of one controller instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(rename = "type", alias = "controller_type")]
    pub controller_type: ControllerType,

    #[serde(default)]
    pub controlled_entity: Option<EntityId>,
    #[serde(default)]
    pub sensor_name: Option<String>,

    // Climate sensors
    #[serde(default)]
    pub temp_sensor: Option<EntityId>,
    #[serde(default)]
    pub humidity_sensor: Option<EntityId>,
    #[serde(default)]
    pub reference_temp_sensor: Option<EntityId>,
    #[serde(default)]
    pub reference_humidity_sensor: Option<EntityId>,

    // Ceiling fan
    #[serde(default)]
    pub ssi_min: Option<f64>,
    #[serde(default)]
    pub ssi_max: Option<f64>,
    #[serde(default)]
    pub speed_min: Option<f64>,
    #[serde(default)]
    pub speed_max: Option<f64>,

    // Exhaust fan
    #[serde(default)]
    pub rising_threshold: Option<f64>,
    #[serde(default)]
    pub falling_threshold: Option<f64>,

    #[serde(default)]
    pub manual_control_minutes: Option<f64>,

    // Light
    #[serde(default)]
    pub brightness_pct: Option<f64>,
    #[serde(default)]
    pub trigger_entity: Option<EntityId>,
    #[serde(default)]
    pub illuminance_sensor: Option<EntityId>,
    #[serde(default)]
    pub illuminance_cutoff: Option<f64>,
    #[serde(default)]
    pub auto_off_minutes: Option<f64>,

    // Occupancy
    #[serde(default)]
    pub motion_sensors: Vec<EntityId>,
    #[serde(default)]
    pub motion_off_minutes: Option<f64>,
    #[serde(default)]
    pub other_entities: Vec<EntityId>,
    #[serde(default)]
    pub door_sensors: Vec<EntityId>,

    #[serde(default)]
    pub required_on_entities: Vec<EntityId>,
    #[serde(default)]
    pub required_off_entities: Vec<EntityId>,
}

impl ControllerConfig {
    /// Create an empty configuration of the given type
    pub fn new(controller_type: ControllerType) -> Self {
        Self {
            controller_type,
            controlled_entity: None,
            sensor_name: None,
            temp_sensor: None,
            humidity_sensor: None,
            reference_temp_sensor: None,
            reference_humidity_sensor: None,
            ssi_min: None,
            ssi_max: None,
            speed_min: None,
            speed_max: None,
            rising_threshold: None,
            falling_threshold: None,
            manual_control_minutes: None,
            brightness_pct: None,
            trigger_entity: None,
            illuminance_sensor: None,
            illuminance_cutoff: None,
            auto_off_minutes: None,
            motion_sensors: Vec::new(),
            motion_off_minutes: None,
            other_entities: Vec::new(),
            door_sensors: Vec::new(),
            required_on_entities: Vec::new(),
            required_off_entities: Vec::new(),
        }
    }

    /// Parse one entry of the `controllers` list
    ///
    /// The type is checked first so an unknown type is reported as such
    /// rather than as a generic deserialization failure.
    pub fn from_yaml(value: Value) -> ConfigResult<Self> {
        let type_raw = value
            .get("type")
            .or_else(|| value.get("controller_type"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let controller_type: ControllerType = type_raw.parse()?;

        let config: ControllerConfig =
            serde_yaml::from_value(value).map_err(ConfigError::InvalidController)?;
        debug!(controller_type = %controller_type, "Parsed controller configuration");

        config.validate()?;
        Ok(config)
    }

    /// Check that every option the controller type needs is present
    pub fn validate(&self) -> ConfigResult<()> {
        match self.controller_type {
            ControllerType::CeilingFan => {
                self.require(&self.controlled_entity, "controlled_entity")?;
                self.require(&self.temp_sensor, "temp_sensor")?;
                self.require(&self.humidity_sensor, "humidity_sensor")?;
                self.require(&self.speed_min, "speed_min")?;
                self.require(&self.speed_max, "speed_max")?;
            }
            ControllerType::ExhaustFan => {
                self.require(&self.controlled_entity, "controlled_entity")?;
                self.require(&self.temp_sensor, "temp_sensor")?;
                self.require(&self.humidity_sensor, "humidity_sensor")?;
                self.require(&self.reference_temp_sensor, "reference_temp_sensor")?;
                self.require(&self.reference_humidity_sensor, "reference_humidity_sensor")?;
            }
            ControllerType::Light => {
                self.require(&self.controlled_entity, "controlled_entity")?;
            }
            ControllerType::Occupancy => {
                self.require(&self.sensor_name, "sensor_name")?;
            }
        }

        for (option, minutes) in [
            ("manual_control_minutes", self.manual_control_minutes),
            ("auto_off_minutes", self.auto_off_minutes),
            ("motion_off_minutes", self.motion_off_minutes),
        ] {
            if let Some(minutes) = minutes.filter(|m| m.is_nan() || *m > MAX_PERIOD_MINUTES) {
                return Err(ConfigError::OutOfRange {
                    option,
                    reason: format!("{minutes} exceeds {MAX_PERIOD_MINUTES} minutes"),
                });
            }
        }
        Ok(())
    }

    /// Borrow a required option, or name it in the error
    pub fn require<'a, T>(&self, value: &'a Option<T>, option: &'static str) -> ConfigResult<&'a T> {
        value.as_ref().ok_or_else(|| ConfigError::MissingOption {
            controller_type: self.controller_type.to_string(),
            option,
        })
    }

    /// Manual override window; absent or zero disables it
    pub fn manual_control_period(&self) -> Option<Duration> {
        let minutes = match self.controller_type {
            ControllerType::ExhaustFan => self
                .manual_control_minutes
                .or(Some(DEFAULT_EXHAUST_MANUAL_MINUTES)),
            _ => self.manual_control_minutes,
        };
        minutes_to_duration(minutes)
    }

    pub fn auto_off_period(&self) -> Option<Duration> {
        minutes_to_duration(self.auto_off_minutes)
    }

    pub fn motion_off_period(&self) -> Option<Duration> {
        minutes_to_duration(self.motion_off_minutes)
    }

    pub fn rising_threshold(&self) -> f64 {
        self.rising_threshold
            .unwrap_or(DEFAULT_EXHAUST_RISING_THRESHOLD)
    }

    pub fn falling_threshold(&self) -> f64 {
        self.falling_threshold
            .unwrap_or(DEFAULT_EXHAUST_FALLING_THRESHOLD)
    }

    /// Title used before the controlled entity reports a friendly name
    pub fn title(&self) -> String {
        match self.controller_type {
            ControllerType::Occupancy => self.sensor_name.clone().unwrap_or_default(),
            _ => self
                .controlled_entity
                .as_ref()
                .map(|e| e.to_string())
                .or_else(|| self.sensor_name.clone())
                .unwrap_or_else(|| self.controller_type.to_string()),
        }
    }
}

/// Convert a minutes option into a duration; zero means "not configured"
pub fn minutes_to_duration(minutes: Option<f64>) -> Option<Duration> {
    minutes
        .filter(|m| m.is_finite() && *m > 0.0)
        .and_then(|m| Duration::try_from_secs_f64(m.min(MAX_PERIOD_MINUTES) * 60.0).ok())
}

fn default_temperature_unit() -> String {
    units::CELSIUS.to_string()
}

/// The `smartify:` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartifyConfig {
    /// Host temperature unit, `°C` or `°F`
    #[serde(default = "default_temperature_unit")]
    pub temperature_unit: String,

    /// Raw controller entries, parsed one at a time
    #[serde(default)]
    pub controllers: Vec<Value>,
}

impl Default for SmartifyConfig {
    fn default() -> Self {
        Self {
            temperature_unit: default_temperature_unit(),
            controllers: Vec::new(),
        }
    }
}

impl SmartifyConfig {
    /// Extract the `smartify:` section from a loaded document
    pub fn from_document(document: &Value) -> ConfigResult<Self> {
        let section = document.get(DOMAIN).ok_or(ConfigError::MissingSection)?;
        if section.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(section.clone()).map_err(ConfigError::InvalidController)
    }
}

/// Load the `smartify:` section from a configuration file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<SmartifyConfig> {
    let path = path.as_ref();
    let config_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file = path.file_name().map(Path::new).unwrap_or(path);
    let document = YamlLoader::new(config_dir).load_file(file)?;

    let config = SmartifyConfig::from_document(&document)?;
    debug!(
        controllers = config.controllers.len(),
        temperature_unit = %config.temperature_unit,
        "Loaded smartify configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> ConfigResult<ControllerConfig> {
        ControllerConfig::from_yaml(serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_parse_exhaust_fan_with_defaults() {
        let config = parse(
            r#"
type: exhaust_fan
controlled_entity: fan.bathroom_exhaust
temp_sensor: sensor.bathroom_temperature
humidity_sensor: sensor.bathroom_humidity
reference_temp_sensor: sensor.hallway_temperature
reference_humidity_sensor: sensor.hallway_humidity
"#,
        )
        .unwrap();

        assert_eq!(config.controller_type, ControllerType::ExhaustFan);
        assert_eq!(config.rising_threshold(), 2.0);
        assert_eq!(config.falling_threshold(), 0.5);
        assert_eq!(
            config.manual_control_period(),
            Some(Duration::from_secs(15 * 60))
        );
        assert_eq!(config.title(), "fan.bathroom_exhaust");
    }

    #[test]
    fn test_controller_type_alias() {
        let config = parse(
            "controller_type: occupancy\nsensor_name: Office\nmotion_sensors: [binary_sensor.office_motion]\n",
        )
        .unwrap();
        assert_eq!(config.controller_type, ControllerType::Occupancy);
        assert_eq!(config.motion_sensors.len(), 1);
        assert_eq!(config.title(), "Office");
        assert_eq!(config.motion_off_period(), None);
    }

    #[test]
    fn test_invalid_type() {
        let err = parse("type: heater\ncontrolled_entity: switch.heater\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidControllerType(t) if t == "heater"));

        let err = parse("controlled_entity: switch.heater\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidControllerType(t) if t.is_empty()));
    }

    #[test]
    fn test_missing_required_option() {
        let err = parse("type: ceiling_fan\ncontrolled_entity: fan.bedroom\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingOption { option: "temp_sensor", .. }
        ));
    }

    #[test]
    fn test_malformed_entity_id() {
        let err = parse("type: light\ncontrolled_entity: not an entity\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidController(_)));
    }

    #[test]
    fn test_zero_minutes_disable_timer() {
        let config = parse(
            "type: light\ncontrolled_entity: light.hall\nauto_off_minutes: 0\nmanual_control_minutes: 0.5\n",
        )
        .unwrap();
        assert_eq!(config.auto_off_period(), None);
        assert_eq!(config.manual_control_period(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("configuration.yaml"),
            "smartify:\n  temperature_unit: \"°F\"\n  controllers:\n    - type: light\n      controlled_entity: light.porch\n",
        )
        .unwrap();

        let config = load_config(dir.path().join("configuration.yaml")).unwrap();
        assert_eq!(config.temperature_unit, "°F");
        assert_eq!(config.controllers.len(), 1);
        assert!(ControllerConfig::from_yaml(config.controllers[0].clone()).is_ok());
    }

    #[test]
    fn test_load_config_relative_path() {
        let dir = TempDir::new_in(".").unwrap();
        fs::write(
            dir.path().join("configuration.yaml"),
            "smartify:\n  controllers: !include controllers.yaml\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("controllers.yaml"),
            "- type: light\n  controlled_entity: light.porch\n",
        )
        .unwrap();

        let relative = Path::new(dir.path().file_name().unwrap()).join("configuration.yaml");
        let config = load_config(&relative).unwrap();
        assert_eq!(config.controllers.len(), 1);
    }

    #[test]
    fn test_huge_minutes_rejected() {
        let err = parse("type: light\ncontrolled_entity: light.hall\nauto_off_minutes: 1e300\n").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { option: "auto_off_minutes", .. }));

        let err = parse(
            "type: occupancy\nsensor_name: Hall\nmotion_off_minutes: 2e17\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { option: "motion_off_minutes", .. }));

        // Unvalidated configs saturate instead of panicking
        let mut config = ControllerConfig::new(ControllerType::Light);
        config.auto_off_minutes = Some(1e300);
        assert_eq!(
            config.auto_off_period(),
            Some(Duration::from_secs_f64(MAX_PERIOD_MINUTES * 60.0))
        );
    }

    #[test]
    fn test_missing_section() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("configuration.yaml"), "homeassistant: {}\n").unwrap();

        let err = load_config(dir.path().join("configuration.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection));
    }

    #[test]
    fn test_empty_section_uses_defaults() {
        let document: Value = serde_yaml::from_str("smartify:\n").unwrap();
        let config = SmartifyConfig::from_document(&document).unwrap();
        assert_eq!(config.temperature_unit, "°C");
        assert!(config.controllers.is_empty());
    }
}
