//! Exhaust fan controller against the test host

mod common;

use common::{settle, TestHass};
use smartify::util::{absolute_humidity, Measurement};
use smartify::ControllerHandle;
use std::time::Duration;

const CONFIG: &str = r#"
type: exhaust_fan
controlled_entity: fan.bathroom
temp_sensor: sensor.bathroom_temperature
humidity_sensor: sensor.bathroom_humidity
reference_temp_sensor: sensor.hallway_temperature
reference_humidity_sensor: sensor.hallway_humidity
manual_control_minutes: 0
"#;

const TEMPERATURE: f64 = 20.0;
const REFERENCE_HUMIDITY: f64 = 45.0;

/// Bathroom relative humidity giving `difference` g/m³ over the hallway
fn humidity_for(difference: f64) -> String {
    let per_percent = absolute_humidity(&Measurement::new(TEMPERATURE, "°C"), 1.0);
    format!("{:.4}", REFERENCE_HUMIDITY + difference / per_percent)
}

async fn start(hass: &TestHass, config: &str) -> ControllerHandle {
    hass.set_state("fan.bathroom", "off");
    for sensor in ["sensor.bathroom_temperature", "sensor.hallway_temperature"] {
        hass.set_state(sensor, &TEMPERATURE.to_string());
    }
    hass.set_state("sensor.hallway_humidity", &REFERENCE_HUMIDITY.to_string());
    hass.set_state("sensor.bathroom_humidity", &humidity_for(0.0));
    hass.start(config).await
}

#[tokio::test(start_paused = true)]
async fn test_hysteresis() {
    let hass = TestHass::new();
    let fan = start(&hass, CONFIG).await;
    assert_eq!(fan.view().state(), "off");

    // Between the thresholds while off: stays off
    hass.set_state("sensor.bathroom_humidity", &humidity_for(1.0));
    settle().await;
    assert_eq!(fan.view().state(), "off");
    assert!(hass.service_ids().is_empty());

    hass.set_state("sensor.bathroom_humidity", &humidity_for(2.5));
    settle().await;
    assert_eq!(fan.view().state(), "on");
    assert_eq!(hass.service_ids(), ["fan.turn_on"]);
    hass.assert_state("fan.bathroom", "on");

    // Between the thresholds while on: stays on
    hass.set_state("sensor.bathroom_humidity", &humidity_for(1.0));
    settle().await;
    assert_eq!(fan.view().state(), "on");
    assert_eq!(hass.service_ids(), ["fan.turn_on"]);

    hass.set_state("sensor.bathroom_humidity", &humidity_for(0.3));
    settle().await;
    assert_eq!(fan.view().state(), "off");
    assert_eq!(hass.service_ids(), ["fan.turn_on", "fan.turn_off"]);
    hass.assert_state("fan.bathroom", "off");

    fan.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reference_change_refreshes() {
    let hass = TestHass::new();
    let fan = start(&hass, CONFIG).await;

    // The hallway dries out, so the bathroom is relatively humid
    let per_percent = absolute_humidity(&Measurement::new(TEMPERATURE, "°C"), 1.0);
    let drier = REFERENCE_HUMIDITY - 3.0 / per_percent;
    hass.set_state("sensor.hallway_humidity", &format!("{drier:.4}"));
    settle().await;

    assert_eq!(fan.view().state(), "on");
    assert_eq!(hass.service_ids(), ["fan.turn_on"]);

    fan.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_sensor_is_ignored() {
    let hass = TestHass::new();
    let fan = start(&hass, CONFIG).await;

    hass.set_state("sensor.bathroom_humidity", "unavailable");
    settle().await;
    hass.set_state("sensor.bathroom_humidity", &humidity_for(2.5));
    settle().await;

    assert_eq!(fan.view().state(), "on");
    assert_eq!(hass.service_ids(), ["fan.turn_on"]);

    fan.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_manual_on_resumes_after_default_window() {
    let hass = TestHass::new();
    let config = CONFIG.replace("manual_control_minutes: 0\n", "");
    let fan = start(&hass, &config).await;

    hass.set_state("fan.bathroom", "on");
    settle().await;
    assert_eq!(fan.view().state(), "on_manual");

    tokio::time::sleep(Duration::from_secs(14 * 60)).await;
    assert!(hass.service_ids().is_empty());

    // Fifteen minutes by default, then the dry room turns the fan off
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(hass.service_ids(), ["fan.turn_off"]);
    assert_eq!(fan.view().state(), "off");

    fan.shutdown().await.unwrap();
}
