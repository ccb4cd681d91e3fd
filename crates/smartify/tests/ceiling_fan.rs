//! Ceiling fan controller against the test host

mod common;

use common::{fan_attributes, settle, TestHass};
use smartify::ControllerHandle;
use std::time::Duration;

const CONFIG: &str = r#"
type: ceiling_fan
controlled_entity: fan.living_room
temp_sensor: sensor.living_room_temperature
humidity_sensor: sensor.living_room_humidity
speed_min: 0
speed_max: 100
"#;

/// Fan off with 1% steps, 50% humidity and the given temperature in °F
async fn start(hass: &TestHass, config: &str, temperature: &str) -> ControllerHandle {
    hass.set_state_with("fan.living_room", "off", fan_attributes(1.0));
    hass.set_state("sensor.living_room_temperature", temperature);
    hass.set_state("sensor.living_room_humidity", "50");
    hass.start(config).await
}

#[tokio::test(start_paused = true)]
async fn test_speed_follows_ssi_range() {
    let hass = TestHass::with_temperature_unit("°F");

    // SSI 75.2 is below the default 81..91 range
    let fan = start(&hass, CONFIG, "70").await;
    assert_eq!(fan.view().state(), "off");
    assert!(hass.service_ids().is_empty());

    // SSI 83.8, 88.2 and 96.8: the poll picks up each reading
    for temperature in ["76", "79", "85"] {
        hass.set_state("sensor.living_room_temperature", temperature);
        tokio::time::sleep(Duration::from_secs(61)).await;
    }

    assert_eq!(hass.percentages(), [28, 71, 100]);
    assert_eq!(fan.view().state(), "on");
    assert!(fan.view().is_on());
    hass.assert_state("fan.living_room", "on");

    // Back below the range: the fan is turned off
    hass.set_state("sensor.living_room_temperature", "70");
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(hass.percentages(), [28, 71, 100, 0]);
    assert_eq!(fan.view().state(), "off");

    fan.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sensor_updates_wait_for_poll() {
    let hass = TestHass::with_temperature_unit("°F");
    let fan = start(&hass, CONFIG, "70").await;

    hass.set_state("sensor.living_room_temperature", "85");
    settle().await;
    assert!(hass.service_ids().is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(hass.service_ids(), ["fan.set_percentage"]);

    fan.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_required_entity_change_refreshes_immediately() {
    let hass = TestHass::with_temperature_unit("°F");
    hass.set_state("binary_sensor.sofa_occupied", "off");
    let config = format!("{CONFIG}required_on_entities: [binary_sensor.sofa_occupied]\n");
    let fan = start(&hass, &config, "85").await;

    // Hot, but nobody on the sofa
    assert_eq!(fan.view().state(), "off");
    assert!(hass.service_ids().is_empty());

    hass.set_state("binary_sensor.sofa_occupied", "on");
    settle().await;
    assert_eq!(hass.percentages(), [100]);
    assert_eq!(fan.view().state(), "on");

    hass.set_state("binary_sensor.sofa_occupied", "off");
    settle().await;
    assert_eq!(hass.percentages(), [100, 0]);
    assert_eq!(fan.view().state(), "off");

    fan.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_manual_override_window() {
    let hass = TestHass::with_temperature_unit("°F");
    let config = format!("{CONFIG}manual_control_minutes: 5\n");
    let fan = start(&hass, &config, "85").await;
    assert_eq!(fan.view().state(), "on");
    hass.clear_service_calls();

    // Switched off by hand: polls are ignored until the window closes
    hass.set_state("fan.living_room", "off");
    settle().await;
    assert_eq!(fan.view().state(), "off_manual");

    tokio::time::sleep(Duration::from_secs(4 * 60)).await;
    assert!(hass.service_ids().is_empty());
    hass.assert_state("fan.living_room", "off");

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(hass.percentages(), [100]);
    assert_eq!(fan.view().state(), "on");

    fan.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_external_off_without_manual_window() {
    let hass = TestHass::with_temperature_unit("°F");
    let fan = start(&hass, CONFIG, "85").await;
    assert_eq!(fan.view().state(), "on");

    hass.set_state("fan.living_room", "off");
    settle().await;
    assert_eq!(fan.view().state(), "off");

    // The next poll turns it back on
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(hass.percentages(), [100, 100]);
    assert_eq!(fan.view().state(), "on");

    fan.shutdown().await.unwrap();
}
