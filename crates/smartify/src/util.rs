//! Physics and math helpers

use smartify_core::{units, State};

/// A numeric sensor reading with its unit of measurement
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub value: f64,
    pub unit: String,
}

impl Measurement {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }
}

/// Parse a state's value as a number tagged with its unit
///
/// Falls back to `default_unit` when the entity reports no unit. Returns
/// `None` for values that are not finite numbers.
pub fn float_with_unit(state: &State, default_unit: &str) -> Option<Measurement> {
    let value: f64 = state.state.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let unit = state.unit().unwrap_or_else(|| default_unit.to_string());
    Some(Measurement { value, unit })
}

/// Convert a temperature between `°C` and `°F`
///
/// Unrecognized units are passed through unchanged.
pub fn convert_temperature(value: f64, from_unit: &str, to_unit: &str) -> f64 {
    match (from_unit, to_unit) {
        (units::CELSIUS, units::FAHRENHEIT) => value * 9.0 / 5.0 + 32.0,
        (units::FAHRENHEIT, units::CELSIUS) => (value - 32.0) * 5.0 / 9.0,
        _ => value,
    }
}

/// Absolute humidity in g/m³ from temperature and relative humidity (%)
pub fn absolute_humidity(temp: &Measurement, humidity: f64) -> f64 {
    let t_c = convert_temperature(temp.value, &temp.unit, units::CELSIUS);

    humidity * 6.112 * 2.1674 * ((t_c * 17.67) / (t_c + 243.5)).exp() / (t_c + 273.15)
}

/// Summer simmer index, expressed in `unit`
pub fn summer_simmer_index(temp: &Measurement, humidity: f64, unit: &str) -> f64 {
    let t_f = convert_temperature(temp.value, &temp.unit, units::FAHRENHEIT);

    let ssi = 1.98 * (t_f - (0.55 - 0.0055 * humidity) * (t_f - 58.0)) - 56.83;

    convert_temperature(ssi, units::FAHRENHEIT, unit)
}

/// Map a value from the source range onto the target range
///
/// Below the source range the result is `low_default` (or the target low
/// bound); above it, `high_default` (or the target high bound). Inside the
/// range the mapping is linear and clamped to the target range.
pub fn extrapolate_value(
    source_value: f64,
    source_range: (f64, f64),
    target_range: (f64, f64),
    low_default: Option<f64>,
    high_default: Option<f64>,
) -> f64 {
    let (source_low, source_high) = source_range;
    let (target_low, target_high) = target_range;

    if source_value < source_low {
        return low_default.unwrap_or(target_low);
    }
    if source_value > source_high {
        return high_default.unwrap_or(target_high);
    }

    let span = source_high - source_low;
    if span <= 0.0 {
        return target_high;
    }

    let fraction = (source_value - source_low) / span;
    let target_value = target_low + fraction * (target_high - target_low);

    target_value.clamp(target_low.min(target_high), target_low.max(target_high))
}
