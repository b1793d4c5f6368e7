//! `WeatherData` decoder.

use serde_json::Value;

/// Partial update for the weather record. All readings arrive as strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherUpdate {
    pub air_temp: Option<f64>,
    pub track_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub rainfall: Option<bool>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub pressure: Option<f64>,
}

/// Decode a `WeatherData` payload:
/// `{"AirTemp": "25.3", "Rainfall": "0", "WindSpeed": "2.5", ...}`.
///
/// Numeric fields that fail to parse are treated as absent. `Rainfall` is
/// the string `"1"` when raining.
pub(super) fn parse(data: &Value) -> WeatherUpdate {
    WeatherUpdate {
        air_temp: float_field(data, "AirTemp"),
        track_temp: float_field(data, "TrackTemp"),
        humidity: float_field(data, "Humidity"),
        rainfall: data
            .get("Rainfall")
            .and_then(Value::as_str)
            .map(|r| r == "1"),
        wind_speed: float_field(data, "WindSpeed"),
        wind_direction: float_field(data, "WindDirection"),
        pressure: float_field(data, "Pressure"),
    }
}

fn float_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
