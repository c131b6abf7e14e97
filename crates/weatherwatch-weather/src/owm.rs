//! OpenWeatherMap 2.5 payload shapes.
//!
//! Only the fields the monitor consumes are modelled; everything else in the
//! upstream response is ignored.

use serde::Deserialize;
use serde_json::Value;
use weatherwatch_core::DataError;

use crate::types::{Condition, RawObservation};

/// Forecast samples per day (one every three hours)
pub const SAMPLES_PER_DAY: u32 = 8;

#[derive(Debug, Deserialize)]
struct ApiReading {
    dt: i64,
    main: ApiMain,
    #[serde(default)]
    weather: Vec<ApiWeather>,
    #[serde(default)]
    wind: Option<ApiWind>,
}

#[derive(Debug, Deserialize)]
struct ApiMain {
    temp: f64,
    #[serde(default)]
    feels_like: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiWeather {
    main: String,
}

#[derive(Debug, Deserialize)]
struct ApiWind {
    #[serde(default)]
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiForecast {
    list: Vec<ApiReading>,
}

impl ApiReading {
    fn into_raw(self, location: &str) -> Result<RawObservation, DataError> {
        let condition = self
            .weather
            .into_iter()
            .next()
            .map(|w| Condition::from_main(&w.main))
            .ok_or_else(|| DataError::missing("weather[0].main"))?;

        if !self.main.temp.is_finite() {
            return Err(DataError::invalid("main.temp", "not a finite number"));
        }
        if chrono::DateTime::from_timestamp(self.dt, 0).is_none() {
            return Err(DataError::invalid("dt", format!("{} is out of range", self.dt)));
        }

        Ok(RawObservation {
            location: location.to_string(),
            timestamp: self.dt,
            temperature: self.main.temp,
            feels_like: self.main.feels_like.unwrap_or(self.main.temp),
            humidity: self.main.humidity,
            wind_speed: self.wind.and_then(|w| w.speed),
            condition,
        })
    }
}

fn shape_error(e: serde_json::Error) -> DataError {
    DataError::invalid("payload", e.to_string())
}

/// Parse a `/weather` response into a single reading.
pub fn parse_current(location: &str, payload: &Value) -> Result<RawObservation, DataError> {
    let reading = ApiReading::deserialize(payload).map_err(shape_error)?;
    reading.into_raw(location)
}

/// Parse a `/forecast` response into its readings, in upstream order.
pub fn parse_forecast(location: &str, payload: &Value) -> Result<Vec<RawObservation>, DataError> {
    let forecast = ApiForecast::deserialize(payload).map_err(shape_error)?;
    forecast
        .list
        .into_iter()
        .map(|reading| reading.into_raw(location))
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_parse_current() {
        let payload = serde_json::json!({
            "weather": [{"main": "Clear"}],
            "main": {"temp": 25.5, "feels_like": 26.0, "humidity": 65},
            "wind": {"speed": 4.2},
            "dt": 1609459200
        });

        let raw = parse_current("TestCity", &payload).unwrap();
        assert_eq!(raw.location, "TestCity");
        assert_eq!(raw.condition, Condition::Clear);
        assert_eq!(raw.temperature, 25.5);
        assert_eq!(raw.feels_like, 26.0);
        assert_eq!(raw.humidity, Some(65.0));
        assert_eq!(raw.wind_speed, Some(4.2));
        assert_eq!(raw.timestamp, 1609459200);
    }

    #[test]
    fn test_parse_current_optional_fields_absent() {
        let payload = serde_json::json!({
            "weather": [{"main": "Mist"}],
            "main": {"temp": 12.0},
            "dt": 1609459200
        });

        let raw = parse_current("Oslo", &payload).unwrap();
        assert_eq!(raw.feels_like, 12.0);
        assert_eq!(raw.humidity, None);
        assert_eq!(raw.wind_speed, None);
    }

    #[test]
    fn test_parse_current_missing_temp() {
        let payload = serde_json::json!({
            "weather": [{"main": "Clear"}],
            "main": {"humidity": 65},
            "dt": 1609459200
        });

        let err = parse_current("TestCity", &payload).unwrap_err();
        assert!(err.to_string().contains("temp"));
    }

    #[test]
    fn test_parse_current_missing_condition() {
        let payload = serde_json::json!({
            "weather": [],
            "main": {"temp": 20.0},
            "dt": 1609459200
        });

        let err = parse_current("TestCity", &payload).unwrap_err();
        assert_eq!(err, DataError::missing("weather[0].main"));
    }

    #[test]
    fn test_parse_current_wrong_type() {
        let payload = serde_json::json!({
            "weather": [{"main": "Clear"}],
            "main": {"temp": "hot"},
            "dt": 1609459200
        });

        assert!(parse_current("TestCity", &payload).is_err());
    }

    #[test]
    fn test_parse_forecast() {
        let payload = serde_json::json!({
            "list": [
                {
                    "dt": 1609459200,
                    "main": {"temp": 25.5, "humidity": 65},
                    "weather": [{"main": "Clear"}],
                    "wind": {"speed": 4.2}
                },
                {
                    "dt": 1609470000,
                    "main": {"temp": 26.5, "humidity": 60},
                    "weather": [{"main": "Clouds"}],
                    "wind": {"speed": 3.8}
                }
            ]
        });

        let readings = parse_forecast("TestCity", &payload).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].timestamp, 1609459200);
        assert_eq!(readings[0].temperature, 25.5);
        assert_eq!(readings[0].condition, Condition::Clear);
        assert_eq!(readings[1].condition, Condition::Clouds);
    }

    #[test]
    fn test_parse_forecast_one_bad_entry_fails_location() {
        let payload = serde_json::json!({
            "list": [
                {"dt": 1609459200, "main": {"temp": 25.5}, "weather": [{"main": "Clear"}]},
                {"dt": 1609470000, "main": {"temp": 26.5}, "weather": []}
            ]
        });

        assert!(parse_forecast("TestCity", &payload).is_err());
    }
}
