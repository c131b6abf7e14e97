use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Weather condition as reported by the upstream `weather[0].main` field.
///
/// The vocabulary is open: anything not listed here is kept verbatim in
/// `Other`, so summaries never lose a condition they haven't seen before.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Condition {
    Clear,
    Clouds,
    Drizzle,
    Rain,
    Thunderstorm,
    Snow,
    Mist,
    Fog,
    Haze,
    Other(String),
}

impl Condition {
    /// Map an upstream condition name. Matching is case-insensitive.
    pub fn from_main(main: &str) -> Self {
        match main.trim().to_ascii_lowercase().as_str() {
            "clear" => Self::Clear,
            "clouds" => Self::Clouds,
            "drizzle" => Self::Drizzle,
            "rain" => Self::Rain,
            "thunderstorm" => Self::Thunderstorm,
            "snow" => Self::Snow,
            "mist" => Self::Mist,
            "fog" => Self::Fog,
            "haze" => Self::Haze,
            _ => Self::Other(main.trim().to_string()),
        }
    }

    /// Canonical upstream spelling
    pub fn as_str(&self) -> &str {
        match self {
            Self::Clear => "Clear",
            Self::Clouds => "Clouds",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::Thunderstorm => "Thunderstorm",
            Self::Snow => "Snow",
            Self::Mist => "Mist",
            Self::Fog => "Fog",
            Self::Haze => "Haze",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Condition {
    fn from(value: String) -> Self {
        Self::from_main(&value)
    }
}

impl From<Condition> for String {
    fn from(value: Condition) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reading as extracted from an upstream payload.
///
/// `humidity` and `wind_speed` are optional upstream; normalization fills
/// them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub location: String,
    /// Epoch seconds
    pub timestamp: i64,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub condition: Condition,
}

/// A reading with a calendar-aware timestamp and no missing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedObservation {
    pub location: String,
    pub observed_at: DateTime<Utc>,
    pub temperature: f64,
    pub feels_like: f64,
    /// Percent, 0-100
    pub humidity: f64,
    /// m/s, never negative
    pub wind_speed: f64,
    pub condition: Condition,
}

impl NormalizedObservation {
    /// Calendar (UTC) date of the reading
    pub fn date(&self) -> NaiveDate {
        self.observed_at.date_naive()
    }
}

/// Aggregates over one (location, date) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub avg_temperature: f64,
    pub max_temperature: f64,
    pub min_temperature: f64,
    pub avg_humidity: f64,
    pub avg_wind_speed: f64,
    pub dominant_condition: Condition,
    pub sample_count: usize,
}

/// Summary of observed readings for one location on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub location: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub stats: SummaryStats,
}

/// Summary of forecast readings for one location on one forecast day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub location: String,
    pub forecast_date: NaiveDate,
    #[serde(flatten)]
    pub stats: SummaryStats,
}
