//! Normalization and summary statistics.
//!
//! Everything here is synchronous and free of I/O. Summary functions group
//! readings by (location, UTC date) in first-appearance order and never see
//! an empty group.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate};
use tracing::warn;
use weatherwatch_core::DataError;

use crate::types::{
    Condition, DailySummary, ForecastSummary, NormalizedObservation, RawObservation, SummaryStats,
};

/// Humidity used when the upstream omits it (percent)
pub const DEFAULT_HUMIDITY: f64 = 50.0;
/// Wind speed used when the upstream omits it (m/s)
pub const DEFAULT_WIND_SPEED: f64 = 0.0;

/// Convert a raw reading into a normalized one.
///
/// Absent or non-finite humidity and wind speed fall back to
/// [`DEFAULT_HUMIDITY`] and [`DEFAULT_WIND_SPEED`]; present values are
/// clamped to their physical range.
pub fn normalize(raw: &RawObservation) -> Result<NormalizedObservation, DataError> {
    let observed_at = DateTime::from_timestamp(raw.timestamp, 0).ok_or_else(|| {
        DataError::invalid("timestamp", format!("{} is out of range", raw.timestamp))
    })?;

    if !raw.temperature.is_finite() {
        return Err(DataError::invalid("temperature", "not a finite number"));
    }

    let humidity = raw
        .humidity
        .filter(|h| h.is_finite())
        .map_or(DEFAULT_HUMIDITY, |h| h.clamp(0.0, 100.0));
    let wind_speed = raw
        .wind_speed
        .filter(|w| w.is_finite())
        .map_or(DEFAULT_WIND_SPEED, |w| w.max(0.0));
    let feels_like = if raw.feels_like.is_finite() {
        raw.feels_like
    } else {
        raw.temperature
    };

    Ok(NormalizedObservation {
        location: raw.location.clone(),
        observed_at,
        temperature: raw.temperature,
        feels_like,
        humidity,
        wind_speed,
        condition: raw.condition.clone(),
    })
}

/// Normalize a batch, dropping (and logging) readings that cannot be
/// normalized. Input order is preserved.
pub fn normalize_all(raws: &[RawObservation]) -> Vec<NormalizedObservation> {
    raws.iter()
        .filter_map(|raw| match normalize(raw) {
            Ok(obs) => Some(obs),
            Err(e) => {
                warn!("Dropping reading for {}: {}", raw.location, e);
                None
            }
        })
        .collect()
}

/// One summary per (location, date) present in `observations`, in order of
/// first appearance.
pub fn daily_summary(observations: &[NormalizedObservation]) -> Vec<DailySummary> {
    group_by_day(observations)
        .into_iter()
        .map(|((location, date), group)| DailySummary {
            location,
            date,
            stats: stats(&group),
        })
        .collect()
}

/// Per-location forecast summaries, one per forecast date. Locations with
/// no readings are left out.
pub fn forecast_summary(
    forecasts: &BTreeMap<String, Vec<NormalizedObservation>>,
) -> BTreeMap<String, Vec<ForecastSummary>> {
    forecasts
        .iter()
        .filter(|(_, observations)| !observations.is_empty())
        .map(|(location, observations)| {
            let summaries = group_by_day(observations)
                .into_iter()
                .map(|((_, forecast_date), group)| ForecastSummary {
                    location: location.clone(),
                    forecast_date,
                    stats: stats(&group),
                })
                .collect();
            (location.clone(), summaries)
        })
        .collect()
}

type DayKey = (String, NaiveDate);

fn group_by_day(observations: &[NormalizedObservation]) -> Vec<(DayKey, Vec<&NormalizedObservation>)> {
    let mut index: HashMap<DayKey, usize> = HashMap::new();
    let mut groups: Vec<(DayKey, Vec<&NormalizedObservation>)> = Vec::new();

    for obs in observations {
        let key = (obs.location.clone(), obs.date());
        match index.get(&key) {
            Some(&slot) => groups[slot].1.push(obs),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![obs]));
            }
        }
    }
    groups
}

fn stats(group: &[&NormalizedObservation]) -> SummaryStats {
    debug_assert!(!group.is_empty());
    let count = group.len() as f64;

    let mut temp_sum = 0.0;
    let mut humidity_sum = 0.0;
    let mut wind_sum = 0.0;
    let mut max_temperature = f64::NEG_INFINITY;
    let mut min_temperature = f64::INFINITY;
    for obs in group {
        temp_sum += obs.temperature;
        humidity_sum += obs.humidity;
        wind_sum += obs.wind_speed;
        max_temperature = max_temperature.max(obs.temperature);
        min_temperature = min_temperature.min(obs.temperature);
    }

    SummaryStats {
        avg_temperature: temp_sum / count,
        max_temperature,
        min_temperature,
        avg_humidity: humidity_sum / count,
        avg_wind_speed: wind_sum / count,
        dominant_condition: dominant_condition(group),
        sample_count: group.len(),
    }
}

/// Most frequent condition; ties go to the one seen first.
fn dominant_condition(group: &[&NormalizedObservation]) -> Condition {
    let mut counts: Vec<(&Condition, usize)> = Vec::new();
    for obs in group {
        match counts.iter_mut().find(|(c, _)| *c == &obs.condition) {
            Some((_, n)) => *n += 1,
            None => counts.push((&obs.condition, 1)),
        }
    }

    let mut best: Option<(&Condition, usize)> = None;
    for (condition, n) in counts {
        if best.map_or(true, |(_, top)| n > top) {
            best = Some((condition, n));
        }
    }
    best.map_or_else(|| Condition::Other(String::new()), |(c, _)| c.clone())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use chrono::{TimeZone, Utc};

    const DAY: i64 = 86_400;
    // 2024-05-01T00:00:00Z
    const MAY_1: i64 = 1_714_521_600;

    fn raw(location: &str, timestamp: i64, temperature: f64, condition: Condition) -> RawObservation {
        RawObservation {
            location: location.to_string(),
            timestamp,
            temperature,
            feels_like: temperature,
            humidity: Some(60.0),
            wind_speed: Some(3.0),
            condition,
        }
    }

    fn obs(location: &str, timestamp: i64, temperature: f64, condition: Condition) -> NormalizedObservation {
        normalize(&raw(location, timestamp, temperature, condition)).unwrap()
    }

    fn may(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn test_normalize_converts_timestamp() {
        let normalized = obs("Delhi", MAY_1 + 3_600, 30.0, Condition::Haze);
        assert_eq!(
            normalized.observed_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap()
        );
        assert_eq!(normalized.date(), may(1));
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let mut reading = raw("Delhi", MAY_1, 30.0, Condition::Clear);
        reading.humidity = None;
        reading.wind_speed = None;

        let normalized = normalize(&reading).unwrap();
        assert_eq!(normalized.humidity, DEFAULT_HUMIDITY);
        assert_eq!(normalized.wind_speed, DEFAULT_WIND_SPEED);
    }

    #[test]
    fn test_normalize_clamps_ranges() {
        let mut reading = raw("Delhi", MAY_1, 30.0, Condition::Clear);
        reading.humidity = Some(130.0);
        reading.wind_speed = Some(-2.0);

        let normalized = normalize(&reading).unwrap();
        assert_eq!(normalized.humidity, 100.0);
        assert_eq!(normalized.wind_speed, 0.0);
    }

    #[test]
    fn test_normalize_rejects_bad_timestamp() {
        let reading = raw("Delhi", i64::MAX, 30.0, Condition::Clear);
        assert!(normalize(&reading).is_err());
    }

    #[test]
    fn test_normalize_all_skips_bad_readings() {
        let readings = vec![
            raw("Delhi", MAY_1, 30.0, Condition::Clear),
            raw("Delhi", MAY_1 + 60, f64::NAN, Condition::Clear),
            raw("Mumbai", MAY_1, 31.0, Condition::Rain),
        ];

        let normalized = normalize_all(&readings);
        let locations: Vec<&str> = normalized.iter().map(|o| o.location.as_str()).collect();
        assert_eq!(locations, vec!["Delhi", "Mumbai"]);
    }

    #[test]
    fn test_daily_summary_groups_by_location_and_date() {
        let observations = vec![
            obs("Delhi", MAY_1, 30.0, Condition::Clear),
            obs("Mumbai", MAY_1, 28.0, Condition::Rain),
            obs("Delhi", MAY_1 + 3_600, 34.0, Condition::Clear),
            obs("Delhi", MAY_1 + DAY, 25.0, Condition::Clouds),
        ];

        let summaries = daily_summary(&observations);
        let keys: Vec<(&str, NaiveDate)> = summaries
            .iter()
            .map(|s| (s.location.as_str(), s.date))
            .collect();
        assert_eq!(keys, vec![("Delhi", may(1)), ("Mumbai", may(1)), ("Delhi", may(2))]);

        let delhi = &summaries[0].stats;
        assert_eq!(delhi.avg_temperature, 32.0);
        assert_eq!(delhi.max_temperature, 34.0);
        assert_eq!(delhi.min_temperature, 30.0);
        assert_eq!(delhi.avg_humidity, 60.0);
        assert_eq!(delhi.avg_wind_speed, 3.0);
        assert_eq!(delhi.dominant_condition, Condition::Clear);
        assert_eq!(delhi.sample_count, 2);
    }

    #[test]
    fn test_dominant_condition_highest_count_wins() {
        let observations = vec![
            obs("Delhi", MAY_1, 30.0, Condition::Clear),
            obs("Delhi", MAY_1 + 60, 30.0, Condition::Haze),
            obs("Delhi", MAY_1 + 120, 30.0, Condition::Haze),
        ];

        let summaries = daily_summary(&observations);
        assert_eq!(summaries[0].stats.dominant_condition, Condition::Haze);
    }

    #[test]
    fn test_dominant_condition_tie_goes_to_first_seen() {
        let observations = vec![
            obs("Delhi", MAY_1, 30.0, Condition::Rain),
            obs("Delhi", MAY_1 + 60, 30.0, Condition::Clear),
            obs("Delhi", MAY_1 + 120, 30.0, Condition::Clear),
            obs("Delhi", MAY_1 + 180, 30.0, Condition::Rain),
        ];
        assert_eq!(
            daily_summary(&observations)[0].stats.dominant_condition,
            Condition::Rain
        );

        let mut reversed = observations.clone();
        reversed.reverse();
        // Palindrome: Rain is still seen first
        assert_eq!(
            daily_summary(&reversed)[0].stats.dominant_condition,
            Condition::Rain
        );

        reversed.rotate_left(1);
        // Clear, Clear, Rain, Rain
        assert_eq!(
            daily_summary(&reversed)[0].stats.dominant_condition,
            Condition::Clear
        );
    }

    #[test]
    fn test_daily_summary_statistics_ignore_order() {
        let observations = vec![
            obs("Delhi", MAY_1, 29.5, Condition::Clear),
            obs("Delhi", MAY_1 + 60, 33.0, Condition::Clear),
            obs("Delhi", MAY_1 + 120, 31.0, Condition::Clear),
            obs("Delhi", MAY_1 + 180, 35.5, Condition::Clear),
        ];
        let mut shuffled = observations.clone();
        shuffled.swap(0, 3);
        shuffled.swap(1, 2);

        let a = &daily_summary(&observations)[0].stats;
        let b = &daily_summary(&shuffled)[0].stats;
        assert!((a.avg_temperature - b.avg_temperature).abs() < 1e-9);
        assert_eq!(a.max_temperature, b.max_temperature);
        assert_eq!(a.min_temperature, b.min_temperature);
    }

    #[test]
    fn test_daily_summary_is_idempotent() {
        let observations = vec![
            obs("Delhi", MAY_1, 30.0, Condition::Clear),
            obs("Delhi", MAY_1 + 60, 31.0, Condition::Haze),
        ];
        assert_eq!(daily_summary(&observations), daily_summary(&observations));
    }

    #[test]
    fn test_daily_summary_empty_input() {
        assert!(daily_summary(&[]).is_empty());
    }

    #[test]
    fn test_forecast_summary_per_forecast_date() {
        let mut forecasts = BTreeMap::new();
        forecasts.insert(
            "Delhi".to_string(),
            (0..16)
                .map(|i| obs("Delhi", MAY_1 + i * 10_800, 30.0 + i as f64, Condition::Clear))
                .collect(),
        );
        forecasts.insert("Nowhere".to_string(), Vec::new());

        let summaries = forecast_summary(&forecasts);
        assert_eq!(summaries.len(), 1);

        let delhi = &summaries["Delhi"];
        assert_eq!(delhi.len(), 2);
        assert_eq!(delhi[0].forecast_date, may(1));
        assert_eq!(delhi[1].forecast_date, may(2));
        assert_eq!(delhi[0].stats.sample_count, 8);
        assert_eq!(delhi[0].stats.min_temperature, 30.0);
        assert_eq!(delhi[0].stats.max_temperature, 37.0);
        assert_eq!(delhi[1].stats.avg_temperature, 41.5);
    }
}
