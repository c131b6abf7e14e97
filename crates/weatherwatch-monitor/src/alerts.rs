//! Consecutive-breach alert detection.
//!
//! Every (location, threshold kind) pair runs a small state machine. A
//! breaching reading starts or extends a run; a non-breaching reading ends
//! it. When a run reaches `consecutive_updates` readings an alert is emitted
//! and the pair returns to `Idle`, so residual state never re-triggers.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use weatherwatch_core::AlertConfig;
use weatherwatch_weather::NormalizedObservation;

/// Which threshold a run is tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdKind {
    High,
    Low,
}

impl ThresholdKind {
    pub const ALL: [Self; 2] = [Self::High, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
        }
    }

    /// Strict comparison: a reading equal to the threshold is not a breach.
    fn is_breach(&self, temperature: f64, thresholds: &AlertThresholds) -> bool {
        match self {
            Self::High => temperature > thresholds.high,
            Self::Low => temperature < thresholds.low,
        }
    }
}

impl std::fmt::Display for ThresholdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sustained breach, emitted on the reading that completed the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub location: String,
    pub kind: ThresholdKind,
    pub temperature: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertThresholds {
    pub high: f64,
    pub low: f64,
    pub consecutive_updates: u32,
    /// Largest gap between two readings that still counts as consecutive
    pub max_gap: Duration,
}

impl AlertThresholds {
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            high: config.high_temperature,
            low: config.low_temperature,
            consecutive_updates: config.consecutive_updates,
            max_gap: Duration::minutes(i64::from(config.max_gap_minutes)),
        }
    }
}

/// Run state for one (location, kind)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreachState {
    Idle,
    Accumulating { count: u32, last_seen: DateTime<Utc> },
}

#[derive(Debug)]
pub struct AlertEngine {
    thresholds: AlertThresholds,
    // Absent means Idle
    states: HashMap<(String, ThresholdKind), BreachState>,
}

impl AlertEngine {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            thresholds,
            states: HashMap::new(),
        }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Feed a batch of readings and return the alerts they complete.
    ///
    /// Locations are processed in order of first appearance; each location's
    /// readings in timestamp order (ties keep input order).
    pub fn check(&mut self, observations: &[NormalizedObservation]) -> Vec<AlertEvent> {
        let mut order: Vec<&str> = Vec::new();
        let mut by_location: HashMap<&str, Vec<&NormalizedObservation>> = HashMap::new();
        for obs in observations {
            by_location
                .entry(obs.location.as_str())
                .or_insert_with(|| {
                    order.push(obs.location.as_str());
                    Vec::new()
                })
                .push(obs);
        }

        let mut events = Vec::new();
        for location in order {
            let Some(mut readings) = by_location.remove(location) else {
                continue;
            };
            readings.sort_by_key(|obs| obs.observed_at);
            for obs in readings {
                events.extend(self.observe(obs));
            }
        }
        events
    }

    /// Advance both state machines of `obs.location` by one reading.
    pub fn observe(&mut self, obs: &NormalizedObservation) -> Vec<AlertEvent> {
        ThresholdKind::ALL
            .iter()
            .filter_map(|kind| self.step(obs, *kind))
            .collect()
    }

    pub fn state(&self, location: &str, kind: ThresholdKind) -> BreachState {
        self.states
            .get(&(location.to_string(), kind))
            .copied()
            .unwrap_or(BreachState::Idle)
    }

    /// Forget every partial run.
    pub fn reset(&mut self) {
        self.states.clear();
    }

    fn step(&mut self, obs: &NormalizedObservation, kind: ThresholdKind) -> Option<AlertEvent> {
        let key = (obs.location.clone(), kind);

        if !kind.is_breach(obs.temperature, &self.thresholds) {
            self.states.remove(&key);
            return None;
        }

        let ts = obs.observed_at;
        let count = match self.states.get(&key) {
            Some(BreachState::Accumulating { count, last_seen }) => {
                let gap = ts - *last_seen;
                // Out-of-order or stale: start over
                if gap < Duration::zero() || gap > self.thresholds.max_gap {
                    1
                } else {
                    count + 1
                }
            }
            _ => 1,
        };

        if count >= self.thresholds.consecutive_updates.max(1) {
            self.states.remove(&key);
            tracing::warn!(
                "{} temperature alert for {}: {:.1}°C after {} consecutive readings",
                kind,
                obs.location,
                obs.temperature,
                count
            );
            return Some(AlertEvent {
                location: obs.location.clone(),
                kind,
                temperature: obs.temperature,
                timestamp: ts,
            });
        }

        self.states.insert(
            key,
            BreachState::Accumulating {
                count,
                last_seen: ts,
            },
        );
        None
    }
}
