//! Significance-weighted temporal event log.

use conductor_core::{clamp_unit, new_entity_id, EntityId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Maximum number of events retained; the weakest is evicted past this.
pub const MAX_TEMPORAL_EVENTS: usize = 200;

/// Time scale an event is remembered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemporalScale {
    Immediate,
    #[default]
    ShortTerm,
    MediumTerm,
    LongTerm,
}

impl TemporalScale {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemporalScale::Immediate => "immediate",
            TemporalScale::ShortTerm => "short_term",
            TemporalScale::MediumTerm => "medium_term",
            TemporalScale::LongTerm => "long_term",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TemporalScaleParseError> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "immediate" => Ok(TemporalScale::Immediate),
            "short_term" | "short" => Ok(TemporalScale::ShortTerm),
            "medium_term" | "medium" => Ok(TemporalScale::MediumTerm),
            "long_term" | "long" => Ok(TemporalScale::LongTerm),
            _ => Err(TemporalScaleParseError(s.to_string())),
        }
    }

    /// Seconds that count as a full unit of distance on this scale.
    pub fn unit_seconds(&self) -> f64 {
        match self {
            TemporalScale::Immediate => 1.0,
            TemporalScale::ShortTerm => 3_600.0,
            TemporalScale::MediumTerm => 86_400.0,
            TemporalScale::LongTerm => 2_592_000.0,
        }
    }
}

impl fmt::Display for TemporalScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TemporalScale {
    type Err = TemporalScaleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error when parsing an invalid temporal scale string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalScaleParseError(pub String);

impl fmt::Display for TemporalScaleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid temporal scale: {}", self.0)
    }
}

impl std::error::Error for TemporalScaleParseError {}

/// A remembered event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalEvent {
    pub id: EntityId,
    pub timestamp: Timestamp,
    pub event_type: String,
    pub description: String,
    /// Significance in [0.0, 1.0]
    pub significance: f64,
    /// Starts at 1.0 and only decays
    pub memory_strength: f64,
    pub scale: TemporalScale,
    #[serde(default)]
    pub data: Value,
}

impl TemporalEvent {
    pub fn new(event_type: impl Into<String>, description: impl Into<String>, significance: f64) -> Self {
        Self {
            id: new_entity_id(),
            timestamp: Utc::now(),
            event_type: event_type.into(),
            description: description.into(),
            significance: clamp_unit(significance),
            memory_strength: 1.0,
            scale: TemporalScale::default(),
            data: Value::Null,
        }
    }

    pub fn with_scale(mut self, scale: TemporalScale) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Distance from `now`, normalized by the event's scale and capped at 1.
    pub fn distance(&self, now: Timestamp) -> f64 {
        let seconds = (now - self.timestamp).num_milliseconds().unsigned_abs() as f64 / 1000.0;
        (seconds / self.scale.unit_seconds()).min(1.0)
    }

    pub fn relevance(&self, now: Timestamp) -> f64 {
        self.significance * self.memory_strength / (1.0 + self.distance(now))
    }

    fn weight(&self) -> f64 {
        self.significance * self.memory_strength
    }
}

/// Bounded event log.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemporalMemory {
    events: Vec<TemporalEvent>,
}

impl TemporalMemory {
    /// Record an event, evicting the weakest one if the log is full.
    /// Returns the evicted event, if any.
    pub fn record(&mut self, event: TemporalEvent) -> Option<TemporalEvent> {
        self.events.push(event);
        if self.events.len() <= MAX_TEMPORAL_EVENTS {
            return None;
        }

        // Ties evict the oldest event.
        let weakest = self
            .events
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.weight().total_cmp(&b.weight()))
            .map(|(index, _)| index)?;
        Some(self.events.remove(weakest))
    }

    /// Multiply every event's memory strength by `factor` (clamped to [0, 1]).
    pub fn decay(&mut self, factor: f64) {
        let factor = clamp_unit(factor);
        for event in &mut self.events {
            event.memory_strength = clamp_unit(event.memory_strength * factor);
        }
    }

    /// Events whose relevance at `now` exceeds `threshold`, most relevant first.
    pub fn relevant_events(&self, now: Timestamp, threshold: f64) -> Vec<&TemporalEvent> {
        let mut relevant: Vec<&TemporalEvent> = self
            .events
            .iter()
            .filter(|event| event.relevance(now) > threshold)
            .collect();
        relevant.sort_by(|a, b| b.relevance(now).total_cmp(&a.relevance(now)));
        relevant
    }

    pub fn events(&self) -> &[TemporalEvent] {
        &self.events
    }

    pub fn latest(&self) -> Option<&TemporalEvent> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The log never exceeds its capacity.
        #[test]
        fn prop_log_is_bounded(significances in prop::collection::vec(0.0f64..=1.0, 0..400)) {
            let mut memory = TemporalMemory::default();
            for (i, significance) in significances.iter().enumerate() {
                memory.record(TemporalEvent::new("step", format!("{i}"), *significance));
            }
            prop_assert!(memory.len() <= MAX_TEMPORAL_EVENTS);
        }

        /// Relevance never exceeds significance.
        #[test]
        fn prop_relevance_bounded_by_significance(
            significance in 0.0f64..=1.0,
            factor in 0.0f64..=1.0,
            age_secs in 0i64..100_000,
        ) {
            let now = Utc::now();
            let mut memory = TemporalMemory::default();
            memory.record(
                TemporalEvent::new("step", "x", significance)
                    .with_timestamp(now - chrono::Duration::seconds(age_secs)),
            );
            memory.decay(factor);
            let event = &memory.events()[0];
            prop_assert!(event.relevance(now) <= significance + 1e-12);
        }
    }
}
