//! Learnings and the confidence-ranked merge used wherever knowledge is
//! combined (handoffs, run results, consciousness enrichment).

use crate::{compute_content_hash, new_entity_id, ContentHash, EntityId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Upper bound on the number of learnings carried by any merged list.
pub const MAX_MERGED_LEARNINGS: usize = 20;

/// Confidence differences at or below this band are treated as noise and
/// ordered by recency instead.
pub const CONFIDENCE_TIE_BAND: f64 = 0.1;

const TIE_BAND_EPSILON: f64 = 1e-9;

// ============================================================================
// LEARNING TYPE
// ============================================================================

/// Kind of distilled knowledge a learning carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningType {
    SuccessPattern,
    FailurePattern,
    Insight,
    Strategy,
    Correction,
    Optimization,
}

impl LearningType {
    /// Wire representation (snake_case).
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningType::SuccessPattern => "success_pattern",
            LearningType::FailurePattern => "failure_pattern",
            LearningType::Insight => "insight",
            LearningType::Strategy => "strategy",
            LearningType::Correction => "correction",
            LearningType::Optimization => "optimization",
        }
    }

    /// Parse from the wire representation. Accepts hyphens in place of
    /// underscores and any casing.
    pub fn parse(s: &str) -> Result<Self, LearningTypeParseError> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "success_pattern" => Ok(LearningType::SuccessPattern),
            "failure_pattern" => Ok(LearningType::FailurePattern),
            "insight" => Ok(LearningType::Insight),
            "strategy" => Ok(LearningType::Strategy),
            "correction" => Ok(LearningType::Correction),
            "optimization" => Ok(LearningType::Optimization),
            _ => Err(LearningTypeParseError(s.to_string())),
        }
    }
}

impl fmt::Display for LearningType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LearningType {
    type Err = LearningTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error when parsing an invalid learning type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearningTypeParseError(pub String);

impl fmt::Display for LearningTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid learning type: {}", self.0)
    }
}

impl std::error::Error for LearningTypeParseError {}

// ============================================================================
// LEARNING
// ============================================================================

/// A timestamped, confidence-scored unit of distilled knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learning {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub learning_type: LearningType,
    pub content: String,
    /// Agent or component that produced the learning
    pub source: String,
    /// Confidence in [0.0, 1.0]
    pub confidence: f64,
    pub timestamp: Timestamp,
    pub actionable: bool,
    pub domain: Option<String>,
}

impl Learning {
    /// Create a new learning stamped with the current time.
    /// Confidence is clamped into [0.0, 1.0].
    pub fn new(
        learning_type: LearningType,
        content: impl Into<String>,
        source: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: new_entity_id(),
            learning_type,
            content: content.into(),
            source: source.into(),
            confidence: clamp_unit(confidence),
            timestamp: Utc::now(),
            actionable: false,
            domain: None,
        }
    }

    pub fn with_actionable(mut self, actionable: bool) -> Self {
        self.actionable = actionable;
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn content_hash(&self) -> ContentHash {
        compute_content_hash(self.content.as_bytes())
    }
}

/// Clamp a score into [0.0, 1.0]; NaN maps to 0.0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================================
// MERGE
// ============================================================================

/// Merge candidate learnings into an existing list.
///
/// A candidate is dropped when an entry already kept has identical content or
/// the same `(type, source)` pair. Survivors are appended, the combined list is
/// ranked with [`rank_learnings`] and truncated to [`MAX_MERGED_LEARNINGS`].
pub fn merge_learnings(existing: &[Learning], candidates: &[Learning]) -> Vec<Learning> {
    let mut merged: Vec<Learning> = Vec::with_capacity(existing.len() + candidates.len());
    let mut seen_content: HashSet<ContentHash> = HashSet::new();
    let mut seen_origin: HashSet<(LearningType, String)> = HashSet::new();

    for learning in existing.iter().chain(candidates.iter()) {
        let hash = learning.content_hash();
        let origin = (learning.learning_type, learning.source.clone());
        if seen_content.contains(&hash) || seen_origin.contains(&origin) {
            continue;
        }
        seen_content.insert(hash);
        seen_origin.insert(origin);
        merged.push(learning.clone());
    }

    rank_learnings(&mut merged);
    merged.truncate(MAX_MERGED_LEARNINGS);
    merged
}

/// Order learnings by confidence descending, breaking near-ties (within
/// [`CONFIDENCE_TIE_BAND`]) by timestamp descending.
///
/// The tie band makes the ordering non-transitive, so this uses a stable
/// insertion pass instead of `sort_by`, which requires a total order.
pub fn rank_learnings(learnings: &mut [Learning]) {
    for i in 1..learnings.len() {
        let mut j = i;
        while j > 0 && ranks_before(&learnings[j], &learnings[j - 1]) {
            learnings.swap(j, j - 1);
            j -= 1;
        }
    }
}

fn ranks_before(a: &Learning, b: &Learning) -> bool {
    let within_band =
        (a.confidence - b.confidence).abs() <= CONFIDENCE_TIE_BAND + TIE_BAND_EPSILON;
    if within_band && a.timestamp != b.timestamp {
        a.timestamp > b.timestamp
    } else {
        a.confidence > b.confidence
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_learning_type() -> impl Strategy<Value = LearningType> {
        prop_oneof![
            Just(LearningType::SuccessPattern),
            Just(LearningType::FailurePattern),
            Just(LearningType::Insight),
            Just(LearningType::Strategy),
            Just(LearningType::Correction),
            Just(LearningType::Optimization),
        ]
    }

    fn arb_learning() -> impl Strategy<Value = Learning> {
        (
            arb_learning_type(),
            "[a-d]{1,3}",
            prop_oneof![Just("alpha"), Just("beta"), Just("gamma"), Just("delta")],
            0.0f64..=1.0,
        )
            .prop_map(|(kind, content, source, confidence)| {
                Learning::new(kind, content, source, confidence)
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Merged lists stay bounded and free of duplicate content or origin.
        #[test]
        fn prop_merge_bounded_and_unique(
            existing in prop::collection::vec(arb_learning(), 0..15),
            candidates in prop::collection::vec(arb_learning(), 0..30),
        ) {
            let clean = merge_learnings(&[], &existing);
            let merged = merge_learnings(&clean, &candidates);

            prop_assert!(merged.len() <= MAX_MERGED_LEARNINGS);
            for (i, a) in merged.iter().enumerate() {
                for b in merged.iter().skip(i + 1) {
                    prop_assert_ne!(&a.content, &b.content);
                    prop_assert!(
                        !(a.learning_type == b.learning_type && a.source == b.source),
                        "duplicate origin {:?}/{}", a.learning_type, a.source
                    );
                }
            }
        }

        /// Adjacent entries outside the tie band are ordered by confidence.
        #[test]
        fn prop_merge_orders_outside_tie_band(
            candidates in prop::collection::vec(arb_learning(), 0..30),
        ) {
            let merged = merge_learnings(&[], &candidates);
            for pair in merged.windows(2) {
                let gap = pair[1].confidence - pair[0].confidence;
                prop_assert!(gap <= CONFIDENCE_TIE_BAND + TIE_BAND_EPSILON);
            }
        }
    }
}
