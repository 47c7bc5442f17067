//! Handoff enrichment from consciousness.

use crate::{ConsciousnessContext, PatternRecord};
use conductor_core::{merge_learnings, HandoffContext, Learning, LearningType};

/// Number of top insights carried into a handoff.
pub const ENRICH_INSIGHT_COUNT: usize = 3;

/// Number of most recent success and failure patterns carried into a handoff.
pub const ENRICH_PATTERN_COUNT: usize = 2;

/// Confidence given to learnings derived from recorded patterns.
pub const PATTERN_CONFIDENCE: f64 = 0.8;

/// Return a copy of `handoff` whose learnings also carry the session's
/// strongest insights and most recent patterns. The consciousness context is
/// only read.
pub fn enrich_handoff_with_consciousness(
    handoff: &HandoffContext,
    consciousness: &ConsciousnessContext,
) -> HandoffContext {
    let session = &consciousness.session;

    let mut derived: Vec<Learning> = session
        .top_insights(ENRICH_INSIGHT_COUNT)
        .into_iter()
        .map(|insight| {
            Learning::new(
                LearningType::Insight,
                insight.content.clone(),
                insight.source.clone(),
                insight.importance,
            )
            .with_timestamp(insight.timestamp)
        })
        .collect();

    derived.extend(recent_patterns(&session.success_patterns, LearningType::SuccessPattern));
    derived.extend(recent_patterns(&session.failure_patterns, LearningType::FailurePattern));

    HandoffContext {
        learnings: merge_learnings(&handoff.learnings, &derived),
        ..handoff.clone()
    }
}

fn recent_patterns(
    patterns: &[PatternRecord],
    learning_type: LearningType,
) -> impl Iterator<Item = Learning> + '_ {
    patterns
        .iter()
        .skip(patterns.len().saturating_sub(ENRICH_PATTERN_COUNT))
        .map(move |pattern| {
            Learning::new(
                learning_type,
                pattern.description.clone(),
                pattern.source.clone(),
                PATTERN_CONFIDENCE,
            )
            .with_timestamp(pattern.timestamp)
        })
}
