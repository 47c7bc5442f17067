//! Handoff protocol.
//!
//! A [`HandoffContext`] is the value passed from one agent to the next. It is
//! never mutated in place: every transition builds a new context carrying the
//! accumulated trail and merged learnings.
//!
//! ```text
//! create_initial_handoff() ──→ ctx₀ ── agent₀ ── create_handoff() ──→ ctx₁ ── agent₁ ──→ …
//! ```

use crate::{
    merge_learnings, new_entity_id, render_value, truncate_chars, AgentOutput, DurationMs,
    EntityId, HandoffError, Learning, LearningType, Timestamp, TrailEntry,
    OUTPUT_SUMMARY_MAX_CHARS,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Maximum length of learning content derived from an agent output.
pub const LEARNING_CONTENT_MAX_CHARS: usize = 200;

/// Number of trail entries the health check looks back over.
pub const HEALTH_WINDOW: usize = 3;

// ============================================================================
// HANDOFF PRIORITY
// ============================================================================

/// Priority of a handoff.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum HandoffPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl HandoffPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffPriority::Low => "low",
            HandoffPriority::Medium => "medium",
            HandoffPriority::High => "high",
            HandoffPriority::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Result<Self, HandoffPriorityParseError> {
        match s.to_lowercase().as_str() {
            "low" => Ok(HandoffPriority::Low),
            "medium" | "normal" => Ok(HandoffPriority::Medium),
            "high" => Ok(HandoffPriority::High),
            "critical" => Ok(HandoffPriority::Critical),
            _ => Err(HandoffPriorityParseError(s.to_string())),
        }
    }

    /// One level up; `Critical` stays `Critical`.
    pub fn escalated(self) -> Self {
        match self {
            HandoffPriority::Low => HandoffPriority::Medium,
            HandoffPriority::Medium => HandoffPriority::High,
            HandoffPriority::High | HandoffPriority::Critical => HandoffPriority::Critical,
        }
    }
}

impl fmt::Display for HandoffPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HandoffPriority {
    type Err = HandoffPriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error when parsing an invalid handoff priority string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffPriorityParseError(pub String);

impl fmt::Display for HandoffPriorityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid handoff priority: {}", self.0)
    }
}

impl std::error::Error for HandoffPriorityParseError {}

// ============================================================================
// HANDOFF CONTEXT
// ============================================================================

/// Structured context transferred between agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffContext {
    pub handoff_id: EntityId,
    /// `None` for the initial handoff of a run
    pub from_agent: Option<String>,
    pub to_agent: String,
    pub payload: Value,
    pub learnings: Vec<Learning>,
    pub agent_trail: Vec<TrailEntry>,
    pub priority: HandoffPriority,
    pub timestamp: Timestamp,
    pub deadline: Option<Timestamp>,
}

impl HandoffContext {
    /// Copy of this context pointed at a different agent.
    pub fn retarget(&self, to_agent: impl Into<String>) -> Self {
        Self {
            to_agent: to_agent.into(),
            ..self.clone()
        }
    }

    pub fn with_priority(mut self, priority: HandoffPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Whether `agent_id` already completed in this run.
    pub fn has_visited(&self, agent_id: &str) -> bool {
        self.agent_trail.iter().any(|entry| entry.agent_id == agent_id)
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.deadline.is_some_and(|deadline| now > deadline)
    }
}

/// Options for the first handoff of a run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandoffOptions {
    pub priority: HandoffPriority,
    pub deadline: Option<Timestamp>,
}

/// Build the first handoff of a run: no source agent, empty learnings and trail.
pub fn create_initial_handoff(
    to_agent: impl Into<String>,
    payload: Value,
    options: HandoffOptions,
) -> HandoffContext {
    HandoffContext {
        handoff_id: new_entity_id(),
        from_agent: None,
        to_agent: to_agent.into(),
        payload,
        learnings: Vec::new(),
        agent_trail: Vec::new(),
        priority: options.priority,
        timestamp: Utc::now(),
        deadline: options.deadline,
    }
}

/// Build the handoff that follows `from_agent`'s execution.
///
/// Appends a trail entry for `from_agent` spanning from the previous handoff's
/// timestamp to now, merges the output's learnings into the carried ones and
/// forwards the output's result as the next payload. Learnings without a
/// source are attributed to `from_agent`. Priority and deadline carry over.
pub fn create_handoff(
    from_agent: &str,
    to_agent: &str,
    prev: &HandoffContext,
    output: &AgentOutput,
    execution_time_ms: DurationMs,
) -> HandoffContext {
    let now = Utc::now();

    let mut agent_trail = prev.agent_trail.clone();
    agent_trail.push(TrailEntry {
        agent_id: from_agent.to_string(),
        start_time: prev.timestamp,
        end_time: now,
        success: output.success,
        confidence: output.confidence,
        output_summary: truncate_chars(&render_value(&output.result), OUTPUT_SUMMARY_MAX_CHARS),
        execution_time_ms,
    });

    let attributed = attribute_learnings(&output.learnings, from_agent);

    HandoffContext {
        handoff_id: new_entity_id(),
        from_agent: Some(from_agent.to_string()),
        to_agent: to_agent.to_string(),
        payload: output.result.clone(),
        learnings: merge_learnings(&prev.learnings, &attributed),
        agent_trail,
        priority: prev.priority,
        timestamp: now,
        deadline: prev.deadline,
    }
}

/// Copy `learnings`, attributing those without a source to `agent_id`.
pub fn attribute_learnings(learnings: &[Learning], agent_id: &str) -> Vec<Learning> {
    learnings
        .iter()
        .cloned()
        .map(|mut learning| {
            if learning.source.trim().is_empty() {
                learning.source = agent_id.to_string();
            }
            learning
        })
        .collect()
}

// ============================================================================
// VALIDATION
// ============================================================================

/// A single problem found in a handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandoffIssue {
    MissingId,
    MissingTarget,
    DeadlineExpired { deadline: Timestamp },
    /// The target agent already appears in the trail
    Cycle { agent_id: String },
}

impl fmt::Display for HandoffIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoffIssue::MissingId => write!(f, "Missing handoff id"),
            HandoffIssue::MissingTarget => write!(f, "Missing target agent"),
            HandoffIssue::DeadlineExpired { deadline } => {
                write!(f, "Deadline expired at {}", deadline.to_rfc3339())
            }
            HandoffIssue::Cycle { agent_id } => {
                write!(f, "Cycle detected: {agent_id} already executed")
            }
        }
    }
}

/// Every issue found in a handoff; valid when empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HandoffValidation {
    pub issues: Vec<HandoffIssue>,
}

impl HandoffValidation {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_cycle(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| matches!(issue, HandoffIssue::Cycle { .. }))
    }

    pub fn into_result(self) -> Result<(), HandoffError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(HandoffError::Invalid {
                issues: self.issues.iter().map(ToString::to_string).collect(),
            })
        }
    }
}

/// Validate a handoff against the current time.
pub fn validate_handoff(handoff: &HandoffContext) -> HandoffValidation {
    validate_handoff_at(handoff, Utc::now())
}

/// Validate a handoff, reporting all issues rather than the first.
pub fn validate_handoff_at(handoff: &HandoffContext, now: Timestamp) -> HandoffValidation {
    let mut issues = Vec::new();

    if handoff.handoff_id.is_nil() {
        issues.push(HandoffIssue::MissingId);
    }

    let target_missing = handoff.to_agent.trim().is_empty();
    if target_missing {
        issues.push(HandoffIssue::MissingTarget);
    }

    if let Some(deadline) = handoff.deadline {
        if now > deadline {
            issues.push(HandoffIssue::DeadlineExpired { deadline });
        }
    }

    if !target_missing && handoff.has_visited(&handoff.to_agent) {
        issues.push(HandoffIssue::Cycle {
            agent_id: handoff.to_agent.clone(),
        });
    }

    HandoffValidation { issues }
}

// ============================================================================
// QUERIES
// ============================================================================

/// Learnings worth surfacing to an agent with the given capabilities.
///
/// Keeps a learning when its confidence exceeds 0.9, when its domain matches a
/// capability (case-insensitive substring, either direction), or when it is
/// actionable with confidence above 0.7. Blank domains and capabilities never
/// match.
pub fn extract_relevant_learnings(handoff: &HandoffContext, capabilities: &[String]) -> Vec<Learning> {
    let capabilities: Vec<String> = capabilities
        .iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    handoff
        .learnings
        .iter()
        .filter(|learning| {
            if learning.confidence > 0.9 {
                return true;
            }
            let domain_match = learning.domain.as_ref().is_some_and(|domain| {
                let domain = domain.trim().to_lowercase();
                if domain.is_empty() {
                    return false;
                }
                capabilities
                    .iter()
                    .any(|cap| cap.contains(&domain) || domain.contains(cap.as_str()))
            });
            domain_match || (learning.actionable && learning.confidence > 0.7)
        })
        .cloned()
        .collect()
}

/// Aggregate view over a handoff's trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailSummary {
    pub total_agents: usize,
    pub successful_agents: usize,
    pub average_confidence: f64,
    /// Milliseconds from the first entry's start to the last entry's end
    pub total_time_ms: i64,
    /// Agent ids joined by `" -> "`, or `"(start)"` for an empty trail
    pub path: String,
}

pub fn get_trail_summary(handoff: &HandoffContext) -> TrailSummary {
    let trail = &handoff.agent_trail;
    let (Some(first), Some(last)) = (trail.first(), trail.last()) else {
        return TrailSummary {
            total_agents: 0,
            successful_agents: 0,
            average_confidence: 0.0,
            total_time_ms: 0,
            path: "(start)".to_string(),
        };
    };

    TrailSummary {
        total_agents: trail.len(),
        successful_agents: trail.iter().filter(|entry| entry.success).count(),
        average_confidence: trail.iter().map(|entry| entry.confidence).sum::<f64>()
            / trail.len() as f64,
        total_time_ms: (last.end_time - first.start_time).num_milliseconds(),
        path: trail
            .iter()
            .map(|entry| entry.agent_id.as_str())
            .collect::<Vec<_>>()
            .join(" -> "),
    }
}

/// Health-check verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinueDecision {
    pub should_continue: bool,
    pub reason: String,
}

impl ContinueDecision {
    fn proceed() -> Self {
        Self {
            should_continue: true,
            reason: "Pipeline healthy".to_string(),
        }
    }

    fn halt(reason: impl Into<String>) -> Self {
        Self {
            should_continue: false,
            reason: reason.into(),
        }
    }
}

/// Decide whether the pipeline should run another agent.
pub fn should_continue_pipeline(handoff: &HandoffContext, min_confidence: f64) -> ContinueDecision {
    should_continue_pipeline_at(handoff, min_confidence, Utc::now())
}

/// Health check: deadline, consecutive failures, then recent confidence.
pub fn should_continue_pipeline_at(
    handoff: &HandoffContext,
    min_confidence: f64,
    now: Timestamp,
) -> ContinueDecision {
    if handoff.is_expired_at(now) {
        return ContinueDecision::halt("Deadline exceeded");
    }

    let trail = &handoff.agent_trail;
    let recent = &trail[trail.len().saturating_sub(HEALTH_WINDOW)..];

    let failures = recent.iter().filter(|entry| !entry.success).count();
    if failures >= HEALTH_WINDOW {
        return ContinueDecision::halt("Too many consecutive failures");
    }

    if recent.len() >= 2 {
        let mean = recent.iter().map(|entry| entry.confidence).sum::<f64>() / recent.len() as f64;
        if mean < min_confidence {
            return ContinueDecision::halt(format!(
                "Average confidence {mean:.2} below threshold {min_confidence:.2}"
            ));
        }
    }

    ContinueDecision::proceed()
}

/// Turn an agent output into an `insight` learning.
pub fn create_learning_from_output(agent_id: &str, output: &AgentOutput) -> Learning {
    create_typed_learning_from_output(agent_id, output, LearningType::Insight)
}

/// Turn an agent output into a learning of the given type. Content is the
/// rendered result truncated to [`LEARNING_CONTENT_MAX_CHARS`].
pub fn create_typed_learning_from_output(
    agent_id: &str,
    output: &AgentOutput,
    learning_type: LearningType,
) -> Learning {
    Learning::new(
        learning_type,
        truncate_chars(&render_value(&output.result), LEARNING_CONTENT_MAX_CHARS),
        agent_id,
        output.confidence,
    )
    .with_actionable(output.success)
}

// ============================================================================
// TESTS
// ============================================================================
