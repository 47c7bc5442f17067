//! Agent output and trail types.
//!
//! These are the values an agent produces and the record the pipeline keeps of
//! each completed agent. Agent behavior itself lives in `conductor-agents`.

use crate::{clamp_unit, DurationMs, Learning, LearningType, Signal, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum length of a trail entry's output summary.
pub const OUTPUT_SUMMARY_MAX_CHARS: usize = 100;

// ============================================================================
// AGENT OUTPUT
// ============================================================================

/// Execution metrics attached to an output by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub execution_time_ms: DurationMs,
    pub retry_count: u32,
    /// Cost reported by the agent, counted against the session cost budget
    #[serde(default)]
    pub cost: f64,
}

/// Result of a single agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub result: Value,
    pub success: bool,
    /// Confidence in [0.0, 1.0]
    pub confidence: f64,
    #[serde(default)]
    pub learnings: Vec<Learning>,
    #[serde(default)]
    pub signals: Vec<Signal>,
    pub next_agent: Option<String>,
    #[serde(default)]
    pub metrics: AgentMetrics,
}

impl AgentOutput {
    /// A successful output continuing the pipeline.
    pub fn success(result: Value, confidence: f64) -> Self {
        Self {
            result,
            success: true,
            confidence: clamp_unit(confidence),
            learnings: Vec::new(),
            signals: vec![Signal::Continue],
            next_agent: None,
            metrics: AgentMetrics::default(),
        }
    }

    /// A failed output continuing the pipeline.
    pub fn failure(result: Value, confidence: f64) -> Self {
        Self {
            success: false,
            ..Self::success(result, confidence)
        }
    }

    /// Synthetic output standing in for an agent whose every attempt failed.
    /// Carries one `failure_pattern` learning describing the error and zero
    /// metrics.
    pub fn from_error(agent_id: &str, error: &str) -> Self {
        let learning = Learning::new(
            LearningType::FailurePattern,
            format!("Agent {agent_id} failed: {error}"),
            agent_id,
            0.9,
        )
        .with_actionable(true);

        Self {
            result: Value::Null,
            success: false,
            confidence: 0.0,
            learnings: vec![learning],
            signals: vec![Signal::Continue],
            next_agent: None,
            metrics: AgentMetrics::default(),
        }
    }

    pub fn with_learnings(mut self, learnings: Vec<Learning>) -> Self {
        self.learnings = learnings;
        self
    }

    pub fn with_learning(mut self, learning: Learning) -> Self {
        self.learnings.push(learning);
        self
    }

    pub fn with_signals(mut self, signals: Vec<Signal>) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_next_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.next_agent = Some(agent_id.into());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.metrics.cost = cost;
        self
    }

    pub fn has_signal(&self, signal: Signal) -> bool {
        self.signals.contains(&signal)
    }
}

// ============================================================================
// TRAIL
// ============================================================================

/// Record of one completed agent in the current run. Trails are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailEntry {
    pub agent_id: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub success: bool,
    pub confidence: f64,
    /// At most [`OUTPUT_SUMMARY_MAX_CHARS`] characters
    pub output_summary: String,
    pub execution_time_ms: DurationMs,
}

/// Per-agent entry in a pipeline result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub output: AgentOutput,
    pub started_at: Timestamp,
    pub completed_at: Timestamp,
}
