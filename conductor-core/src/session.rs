//! Session metadata and pipeline results.

use crate::{new_entity_id, AgentResult, DurationMs, EntityId, Learning, SessionConfig, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Immutable description of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session_id: EntityId,
    pub start_time: Timestamp,
    pub original_input: Value,
    pub initiator: String,
    pub tags: Vec<String>,
    pub config: SessionConfig,
}

impl SessionMeta {
    pub fn new(original_input: Value, initiator: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            session_id: new_entity_id(),
            start_time: Utc::now(),
            original_input,
            initiator: initiator.into(),
            tags: Vec::new(),
            config,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Aggregate counters for a finished run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub total_agents: usize,
    pub successful_agents: usize,
    pub failed_agents: usize,
    /// Agents the session learner skipped or that were not registered
    pub skipped_agents: usize,
    pub average_confidence: f64,
    pub total_retries: u32,
    pub total_cost: f64,
    pub learnings_generated: usize,
}

impl PipelineMetrics {
    /// Compute metrics from the per-agent results of a run.
    pub fn from_results(
        results: &[AgentResult],
        skipped_agents: usize,
        learnings_generated: usize,
    ) -> Self {
        let total_agents = results.len();
        let successful_agents = results.iter().filter(|r| r.output.success).count();
        let average_confidence = if total_agents == 0 {
            0.0
        } else {
            results.iter().map(|r| r.output.confidence).sum::<f64>() / total_agents as f64
        };

        Self {
            total_agents,
            successful_agents,
            failed_agents: total_agents - successful_agents,
            skipped_agents,
            average_confidence,
            total_retries: results.iter().map(|r| r.output.metrics.retry_count).sum(),
            total_cost: results.iter().map(|r| r.output.metrics.cost).sum(),
            learnings_generated,
        }
    }
}

/// Final, immutable outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub pipeline_id: String,
    pub session_id: EntityId,
    pub success: bool,
    pub agent_results: Vec<AgentResult>,
    pub total_execution_time_ms: DurationMs,
    pub learnings: Vec<Learning>,
    pub final_output: Value,
    pub metrics: PipelineMetrics,
    /// Why the run stopped early, if it did
    pub halt_reason: Option<String>,
}
