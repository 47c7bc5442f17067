//! Run-scoped consciousness context.
//!
//! One [`ConsciousnessContext`] is created per pipeline run and owned by it
//! exclusively. Agents receive it mutably; the orchestrator updates it through
//! [`ConsciousnessContext::attend`], [`ConsciousnessContext::record_event`],
//! [`ConsciousnessContext::update_agent_model`] and [`apply_learnings`].

use crate::{
    AgentModel, AgentModelUpdate, AttentionItem, AttentionState, TemporalEvent, TemporalMemory,
};
use conductor_core::{clamp_unit, EntityId, Learning, LearningType, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Values every run starts with.
pub const CORE_VALUES: [&str; 5] = ["safety", "honesty", "helpfulness", "respect", "fairness"];

// ============================================================================
// SESSION STATE
// ============================================================================

/// A distilled observation kept for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub content: String,
    /// Importance in [0.0, 1.0]
    pub importance: f64,
    pub source: String,
    pub timestamp: Timestamp,
}

/// A recorded success or failure pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub description: String,
    pub source: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: EntityId,
    pub start_time: Timestamp,
    pub original_input: Value,
    pub current_phase: String,
    pub insights: Vec<Insight>,
    pub success_patterns: Vec<PatternRecord>,
    pub failure_patterns: Vec<PatternRecord>,
}

impl SessionState {
    /// Insights ordered by importance, highest first. Equal importance keeps
    /// insertion order.
    pub fn top_insights(&self, limit: usize) -> Vec<&Insight> {
        let mut ranked: Vec<&Insight> = self.insights.iter().collect();
        ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        ranked.truncate(limit);
        ranked
    }
}

/// Goals and constraints the run operates under. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSystem {
    pub core_values: Vec<String>,
    pub goals: Vec<String>,
    pub constraints: Vec<String>,
}

impl Default for ValueSystem {
    fn default() -> Self {
        Self {
            core_values: CORE_VALUES.iter().map(|v| v.to_string()).collect(),
            goals: Vec::new(),
            constraints: Vec::new(),
        }
    }
}

// ============================================================================
// CONSCIOUSNESS CONTEXT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsciousnessContext {
    pub session: SessionState,
    pub attention: AttentionState,
    pub temporal: TemporalMemory,
    pub social_models: HashMap<String, AgentModel>,
    pub values: ValueSystem,
}

impl ConsciousnessContext {
    pub fn attend(&mut self, item: AttentionItem) {
        self.attention.attend(item);
    }

    pub fn record_event(&mut self, event: TemporalEvent) {
        if let Some(evicted) = self.temporal.record(event) {
            tracing::debug!(
                session_id = %self.session.session_id,
                evicted = %evicted.description,
                "Temporal memory full, evicted weakest event"
            );
        }
    }

    /// Create or update the model for `agent_id`.
    pub fn update_agent_model(&mut self, agent_id: &str, update: AgentModelUpdate) -> &AgentModel {
        let model = self
            .social_models
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentModel::new(agent_id));
        model.apply(update);
        model
    }

    pub fn agent_model(&self, agent_id: &str) -> Option<&AgentModel> {
        self.social_models.get(agent_id)
    }

    pub fn set_phase(&mut self, phase: impl Into<String>) {
        self.session.current_phase = phase.into();
    }

    pub fn decay(&mut self, factor: f64) {
        self.temporal.decay(factor);
    }

    pub fn relevant_events(&self, now: Timestamp, threshold: f64) -> Vec<&TemporalEvent> {
        self.temporal.relevant_events(now, threshold)
    }
}

/// Fresh context for one run. A non-empty seed description becomes the run's
/// first goal.
pub fn create_consciousness_context(
    session_id: EntityId,
    original_input: Value,
    seed_description: &str,
) -> ConsciousnessContext {
    let mut values = ValueSystem::default();
    if !seed_description.trim().is_empty() {
        values.goals.push(seed_description.to_string());
    }

    ConsciousnessContext {
        session: SessionState {
            session_id,
            start_time: Utc::now(),
            original_input,
            current_phase: "initialization".to_string(),
            insights: Vec::new(),
            success_patterns: Vec::new(),
            failure_patterns: Vec::new(),
        },
        attention: AttentionState::default(),
        temporal: TemporalMemory::default(),
        social_models: HashMap::new(),
        values,
    }
}

/// Fold learnings into the session by type, skipping content already held.
/// Returns the number of learnings applied.
pub fn apply_learnings(ctx: &mut ConsciousnessContext, learnings: &[Learning]) -> usize {
    let session = &mut ctx.session;
    let mut applied = 0;

    for learning in learnings {
        let accepted = match learning.learning_type {
            LearningType::SuccessPattern => push_pattern(&mut session.success_patterns, learning),
            LearningType::FailurePattern => push_pattern(&mut session.failure_patterns, learning),
            LearningType::Insight
            | LearningType::Strategy
            | LearningType::Correction
            | LearningType::Optimization => {
                if session.insights.iter().any(|i| i.content == learning.content) {
                    false
                } else {
                    session.insights.push(Insight {
                        content: learning.content.clone(),
                        importance: clamp_unit(learning.confidence),
                        source: learning.source.clone(),
                        timestamp: learning.timestamp,
                    });
                    true
                }
            }
        };
        if accepted {
            applied += 1;
        }
    }

    tracing::trace!(
        session_id = %session.session_id,
        offered = learnings.len(),
        applied,
        "Applied learnings to consciousness"
    );
    applied
}

fn push_pattern(patterns: &mut Vec<PatternRecord>, learning: &Learning) -> bool {
    if patterns.iter().any(|p| p.description == learning.content) {
        return false;
    }
    patterns.push(PatternRecord {
        description: learning.content.clone(),
        source: learning.source.clone(),
        timestamp: learning.timestamp,
    });
    true
}
