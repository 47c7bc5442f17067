//! Per-agent trust and performance models.

use conductor_core::{clamp_unit, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Trust assigned to an agent the run has not seen before.
pub const INITIAL_TRUST: f64 = 0.5;

/// Trust gained per successful execution.
pub const TRUST_REWARD: f64 = 0.05;

/// Trust lost per failed execution.
pub const TRUST_PENALTY: f64 = 0.1;

/// What the run believes about one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentModel {
    pub agent_id: String,
    /// Trust in [0.0, 1.0]
    pub trust: f64,
    pub executions: u32,
    pub successes: u32,
    pub last_confidence: Option<f64>,
    pub capabilities: Vec<String>,
    pub updated_at: Timestamp,
}

impl AgentModel {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            trust: INITIAL_TRUST,
            executions: 0,
            successes: 0,
            last_confidence: None,
            capabilities: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn success_rate(&self) -> Option<f64> {
        (self.executions > 0).then(|| self.successes as f64 / self.executions as f64)
    }

    /// Merge a partial update into this model.
    pub fn apply(&mut self, update: AgentModelUpdate) {
        if let Some(trust) = update.trust {
            self.trust = clamp_unit(trust);
        }
        if let Some(capabilities) = update.capabilities {
            self.capabilities = capabilities;
        }
        if let Some(confidence) = update.confidence {
            self.last_confidence = Some(clamp_unit(confidence));
        }
        if let Some(success) = update.outcome {
            self.executions += 1;
            if success {
                self.successes += 1;
                self.trust = clamp_unit(self.trust + TRUST_REWARD);
            } else {
                self.trust = clamp_unit(self.trust - TRUST_PENALTY);
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update for an [`AgentModel`]; `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentModelUpdate {
    pub outcome: Option<bool>,
    pub confidence: Option<f64>,
    pub capabilities: Option<Vec<String>>,
    /// Overrides trust before any outcome nudge is applied
    pub trust: Option<f64>,
}

impl AgentModelUpdate {
    /// Update describing one finished execution.
    pub fn outcome(success: bool, confidence: f64) -> Self {
        Self {
            outcome: Some(success),
            confidence: Some(confidence),
            ..Self::default()
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = Some(capabilities);
        self
    }
}
