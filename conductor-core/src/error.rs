//! Error types for CONDUCTOR operations

use std::time::Duration;
use thiserror::Error;

/// Pipeline definition errors. Raised when a pipeline is defined, never
/// while it runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("Pipeline {pipeline_id} references unknown agent: {agent_id}")]
    UnknownAgentReference {
        pipeline_id: String,
        agent_id: String,
    },

    #[error("Pipeline {pipeline_id} has no agents")]
    EmptyPipeline { pipeline_id: String },

    #[error("Pipeline not found: {pipeline_id}")]
    PipelineNotFound { pipeline_id: String },
}

/// Agent execution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Agent not registered: {agent_id}")]
    NotFound { agent_id: String },

    #[error("Agent {agent_id} failed: {reason}")]
    ExecutionFailed { agent_id: String, reason: String },

    #[error("Agent {agent_id} timed out after {timeout:?}")]
    Timeout { agent_id: String, timeout: Duration },

    #[error("Agent {agent_id} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        agent_id: String,
        attempts: u32,
        last_error: String,
    },
}

impl AgentError {
    /// Convenience constructor for agent implementations.
    pub fn failed(agent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::ExecutionFailed {
            agent_id: agent_id.into(),
            reason: reason.into(),
        }
    }
}

/// Handoff validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandoffError {
    #[error("Invalid handoff: {}", issues.join("; "))]
    Invalid { issues: Vec<String> },
}

/// Session resource-limit errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LimitError {
    #[error("Execution time {elapsed:?} exceeded limit of {limit:?}")]
    ExecutionTime { elapsed: Duration, limit: Duration },

    #[error("Agent count {count} reached limit of {limit}")]
    AgentCount { count: usize, limit: usize },

    #[error("Cost {spent} exceeded budget of {budget}")]
    CostBudget { spent: f64, budget: f64 },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all CONDUCTOR errors.
#[derive(Debug, Clone, Error)]
pub enum ConductorError {
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Handoff error: {0}")]
    Handoff(#[from] HandoffError),

    #[error("Limit error: {0}")]
    Limit(#[from] LimitError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for CONDUCTOR operations.
pub type ConductorResult<T> = Result<T, ConductorError>;

// =============================================================================
// TESTS
// =============================================================================
