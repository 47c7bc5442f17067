//! Agent capability contract.

use async_trait::async_trait;
use conductor_context::ConsciousnessContext;
use conductor_core::{AgentError, AgentOutput, HandoffContext, RetryConfig, SessionMeta};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// AGENT TRAIT
// ============================================================================

/// Everything an agent receives for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInput {
    /// Opaque payload, the previous agent's result or the run input
    pub payload: Value,
    pub handoff_context: HandoffContext,
    pub session_meta: SessionMeta,
}

/// A registered unit of work in a pipeline.
/// Implementations must be thread-safe (Send + Sync).
///
/// # Example
/// ```ignore
/// struct Summarizer { /* ... */ }
///
/// #[async_trait]
/// impl Agent for Summarizer {
///     async fn execute(
///         &self,
///         input: &AgentInput,
///         consciousness: &mut ConsciousnessContext,
///     ) -> Result<AgentOutput, AgentError> {
///         // Call the model, build an AgentOutput
///     }
/// }
/// ```
#[async_trait]
pub trait Agent: Send + Sync {
    /// Run the agent once.
    ///
    /// # Arguments
    /// * `input` - Payload, handoff context and session metadata
    /// * `consciousness` - Run-scoped shared state, owned by the pipeline
    ///
    /// # Returns
    /// * `Ok(AgentOutput)` - The agent's result, which may itself report failure
    /// * `Err(AgentError)` - If the attempt failed; the pipeline may retry
    async fn execute(
        &self,
        input: &AgentInput,
        consciousness: &mut ConsciousnessContext,
    ) -> Result<AgentOutput, AgentError>;

    /// Whether this agent accepts `input`. Not consulted by fixed-sequence
    /// pipelines.
    fn can_handle(&self, _input: &AgentInput) -> bool {
        true
    }
}

// ============================================================================
// AGENT DEFINITION
// ============================================================================

/// A registered agent with its metadata and execution limits.
#[derive(Clone)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    /// Overrides the runtime retry count
    pub max_retries: Option<u32>,
    /// Overrides the runtime per-attempt timeout
    pub timeout: Option<Duration>,
    pub agent: Arc<dyn Agent>,
}

impl AgentDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            capabilities: Vec::new(),
            max_retries: None,
            timeout: None,
            agent,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn effective_max_retries(&self, retry: &RetryConfig) -> u32 {
        self.max_retries.unwrap_or(retry.max_retries)
    }

    pub fn effective_timeout(&self, retry: &RetryConfig) -> Duration {
        self.timeout.unwrap_or(retry.agent_timeout)
    }

    /// Whether both agents declare at least one common capability.
    pub fn shares_capability_with(&self, other: &AgentDefinition) -> bool {
        self.capabilities
            .iter()
            .any(|cap| other.capabilities.iter().any(|o| o.eq_ignore_ascii_case(cap)))
    }
}

impl fmt::Debug for AgentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
