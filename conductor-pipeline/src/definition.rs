//! Pipeline definitions, hooks and the pipeline registry.

use async_trait::async_trait;
use conductor_agents::AgentRegistry;
use conductor_core::{AgentOutput, DefinitionError, HandoffContext, PipelineResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// HOOKS
// ============================================================================

/// Optional callbacks awaited by the orchestrator at fixed points of a run.
/// Every method defaults to a no-op.
#[async_trait]
pub trait PipelineHooks: Send + Sync {
    /// Called after the handoff is validated and enriched, before execution.
    async fn before_agent(&self, _agent_id: &str, _handoff: &HandoffContext) {}

    /// Called with the agent's output, or the synthetic failure standing in for it.
    async fn after_agent(&self, _agent_id: &str, _output: &AgentOutput, _handoff: &HandoffContext) {
    }

    /// Called once with the final result.
    async fn on_complete(&self, _result: &PipelineResult) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl PipelineHooks for NoopHooks {}

// ============================================================================
// PIPELINE DEFINITION
// ============================================================================

/// A named, fixed sequence of agent ids.
#[derive(Clone)]
pub struct PipelineDefinition {
    pub id: String,
    pub name: String,
    pub agent_ids: Vec<String>,
    pub hooks: Arc<dyn PipelineHooks>,
}

impl PipelineDefinition {
    pub fn new<I, S>(id: impl Into<String>, name: impl Into<String>, agent_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            agent_ids: agent_ids.into_iter().map(Into::into).collect(),
            hooks: Arc::new(NoopHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn PipelineHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Position of `agent_id` strictly after `index`, if any.
    pub fn position_after(&self, index: usize, agent_id: &str) -> Option<usize> {
        self.agent_ids
            .iter()
            .enumerate()
            .skip(index + 1)
            .find(|(_, id)| id.as_str() == agent_id)
            .map(|(position, _)| position)
    }

    /// Check the definition against the agents that are registered.
    pub fn validate(&self, agents: &AgentRegistry) -> Result<(), DefinitionError> {
        if self.agent_ids.is_empty() {
            return Err(DefinitionError::EmptyPipeline {
                pipeline_id: self.id.clone(),
            });
        }
        if let Some(unknown) = self.agent_ids.iter().find(|id| !agents.contains(id)) {
            return Err(DefinitionError::UnknownAgentReference {
                pipeline_id: self.id.clone(),
                agent_id: unknown.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for PipelineDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("agent_ids", &self.agent_ids)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PIPELINE REGISTRY
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct PipelineRegistry {
    pipelines: HashMap<String, PipelineDefinition>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a definition. Fails fast on references to agents
    /// missing from `agents`.
    pub fn define(
        &mut self,
        definition: PipelineDefinition,
        agents: &AgentRegistry,
    ) -> Result<(), DefinitionError> {
        definition.validate(agents)?;
        tracing::debug!(
            pipeline_id = %definition.id,
            agents = definition.agent_ids.len(),
            "Pipeline defined"
        );
        self.pipelines.insert(definition.id.clone(), definition);
        Ok(())
    }

    pub fn get(&self, pipeline_id: &str) -> Option<&PipelineDefinition> {
        self.pipelines.get(pipeline_id)
    }

    pub fn contains(&self, pipeline_id: &str) -> bool {
        self.pipelines.contains_key(pipeline_id)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
