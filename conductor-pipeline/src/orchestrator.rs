//! Agent pipeline orchestrator.
//!
//! Runs a defined agent sequence as a small state machine:
//!
//! ```text
//! Advancing(i) ──step──→ Advancing(i+1 | i+2 | jump | i for a branch)
//!      │
//!      ├── health check / limits / invalid handoff / halt signal ──→ Halted(reason)
//!      └── i past the end ──→ Completed
//! ```
//!
//! Every run-time fault surfaces inside the returned [`PipelineResult`]; only
//! asking for an unknown pipeline is an `Err`.

use crate::{execute_agent, PipelineDefinition, PipelineHooks, PipelineRegistry};
use conductor_agents::{
    AgentDefinition, AgentInput, AgentRegistry, DefaultScoringPolicy, ScoringPolicy,
    SessionLearner,
};
use conductor_context::{
    apply_learnings, create_consciousness_context, enrich_handoff_with_consciousness,
    AgentModelUpdate, ConsciousnessContext,
};
use conductor_core::{
    attribute_learnings, create_handoff, create_initial_handoff, merge_learnings, resolve_signals,
    should_continue_pipeline, validate_handoff, AgentOutput, AgentResult, ConductorResult,
    DefinitionError, DurationMs, FlowDirective, HandoffContext, HandoffOptions, HandoffPriority,
    Learning, LimitError, PipelineMetrics, PipelineResult, RuntimeConfig, SessionMeta, Signal,
    Timestamp,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;

/// Initiator recorded when the caller does not name one.
pub const DEFAULT_INITIATOR: &str = "api";

/// Per-run options supplied by the caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecuteOptions {
    pub initiator: Option<String>,
    pub tags: Vec<String>,
    /// Overrides the configured session cost budget
    pub cost_budget: Option<f64>,
    pub priority: HandoffPriority,
    pub deadline: Option<Timestamp>,
}

impl ExecuteOptions {
    pub fn with_initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = Some(initiator.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_cost_budget(mut self, budget: f64) -> Self {
        self.cost_budget = Some(budget);
        self
    }

    pub fn with_deadline(mut self, deadline: Timestamp) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Orchestrator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// About to run the agent at this index (or a pending branch target)
    Advancing(usize),
    Halted(String),
    Completed,
}

/// Owns the agent and pipeline registries and runs pipelines.
pub struct AgentPipeline {
    agents: AgentRegistry,
    pipelines: PipelineRegistry,
    config: RuntimeConfig,
    scoring_policy: Arc<dyn ScoringPolicy>,
}

impl AgentPipeline {
    /// Pipeline over `config` as given. Callers loading configuration from
    /// outside the process should use [`AgentPipeline::try_new`].
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            agents: AgentRegistry::new(),
            pipelines: PipelineRegistry::new(),
            config,
            scoring_policy: Arc::new(DefaultScoringPolicy::default()),
        }
    }

    /// Pipeline over `config` after [`RuntimeConfig::validate`] accepts it.
    pub fn try_new(config: RuntimeConfig) -> ConductorResult<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn with_scoring_policy(mut self, policy: Arc<dyn ScoringPolicy>) -> Self {
        self.scoring_policy = policy;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn register_agent(&mut self, definition: AgentDefinition) {
        self.agents.register(definition);
    }

    pub fn register_agents(&mut self, definitions: impl IntoIterator<Item = AgentDefinition>) {
        self.agents.register_all(definitions);
    }

    /// Define a pipeline over already-registered agents.
    pub fn define_pipeline<I, S>(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        agent_ids: I,
        hooks: Option<Arc<dyn PipelineHooks>>,
    ) -> ConductorResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut definition = PipelineDefinition::new(id, name, agent_ids);
        if let Some(hooks) = hooks {
            definition = definition.with_hooks(hooks);
        }
        self.pipelines.define(definition, &self.agents)?;
        Ok(())
    }

    /// Run a defined pipeline to completion or halt.
    pub async fn execute_pipeline(
        &self,
        pipeline_id: &str,
        input: Value,
        options: ExecuteOptions,
    ) -> ConductorResult<PipelineResult> {
        let definition = self
            .pipelines
            .get(pipeline_id)
            .ok_or_else(|| DefinitionError::PipelineNotFound {
                pipeline_id: pipeline_id.to_string(),
            })?;

        let mut session_config = self.config.session.clone();
        if let Some(budget) = options.cost_budget {
            session_config.cost_budget = Some(budget);
        }
        let meta = SessionMeta::new(
            input,
            options
                .initiator
                .clone()
                .unwrap_or_else(|| DEFAULT_INITIATOR.to_string()),
            session_config,
        )
        .with_tags(options.tags.clone());

        let span = tracing::info_span!(
            "pipeline_run",
            pipeline_id = %definition.id,
            session_id = %meta.session_id,
        );
        let result = PipelineRun::new(self, definition, meta, &options)
            .run()
            .instrument(span)
            .await;

        definition.hooks.on_complete(&result).await;
        Ok(result)
    }
}

impl Default for AgentPipeline {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl std::fmt::Debug for AgentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPipeline")
            .field("agents", &self.agents)
            .field("pipelines", &self.pipelines.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// RUN
// ============================================================================

/// Mutable state of one run. Dropped when the run returns.
struct PipelineRun<'a> {
    pipeline: &'a AgentPipeline,
    definition: &'a PipelineDefinition,
    meta: SessionMeta,
    consciousness: ConsciousnessContext,
    learner: Option<SessionLearner>,
    handoff: HandoffContext,
    pending_branch: Option<String>,
    results: Vec<AgentResult>,
    learnings: Vec<Learning>,
    final_output: Value,
    healthy: bool,
    skipped: usize,
    total_cost: f64,
    started: Instant,
}

impl<'a> PipelineRun<'a> {
    fn new(
        pipeline: &'a AgentPipeline,
        definition: &'a PipelineDefinition,
        meta: SessionMeta,
        options: &ExecuteOptions,
    ) -> Self {
        let consciousness =
            create_consciousness_context(meta.session_id, meta.original_input.clone(), &definition.name);
        let learner = meta.config.enable_learning.then(|| {
            SessionLearner::for_registry(&pipeline.agents)
                .with_policy(Arc::clone(&pipeline.scoring_policy))
                .with_scheduled(definition.agent_ids.iter().cloned())
        });
        let first = definition.agent_ids.first().cloned().unwrap_or_default();
        let handoff = create_initial_handoff(
            first,
            meta.original_input.clone(),
            HandoffOptions {
                priority: options.priority,
                deadline: options.deadline,
            },
        );

        Self {
            pipeline,
            definition,
            meta,
            consciousness,
            learner,
            handoff,
            pending_branch: None,
            results: Vec::new(),
            learnings: Vec::new(),
            final_output: Value::Null,
            healthy: true,
            skipped: 0,
            total_cost: 0.0,
            started: Instant::now(),
        }
    }

    async fn run(mut self) -> PipelineResult {
        tracing::info!(
            agents = self.definition.agent_ids.len(),
            initiator = %self.meta.initiator,
            "Pipeline started"
        );
        if self.meta.config.enable_parallel {
            tracing::debug!("Parallel execution is not supported, running sequentially");
        }

        let mut state = RunState::Advancing(0);
        while let RunState::Advancing(index) = state {
            state = self.step(index).await;
        }

        self.finish(state)
    }

    fn halt(&mut self, reason: String, unhealthy: bool) -> RunState {
        if unhealthy {
            self.healthy = false;
        }
        tracing::warn!(reason = %reason, healthy = self.healthy, "Pipeline halted");
        RunState::Halted(reason)
    }

    async fn step(&mut self, index: usize) -> RunState {
        let pipeline = self.pipeline;
        let definition = self.definition;

        let branch = self.pending_branch.take();
        if branch.is_none() && index >= definition.agent_ids.len() {
            return RunState::Completed;
        }

        let decision =
            should_continue_pipeline(&self.handoff, self.meta.config.min_confidence_threshold);
        if !decision.should_continue {
            return self.halt(decision.reason, true);
        }

        if let Some(limit) = self.check_limits() {
            return self.halt(limit.to_string(), true);
        }

        let agent_id = match branch {
            Some(target) => target,
            None => {
                let nominal = &definition.agent_ids[index];
                if let Some(learner) = &self.learner {
                    if learner.should_skip_agent(nominal) {
                        tracing::info!(agent_id = %nominal, index, "Session learner skipped agent");
                        self.skipped += 1;
                        return RunState::Advancing(index + 1);
                    }
                }
                match self
                    .learner
                    .as_ref()
                    .and_then(|learner| learner.get_routing_override(nominal))
                {
                    Some(peer) => {
                        tracing::info!(agent_id = %nominal, override_id = %peer, "Routing override");
                        peer
                    }
                    None => nominal.clone(),
                }
            }
        };

        let Some(agent) = pipeline.agents.get(&agent_id) else {
            tracing::warn!(agent_id = %agent_id, index, "Agent not registered, skipping");
            self.skipped += 1;
            return RunState::Advancing(index + 1);
        };

        let handoff = self.handoff.retarget(&agent_id);
        if let Err(error) = validate_handoff(&handoff).into_result() {
            return self.halt(error.to_string(), true);
        }
        let handoff = enrich_handoff_with_consciousness(&handoff, &self.consciousness);

        let hooks = &definition.hooks;
        hooks.before_agent(&agent_id, &handoff).await;

        let started_at = Utc::now();
        let step_start = Instant::now();
        let input = AgentInput {
            payload: handoff.payload.clone(),
            handoff_context: handoff.clone(),
            session_meta: self.meta.clone(),
        };
        let output = match execute_agent(
            agent,
            &input,
            &mut self.consciousness,
            &pipeline.config.retry,
        )
        .await
        {
            Ok(output) => output,
            Err(error) => {
                tracing::error!(agent_id = %agent_id, error = %error, "Agent failed after retries");
                AgentOutput::from_error(&agent_id, &error.to_string())
            }
        };
        let step_ms = step_start.elapsed().as_millis() as DurationMs;

        if let Some(learner) = self.learner.as_mut() {
            learner.record_execution(&agent_id, &output, &mut self.consciousness);
        }
        hooks.after_agent(&agent_id, &output, &handoff).await;

        self.fold_output(&agent_id, agent, &output, started_at);

        tracing::info!(
            agent_id = %agent_id,
            index,
            success = output.success,
            confidence = output.confidence,
            elapsed_ms = step_ms,
            "Agent step completed"
        );

        let directive = resolve_signals(&output.signals);
        if directive == FlowDirective::Halt {
            return self.halt(format!("Agent {agent_id} signalled halt"), false);
        }

        let mut next_index = match directive {
            FlowDirective::SkipNext => index + 2,
            _ => index + 1,
        };

        if let Some(target) = output.next_agent.as_deref() {
            if let Some(position) = definition.position_after(index, target) {
                tracing::debug!(agent_id = %agent_id, target, position, "Jumping ahead");
                next_index = position;
            } else if pipeline.agents.contains(target) {
                tracing::debug!(agent_id = %agent_id, target, "Branching");
                self.pending_branch = Some(target.to_string());
                next_index = index;
            } else {
                tracing::warn!(agent_id = %agent_id, target, "Ignoring unknown next agent");
            }
        }

        let to_agent = self
            .pending_branch
            .clone()
            .or_else(|| definition.agent_ids.get(next_index).cloned())
            .unwrap_or_default();
        let mut next = create_handoff(&agent_id, &to_agent, &handoff, &output, step_ms);
        if output.has_signal(Signal::Escalate) {
            next.priority = next.priority.escalated();
            tracing::info!(agent_id = %agent_id, priority = %next.priority, "Handoff escalated");
        }
        self.handoff = next;

        RunState::Advancing(next_index)
    }

    /// Record the output in the run's results, learnings and consciousness.
    fn fold_output(
        &mut self,
        agent_id: &str,
        agent: &AgentDefinition,
        output: &AgentOutput,
        started_at: Timestamp,
    ) {
        self.results.push(AgentResult {
            agent_id: agent_id.to_string(),
            output: output.clone(),
            started_at,
            completed_at: Utc::now(),
        });

        let attributed = attribute_learnings(&output.learnings, agent_id);
        self.learnings = merge_learnings(&self.learnings, &attributed);
        apply_learnings(&mut self.consciousness, &attributed);
        self.consciousness.update_agent_model(
            agent_id,
            AgentModelUpdate::outcome(output.success, output.confidence)
                .with_capabilities(agent.capabilities.clone()),
        );

        self.final_output = output.result.clone();
        self.total_cost += output.metrics.cost;
    }

    fn check_limits(&self) -> Option<LimitError> {
        let config = &self.meta.config;

        let elapsed = self.started.elapsed();
        if elapsed > config.max_execution_time {
            return Some(LimitError::ExecutionTime {
                elapsed,
                limit: config.max_execution_time,
            });
        }
        if self.results.len() >= config.max_agents {
            return Some(LimitError::AgentCount {
                count: self.results.len(),
                limit: config.max_agents,
            });
        }
        match config.cost_budget {
            Some(budget) if self.total_cost > budget => Some(LimitError::CostBudget {
                spent: self.total_cost,
                budget,
            }),
            _ => None,
        }
    }

    fn finish(self, state: RunState) -> PipelineResult {
        let session_learnings = self
            .learner
            .map(SessionLearner::generate_session_learnings)
            .unwrap_or_default();
        let learnings = merge_learnings(&self.learnings, &session_learnings);

        let success = self.healthy && self.results.iter().any(|r| r.output.success);
        let metrics = PipelineMetrics::from_results(&self.results, self.skipped, learnings.len());
        let halt_reason = match state {
            RunState::Halted(reason) => Some(reason),
            RunState::Advancing(_) | RunState::Completed => None,
        };

        tracing::info!(
            success,
            agents = metrics.total_agents,
            successful = metrics.successful_agents,
            skipped = metrics.skipped_agents,
            learnings = learnings.len(),
            halt_reason = ?halt_reason,
            "Pipeline finished"
        );

        PipelineResult {
            pipeline_id: self.definition.id.clone(),
            session_id: self.meta.session_id,
            success,
            agent_results: self.results,
            total_execution_time_ms: self.started.elapsed().as_millis() as DurationMs,
            learnings,
            final_output: self.final_output,
            metrics,
            halt_reason,
        }
    }
}
