//! CONDUCTOR Test Utilities
//!
//! Shared test infrastructure for the CONDUCTOR workspace:
//! - Mock agents with call recording
//! - Proptest generators for learnings, signals and outputs
//! - Fixtures for configs, definitions and handoffs
//! - Assertions for pipeline invariants

pub use conductor_agents::{Agent, AgentDefinition, AgentInput, AgentRegistry};
pub use conductor_context::ConsciousnessContext;
pub use conductor_core::{
    AgentError, AgentOutput, ConductorError, ConductorResult, DefinitionError, HandoffContext,
    Learning, LearningType, PipelineResult, RetryConfig, RuntimeConfig, Signal, Timestamp,
    TrailEntry,
};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

// ============================================================================
// MOCK AGENTS
// ============================================================================

/// Agent that replays a script of results, repeating the last one once the
/// script runs out.
#[derive(Debug)]
pub struct ScriptedAgent {
    script: Vec<Result<AgentOutput, AgentError>>,
    calls: AtomicU32,
    payloads: Mutex<Vec<Value>>,
}

impl ScriptedAgent {
    pub fn new(script: Vec<Result<AgentOutput, AgentError>>) -> Self {
        Self {
            script,
            calls: AtomicU32::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    /// Agent that always returns `output`.
    pub fn always(output: AgentOutput) -> Self {
        Self::new(vec![Ok(output)])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Payloads received, in call order.
    pub fn payloads(&self) -> Vec<Value> {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn execute(
        &self,
        input: &AgentInput,
        _consciousness: &mut ConsciousnessContext,
    ) -> Result<AgentOutput, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(input.payload.clone());

        match self.script.get(call).or_else(|| self.script.last()) {
            Some(result) => result.clone(),
            None => Ok(AgentOutput::success(Value::Null, 1.0)),
        }
    }
}

/// Agent whose every attempt fails.
#[derive(Debug)]
pub struct FailingAgent {
    id: String,
    reason: String,
    attempts: AtomicU32,
}

impl FailingAgent {
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for FailingAgent {
    async fn execute(
        &self,
        _input: &AgentInput,
        _consciousness: &mut ConsciousnessContext,
    ) -> Result<AgentOutput, AgentError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AgentError::failed(&self.id, &self.reason))
    }
}

/// Agent that sleeps before answering. Pair with paused tokio time.
#[derive(Debug)]
pub struct SlowAgent {
    delay: Duration,
    output: AgentOutput,
    attempts: AtomicU32,
}

impl SlowAgent {
    pub fn new(delay: Duration, output: AgentOutput) -> Self {
        Self {
            delay,
            output,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for SlowAgent {
    async fn execute(
        &self,
        _input: &AgentInput,
        _consciousness: &mut ConsciousnessContext,
    ) -> Result<AgentOutput, AgentError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.output.clone())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for CONDUCTOR data types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_learning_type() -> impl Strategy<Value = LearningType> {
        prop_oneof![
            Just(LearningType::SuccessPattern),
            Just(LearningType::FailurePattern),
            Just(LearningType::Insight),
            Just(LearningType::Strategy),
            Just(LearningType::Correction),
            Just(LearningType::Optimization),
        ]
    }

    /// Generate a Timestamp (DateTime<Utc>).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-2030
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    /// Learnings drawn from a small content and source alphabet so that
    /// duplicates are common.
    pub fn arb_learning() -> impl Strategy<Value = Learning> {
        (
            arb_learning_type(),
            "[a-d]{1,2}",
            "agent-[0-3]",
            0.0f64..=1.0,
            arb_timestamp(),
            any::<bool>(),
        )
            .prop_map(|(kind, content, source, confidence, timestamp, actionable)| {
                Learning::new(kind, content, source, confidence)
                    .with_timestamp(timestamp)
                    .with_actionable(actionable)
            })
    }

    pub fn arb_learnings(max: usize) -> impl Strategy<Value = Vec<Learning>> {
        prop::collection::vec(arb_learning(), 0..=max)
    }

    pub fn arb_signal() -> impl Strategy<Value = Signal> {
        prop_oneof![
            Just(Signal::Continue),
            Just(Signal::SkipNext),
            Just(Signal::Halt),
            Just(Signal::Retry),
            Just(Signal::Escalate),
            Just(Signal::Branch),
        ]
    }

    pub fn arb_signals() -> impl Strategy<Value = Vec<Signal>> {
        prop::collection::vec(arb_signal(), 0..5)
    }

    pub fn arb_agent_output() -> impl Strategy<Value = AgentOutput> {
        (any::<bool>(), 0.0f64..=1.0, arb_learnings(4), arb_signals(), "[a-z ]{0,150}").prop_map(
            |(success, confidence, learnings, signals, text)| {
                let output = if success {
                    AgentOutput::success(Value::String(text), confidence)
                } else {
                    AgentOutput::failure(Value::String(text), confidence)
                };
                output.with_learnings(learnings).with_signals(signals)
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common pipeline scenarios.

    use super::*;
    use chrono::Utc;
    use conductor_core::{create_initial_handoff, HandoffOptions};

    /// Runtime config with short backoff, for paused-time tests.
    pub fn fast_runtime_config() -> RuntimeConfig {
        RuntimeConfig {
            retry: RetryConfig {
                max_retries: 2,
                agent_timeout: Duration::from_secs(5),
                backoff_base: Duration::from_millis(10),
            },
            ..RuntimeConfig::default()
        }
    }

    pub fn agent_definition(id: &str, agent: Arc<dyn Agent>) -> AgentDefinition {
        AgentDefinition::new(id, id, agent)
    }

    /// Registry of agents that always succeed with the given confidence.
    pub fn succeeding_agents(ids: &[&str], confidence: f64) -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry.register_all(ids.iter().map(|id| {
            agent_definition(
                id,
                Arc::new(ScriptedAgent::always(AgentOutput::success(
                    Value::String(id.to_string()),
                    confidence,
                ))),
            )
        }));
        registry
    }

    pub fn trail_entry(agent_id: &str, success: bool, confidence: f64) -> TrailEntry {
        let now = Utc::now();
        TrailEntry {
            agent_id: agent_id.to_string(),
            start_time: now,
            end_time: now,
            success,
            confidence,
            output_summary: String::new(),
            execution_time_ms: 0,
        }
    }

    pub fn handoff_with_trail(to_agent: &str, trail: Vec<TrailEntry>) -> HandoffContext {
        let mut handoff = create_initial_handoff(to_agent, Value::Null, HandoffOptions::default());
        handoff.agent_trail = trail;
        handoff
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for pipeline invariants.

    use super::*;
    use conductor_core::MAX_MERGED_LEARNINGS;
    use std::collections::HashSet;

    /// Assert the merged-learning invariants: bounded, no repeated content and
    /// no repeated (type, source).
    #[track_caller]
    pub fn assert_learnings_well_formed(learnings: &[Learning]) {
        assert!(
            learnings.len() <= MAX_MERGED_LEARNINGS,
            "Expected at most {MAX_MERGED_LEARNINGS} learnings, got {}",
            learnings.len()
        );
        let mut contents = HashSet::new();
        let mut origins = HashSet::new();
        for learning in learnings {
            assert!(
                contents.insert(learning.content.as_str()),
                "Duplicate learning content: {}",
                learning.content
            );
            assert!(
                origins.insert((learning.learning_type, learning.source.as_str())),
                "Duplicate learning origin: {} from {}",
                learning.learning_type,
                learning.source
            );
        }
    }

    /// Assert the agents that produced results, in order.
    #[track_caller]
    pub fn assert_ran(result: &PipelineResult, expected: &[&str]) {
        let ran: Vec<&str> = result
            .agent_results
            .iter()
            .map(|r| r.agent_id.as_str())
            .collect();
        assert_eq!(ran, expected, "Unexpected agent sequence");
    }

    /// Assert that a result is an unknown-agent definition error.
    #[track_caller]
    pub fn assert_unknown_agent<T: std::fmt::Debug>(result: &ConductorResult<T>, agent_id: &str) {
        match result {
            Err(ConductorError::Definition(DefinitionError::UnknownAgentReference {
                agent_id: found,
                ..
            })) => assert_eq!(found, agent_id, "Wrong agent in UnknownAgentReference"),
            other => panic!("Expected UnknownAgentReference for {agent_id}, got: {other:?}"),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_context::create_consciousness_context;
    use conductor_core::{create_initial_handoff, new_entity_id, HandoffOptions, SessionConfig, SessionMeta};

    fn input(payload: Value) -> AgentInput {
        AgentInput {
            payload: payload.clone(),
            handoff_context: create_initial_handoff("a", payload, HandoffOptions::default()),
            session_meta: SessionMeta::new(Value::Null, "test", SessionConfig::default()),
        }
    }

    #[tokio::test]
    async fn test_scripted_agent_repeats_last_entry() {
        let agent = ScriptedAgent::new(vec![
            Err(AgentError::failed("s", "first")),
            Ok(AgentOutput::success(Value::from(2), 0.9)),
        ]);
        let mut ctx = create_consciousness_context(new_entity_id(), Value::Null, "");

        assert!(agent.execute(&input(Value::from(1)), &mut ctx).await.is_err());
        assert!(agent.execute(&input(Value::from(2)), &mut ctx).await.is_ok());
        assert!(agent.execute(&input(Value::from(3)), &mut ctx).await.is_ok());
        assert_eq!(agent.calls(), 3);
        assert_eq!(agent.payloads(), vec![Value::from(1), Value::from(2), Value::from(3)]);
    }

    #[tokio::test]
    async fn test_failing_agent_counts_attempts() {
        let agent = FailingAgent::new("f", "boom");
        let mut ctx = create_consciousness_context(new_entity_id(), Value::Null, "");
        let err = agent.execute(&input(Value::Null), &mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(agent.attempts(), 1);
    }

    #[test]
    fn test_assert_learnings_well_formed_accepts_merge_output() {
        let merged = conductor_core::merge_learnings(
            &[Learning::new(LearningType::Insight, "x", "a", 0.5)],
            &[
                Learning::new(LearningType::Insight, "x", "b", 0.9),
                Learning::new(LearningType::Insight, "y", "a", 0.9),
                Learning::new(LearningType::Strategy, "z", "a", 0.9),
            ],
        );
        assertions::assert_learnings_well_formed(&merged);
        assert_eq!(merged.len(), 2);
    }
}
