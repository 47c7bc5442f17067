//! End-to-end pipeline runs against mock agents.
//!
//! Retry and timeout scenarios run on paused tokio time, so backoff and
//! timeouts complete instantly while still being measured.

use async_trait::async_trait;
use conductor_agents::{AgentPerformance, ScoringPolicy};
use conductor_core::{create_handoff, create_initial_handoff, HandoffContext, HandoffOptions};
use conductor_pipeline::{AgentPipeline, ExecuteOptions, PipelineHooks};
use conductor_test_utils::assertions::{assert_learnings_well_formed, assert_ran, assert_unknown_agent};
use conductor_test_utils::fixtures::{agent_definition, fast_runtime_config};
use conductor_test_utils::*;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// HELPERS
// ============================================================================

fn scripted(output: AgentOutput) -> Arc<ScriptedAgent> {
    Arc::new(ScriptedAgent::always(output))
}

async fn run(pipeline: &AgentPipeline, id: &str) -> PipelineResult {
    pipeline
        .execute_pipeline(id, json!({"task": "review"}), ExecuteOptions::default())
        .await
        .expect("pipeline is defined")
}

#[derive(Debug, Clone, PartialEq)]
enum HookEvent {
    Before(String),
    After(String, bool),
    Complete(bool, usize),
}

#[derive(Default)]
struct RecordingHooks(Mutex<Vec<HookEvent>>);

impl RecordingHooks {
    fn events(&self) -> Vec<HookEvent> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl PipelineHooks for RecordingHooks {
    async fn before_agent(&self, agent_id: &str, _handoff: &HandoffContext) {
        self.0.lock().unwrap().push(HookEvent::Before(agent_id.to_string()));
    }

    async fn after_agent(&self, agent_id: &str, output: &AgentOutput, _handoff: &HandoffContext) {
        self.0
            .lock()
            .unwrap()
            .push(HookEvent::After(agent_id.to_string(), output.success));
    }

    async fn on_complete(&self, result: &PipelineResult) {
        self.0
            .lock()
            .unwrap()
            .push(HookEvent::Complete(result.success, result.agent_results.len()));
    }
}

/// Trail each agent was handed, in execution order.
#[derive(Default)]
struct TrailRecorder(Mutex<Vec<(String, Vec<String>)>>);

impl TrailRecorder {
    fn trails(&self) -> Vec<(String, Vec<String>)> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl PipelineHooks for TrailRecorder {
    async fn before_agent(&self, agent_id: &str, handoff: &HandoffContext) {
        let trail = handoff.agent_trail.iter().map(|e| e.agent_id.clone()).collect();
        self.0.lock().unwrap().push((agent_id.to_string(), trail));
    }
}

fn summarizer(id: &str, agent: Arc<ScriptedAgent>) -> AgentDefinition {
    agent_definition(id, agent).with_capabilities(["summarize"])
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn two_successful_agents_complete() {
    let mut pipeline = AgentPipeline::new(fast_runtime_config());
    pipeline.register_agents([
        agent_definition("draft", scripted(AgentOutput::success(json!("draft"), 0.9))),
        agent_definition("polish", scripted(AgentOutput::success(json!("polished"), 0.95))),
    ]);
    pipeline
        .define_pipeline("write", "Write", ["draft", "polish"], None)
        .unwrap();

    let result = run(&pipeline, "write").await;

    assert!(result.success);
    assert_ran(&result, &["draft", "polish"]);
    assert_eq!(result.metrics.successful_agents, 2);
    assert_eq!(result.metrics.failed_agents, 0);
    assert_eq!(result.final_output, json!("polished"));
    assert!(result.halt_reason.is_none());
    assert_learnings_well_formed(&result.learnings);
}

#[tokio::test(start_paused = true)]
async fn failing_agent_is_retried_then_pipeline_moves_on() {
    let failing = Arc::new(FailingAgent::new("flaky", "upstream unavailable"));
    let next = scripted(AgentOutput::success(json!("recovered"), 0.9));

    let mut pipeline = AgentPipeline::new(fast_runtime_config());
    pipeline.register_agents([
        agent_definition("flaky", failing.clone()).with_max_retries(2),
        agent_definition("next", next.clone()),
    ]);
    pipeline
        .define_pipeline("p", "P", ["flaky", "next"], None)
        .unwrap();

    let result = run(&pipeline, "p").await;

    assert_eq!(failing.attempts(), 3);
    assert_eq!(next.calls(), 1);
    assert_ran(&result, &["flaky", "next"]);
    assert!(!result.agent_results[0].output.success);

    let failures: Vec<_> = result
        .learnings
        .iter()
        .filter(|l| l.learning_type == LearningType::FailurePattern && l.source == "flaky")
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].content.contains("upstream unavailable"));
    assert!(result.success);
}

#[tokio::test]
async fn halt_signal_stops_after_the_emitting_agent() {
    let tail = scripted(AgentOutput::success(json!("never"), 0.9));
    let mut pipeline = AgentPipeline::new(fast_runtime_config());
    pipeline.register_agents([
        agent_definition(
            "gate",
            scripted(AgentOutput::success(json!("stop here"), 0.9).with_signals(vec![Signal::Halt])),
        ),
        agent_definition("tail", tail.clone()),
    ]);
    pipeline.define_pipeline("p", "P", ["gate", "tail"], None).unwrap();

    let result = run(&pipeline, "p").await;

    assert_ran(&result, &["gate"]);
    assert_eq!(tail.calls(), 0);
    assert!(result.success);
    assert!(result.halt_reason.unwrap_or_default().contains("halt"));
}

#[tokio::test]
async fn three_consecutive_failures_halt_at_the_next_health_check() {
    let fourth = scripted(AgentOutput::success(json!(4), 0.9));
    let mut pipeline = AgentPipeline::new(fast_runtime_config());
    pipeline.register_agents([
        agent_definition("a", scripted(AgentOutput::failure(json!(1), 0.9))),
        agent_definition("b", scripted(AgentOutput::failure(json!(2), 0.9))),
        agent_definition("c", scripted(AgentOutput::failure(json!(3), 0.9))),
        agent_definition("d", fourth.clone()),
    ]);
    pipeline
        .define_pipeline("p", "P", ["a", "b", "c", "d"], None)
        .unwrap();

    let result = run(&pipeline, "p").await;

    assert_ran(&result, &["a", "b", "c"]);
    assert_eq!(fourth.calls(), 0);
    assert!(!result.success);
    assert_eq!(
        result.halt_reason.as_deref(),
        Some("Too many consecutive failures")
    );
}

#[test]
fn successive_handoffs_keep_learnings_that_differ_only_in_content() {
    let start = create_initial_handoff("a", json!(null), HandoffOptions::default());
    let first = create_handoff(
        "a",
        "b",
        &start,
        &AgentOutput::success(json!(1), 0.9)
            .with_learning(Learning::new(LearningType::Insight, "cache hit rate is low", "", 0.6)),
        10,
    );
    let second = create_handoff(
        "b",
        "c",
        &first,
        &AgentOutput::success(json!(2), 0.9)
            .with_learning(Learning::new(LearningType::Insight, "cache hit rate is high", "", 0.8)),
        10,
    );

    let contents: Vec<&str> = second.learnings.iter().map(|l| l.content.as_str()).collect();
    assert_eq!(contents, vec!["cache hit rate is high", "cache hit rate is low"]);
    assert_learnings_well_formed(&second.learnings);
}

// ============================================================================
// RETRIES AND TIMEOUTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn timed_out_attempts_are_retried_with_backoff() {
    let slow = Arc::new(SlowAgent::new(
        Duration::from_secs(60),
        AgentOutput::success(json!("late"), 0.9),
    ));
    let mut pipeline = AgentPipeline::new(fast_runtime_config());
    pipeline.register_agents([
        agent_definition("slow", slow.clone())
            .with_timeout(Duration::from_millis(100))
            .with_max_retries(1),
        agent_definition("fast", scripted(AgentOutput::success(json!("fast"), 0.9))),
    ]);
    pipeline.define_pipeline("p", "P", ["slow", "fast"], None).unwrap();

    let started = tokio::time::Instant::now();
    let result = run(&pipeline, "p").await;

    assert_eq!(slow.attempts(), 2);
    assert_ran(&result, &["slow", "fast"]);
    assert!(!result.agent_results[0].output.success);
    // Two 100ms timeouts plus one 10ms backoff
    assert!(started.elapsed() >= Duration::from_millis(210));
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn retry_count_is_reported_in_metrics() {
    let flaky = Arc::new(ScriptedAgent::new(vec![
        Err(AgentError::failed("flaky", "transient")),
        Ok(AgentOutput::success(json!("ok"), 0.9)),
    ]));
    let mut pipeline = AgentPipeline::new(fast_runtime_config());
    pipeline.register_agent(agent_definition("flaky", flaky.clone()));
    pipeline.define_pipeline("p", "P", ["flaky"], None).unwrap();

    let result = run(&pipeline, "p").await;

    assert_eq!(flaky.calls(), 2);
    assert!(result.success);
    assert_eq!(result.agent_results[0].output.metrics.retry_count, 1);
    assert_eq!(result.metrics.total_retries, 1);
}

// ============================================================================
// DEFINITION AND ROUTING
// ============================================================================

#[test]
fn unknown_agent_reference_fails_at_definition_time() {
    let mut pipeline = AgentPipeline::new(fast_runtime_config());
    pipeline.register_agent(agent_definition("a", scripted(AgentOutput::success(json!(1), 0.9))));

    let result = pipeline.define_pipeline("p", "P", ["a", "ghost"], None);
    assert_unknown_agent(&result, "ghost");
}

#[tokio::test]
async fn payload_flows_from_input_through_outputs() {
    let first = scripted(AgentOutput::success(json!({"stage": 1}), 0.9));
    let second = scripted(AgentOutput::success(json!({"stage": 2}), 0.9));
    let mut pipeline = AgentPipeline::new(fast_runtime_config());
    pipeline.register_agents([
        agent_definition("first", first.clone()),
        agent_definition("second", second.clone()),
    ]);
    pipeline.define_pipeline("p", "P", ["first", "second"], None).unwrap();

    run(&pipeline, "p").await;

    assert_eq!(first.payloads(), vec![json!({"task": "review"})]);
    assert_eq!(second.payloads(), vec![json!({"stage": 1})]);
}

/// Skips any agent that has failed at least once this run.
struct SkipAfterFailure;

impl ScoringPolicy for SkipAfterFailure {
    fn window_size(&self) -> usize {
        5
    }

    fn should_skip(&self, performance: &AgentPerformance) -> bool {
        performance.window_len() > 0 && performance.window_success_rate() < 1.0
    }

    fn score(&self, _performance: &AgentPerformance) -> Option<f64> {
        None
    }

    fn override_margin(&self) -> f64 {
        1.0
    }
}

#[tokio::test]
async fn learner_skip_leaves_no_trail_entry() {
    let retry = Arc::new(ScriptedAgent::new(vec![
        Ok(AgentOutput::failure(json!("bad"), 0.9)),
        Ok(AgentOutput::success(json!("good"), 0.9)),
    ]));
    let hooks = Arc::new(RecordingHooks::default());

    let mut pipeline = AgentPipeline::new(fast_runtime_config())
        .with_scoring_policy(Arc::new(SkipAfterFailure));
    pipeline.register_agents([
        agent_definition("retry", retry.clone()),
        agent_definition("check", scripted(AgentOutput::success(json!("checked"), 0.9))),
    ]);
    pipeline
        .define_pipeline(
            "p",
            "P",
            ["retry", "check", "retry"],
            Some(hooks.clone() as Arc<dyn PipelineHooks>),
        )
        .unwrap();

    let result = run(&pipeline, "p").await;

    assert_eq!(retry.calls(), 1);
    assert_ran(&result, &["retry", "check"]);
    assert_eq!(result.metrics.skipped_agents, 1);
    assert!(result.halt_reason.is_none());
    assert!(result.success);
    assert_eq!(
        hooks.events(),
        vec![
            HookEvent::Before("retry".to_string()),
            HookEvent::After("retry".to_string(), false),
            HookEvent::Before("check".to_string()),
            HookEvent::After("check".to_string(), true),
            HookEvent::Complete(true, 2),
        ]
    );
}

// ============================================================================
// DEFAULT SESSION LEARNER
// ============================================================================

#[tokio::test]
async fn default_learner_skips_repeat_of_failed_agent() {
    let bad = scripted(AgentOutput::failure(json!("bad"), 0.1));
    let mut pipeline = AgentPipeline::new(fast_runtime_config());
    pipeline.register_agents([
        agent_definition("bad", bad.clone()),
        agent_definition("good", scripted(AgentOutput::success(json!("good"), 0.9))),
    ]);
    pipeline
        .define_pipeline("p", "P", ["bad", "good", "bad"], None)
        .unwrap();

    let result = run(&pipeline, "p").await;

    assert_eq!(bad.calls(), 1);
    assert_ran(&result, &["bad", "good"]);
    assert_eq!(result.metrics.skipped_agents, 1);
    assert!(result.halt_reason.is_none());
    assert!(result.success);
    assert_eq!(result.final_output, json!("good"));

    let skips = result
        .learnings
        .iter()
        .find(|l| l.source == format!("{}:skips", conductor_agents::SESSION_LEARNER_SOURCE))
        .expect("skip learning");
    assert!(skips.content.contains("bad"));
    assert!(result
        .learnings
        .iter()
        .any(|l| l.learning_type == LearningType::Strategy && l.content.contains("good")));
}

#[tokio::test]
async fn default_learner_reports_strategy_for_clean_run() {
    let mut pipeline = AgentPipeline::new(fast_runtime_config());
    pipeline.register_agents([
        agent_definition("good", scripted(AgentOutput::success(json!(1), 0.9))),
        agent_definition("c", scripted(AgentOutput::success(json!(2), 0.7))),
    ]);
    pipeline.define_pipeline("p", "P", ["good", "c"], None).unwrap();

    let result = run(&pipeline, "p").await;

    assert!(result.success);
    let strategy: Vec<&Learning> = result
        .learnings
        .iter()
        .filter(|l| l.learning_type == LearningType::Strategy)
        .collect();
    assert_eq!(strategy.len(), 1);
    assert_eq!(strategy[0].source, conductor_agents::SESSION_LEARNER_SOURCE);
    assert!(strategy[0].content.contains("good"));
    assert_learnings_well_formed(&result.learnings);
}

#[tokio::test]
async fn routing_override_runs_unscheduled_peer_in_place_of_failed_agent() {
    let first = scripted(AgentOutput::failure(json!("partial"), 0.2));
    let peer = scripted(AgentOutput::success(json!("summary"), 0.85));
    let trails = Arc::new(TrailRecorder::default());

    let mut pipeline = AgentPipeline::new(fast_runtime_config());
    pipeline.register_agents([
        summarizer("summarize-a", first.clone()),
        agent_definition("review", scripted(AgentOutput::success(json!("reviewed"), 0.9))),
        summarizer("summarize-b", peer.clone()),
    ]);
    pipeline
        .define_pipeline(
            "p",
            "P",
            ["summarize-a", "review", "summarize-a"],
            Some(trails.clone() as Arc<dyn PipelineHooks>),
        )
        .unwrap();

    let result = run(&pipeline, "p").await;

    assert_eq!(first.calls(), 1);
    assert_eq!(peer.calls(), 1);
    assert_ran(&result, &["summarize-a", "review", "summarize-b"]);
    assert_eq!(result.metrics.skipped_agents, 0);
    assert!(result.halt_reason.is_none());
    assert!(result.success);
    assert_eq!(result.final_output, json!("summary"));
    assert_eq!(
        trails.trails().last(),
        Some(&(
            "summarize-b".to_string(),
            vec!["summarize-a".to_string(), "review".to_string()]
        ))
    );
}

#[tokio::test]
async fn scheduled_peer_is_never_an_override_target() {
    let first = scripted(AgentOutput::failure(json!("partial"), 0.2));
    let peer = scripted(AgentOutput::success(json!("summary"), 0.85));

    let mut pipeline = AgentPipeline::new(fast_runtime_config());
    pipeline.register_agents([
        summarizer("summarize-a", first.clone()),
        summarizer("summarize-b", peer.clone()),
    ]);
    pipeline
        .define_pipeline("p", "P", ["summarize-a", "summarize-b", "summarize-a"], None)
        .unwrap();

    let result = run(&pipeline, "p").await;

    assert_eq!(first.calls(), 1);
    assert_eq!(peer.calls(), 1);
    assert_ran(&result, &["summarize-a", "summarize-b"]);
    assert_eq!(result.metrics.skipped_agents, 1);
    assert!(result.halt_reason.is_none());
    assert!(result.success);
}

#[tokio::test(start_paused = true)]
async fn run_summary_learnings_are_merged_into_the_result() {
    let mut pipeline = AgentPipeline::new(fast_runtime_config());
    pipeline.register_agents([
        agent_definition(
            "fetch",
            Arc::new(SlowAgent::new(Duration::from_millis(500), AgentOutput::success(json!(1), 0.8))),
        ),
        agent_definition(
            "parse",
            Arc::new(SlowAgent::new(Duration::from_millis(20), AgentOutput::success(json!(2), 0.9))),
        ),
    ]);
    pipeline.define_pipeline("p", "P", ["fetch", "parse"], None).unwrap();

    let result = run(&pipeline, "p").await;

    let latency = result
        .learnings
        .iter()
        .find(|l| l.source == format!("{}:latency", conductor_agents::SESSION_LEARNER_SOURCE))
        .expect("latency learning");
    assert!(latency.content.contains("fetch"));
    assert_eq!(result.metrics.learnings_generated, result.learnings.len());
    assert_learnings_well_formed(&result.learnings);
}
