//! Session learner.
//!
//! Observes per-agent outcomes within a single run and recommends skips and
//! routing overrides. How observations turn into decisions is delegated to a
//! [`ScoringPolicy`]; [`DefaultScoringPolicy`] documents the stock thresholds.
//! The learner is discarded after [`SessionLearner::generate_session_learnings`].
//!
//! An agent runs at most once per run, so evidence about it only matters when
//! the sequence names it again. A flagged agent is rerouted to a peer that
//! has not run and is not scheduled, or skipped when no such peer exists.

use crate::AgentRegistry;
use conductor_context::{ConsciousnessContext, TemporalEvent, TemporalScale};
use conductor_core::{AgentOutput, DurationMs, Learning, LearningType};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Source attached to learnings the learner generates.
pub const SESSION_LEARNER_SOURCE: &str = "session_learner";

// ============================================================================
// OBSERVATIONS
// ============================================================================

/// One recorded execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub success: bool,
    pub confidence: f64,
    pub execution_time_ms: DurationMs,
    pub retry_count: u32,
}

impl From<&AgentOutput> for Observation {
    fn from(output: &AgentOutput) -> Self {
        Self {
            success: output.success,
            confidence: output.confidence,
            execution_time_ms: output.metrics.execution_time_ms,
            retry_count: output.metrics.retry_count,
        }
    }
}

/// Rolling window plus run totals for one agent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentPerformance {
    window: VecDeque<Observation>,
    pub executions: u32,
    pub successes: u32,
    pub total_retries: u32,
    pub total_time_ms: DurationMs,
}

impl AgentPerformance {
    fn record(&mut self, observation: Observation, window_size: usize) {
        self.window.push_back(observation);
        while self.window.len() > window_size.max(1) {
            self.window.pop_front();
        }
        self.executions += 1;
        if observation.success {
            self.successes += 1;
        }
        self.total_retries += observation.retry_count;
        self.total_time_ms = self.total_time_ms.saturating_add(observation.execution_time_ms);
    }

    /// Observations in the rolling window, oldest first.
    pub fn window(&self) -> impl DoubleEndedIterator<Item = &Observation> + ExactSizeIterator {
        self.window.iter()
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn window_success_rate(&self) -> f64 {
        mean(self.window.iter().map(|o| if o.success { 1.0 } else { 0.0 }))
    }

    pub fn window_mean_confidence(&self) -> f64 {
        mean(self.window.iter().map(|o| o.confidence))
    }

    pub fn mean_execution_time_ms(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.total_time_ms as f64 / self.executions as f64
        }
    }
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let len = values.len();
    if len == 0 {
        0.0
    } else {
        values.sum::<f64>() / len as f64
    }
}

// ============================================================================
// SCORING POLICY
// ============================================================================

/// Turns an agent's observed performance into skip and routing decisions.
pub trait ScoringPolicy: Send + Sync {
    /// Number of recent observations kept per agent.
    fn window_size(&self) -> usize;

    /// Whether the agent's recent trend is bad enough to skip it.
    fn should_skip(&self, performance: &AgentPerformance) -> bool;

    /// Score in [0, 1], or `None` while there is too little evidence.
    /// Agents that have not run this session are scored with an empty window.
    fn score(&self, performance: &AgentPerformance) -> Option<f64>;

    /// Minimum score advantage a peer needs to replace the nominal agent.
    fn override_margin(&self) -> f64;
}

/// Stock policy.
///
/// - keeps the last 5 observations per agent
/// - flags an agent once it has 1 observation and either its most recent
///   observations (up to 3) all failed or the window's mean confidence is
///   below 0.3
/// - scores as `0.6 * success_rate + 0.4 * mean_confidence` over the window;
///   an agent with no observations scores 0.5
/// - routes to a peer whose score is at least 0.2 higher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultScoringPolicy {
    pub window_size: usize,
    pub min_observations: usize,
    pub failure_streak: usize,
    pub min_mean_confidence: f64,
    pub success_weight: f64,
    pub confidence_weight: f64,
    pub override_margin: f64,
    /// Score of an agent with an empty window
    pub untried_score: f64,
}

impl Default for DefaultScoringPolicy {
    fn default() -> Self {
        Self {
            window_size: 5,
            min_observations: 1,
            failure_streak: 3,
            min_mean_confidence: 0.3,
            success_weight: 0.6,
            confidence_weight: 0.4,
            override_margin: 0.2,
            untried_score: 0.5,
        }
    }
}

impl ScoringPolicy for DefaultScoringPolicy {
    fn window_size(&self) -> usize {
        self.window_size
    }

    fn should_skip(&self, performance: &AgentPerformance) -> bool {
        let observed = performance.window_len();
        if observed == 0 || observed < self.min_observations {
            return false;
        }
        let failing_streak = performance
            .window()
            .rev()
            .take(self.failure_streak.max(1))
            .all(|o| !o.success);
        failing_streak || performance.window_mean_confidence() < self.min_mean_confidence
    }

    fn score(&self, performance: &AgentPerformance) -> Option<f64> {
        match performance.window_len() {
            0 => Some(self.untried_score),
            observed if observed < self.min_observations => None,
            _ => Some(
                self.success_weight * performance.window_success_rate()
                    + self.confidence_weight * performance.window_mean_confidence(),
            ),
        }
    }

    fn override_margin(&self) -> f64 {
        self.override_margin
    }
}

// ============================================================================
// SESSION LEARNER
// ============================================================================

pub struct SessionLearner {
    policy: Arc<dyn ScoringPolicy>,
    performance: HashMap<String, AgentPerformance>,
    /// Agent id to registered peers sharing a capability
    peers: HashMap<String, Vec<String>>,
    /// Agents the pipeline runs positionally; never override targets
    scheduled: HashSet<String>,
}

impl SessionLearner {
    /// Learner with no peer information; it will never override routing.
    pub fn new() -> Self {
        Self {
            policy: Arc::new(DefaultScoringPolicy::default()),
            performance: HashMap::new(),
            peers: HashMap::new(),
            scheduled: HashSet::new(),
        }
    }

    /// Learner that may route between agents of `registry` sharing a capability.
    pub fn for_registry(registry: &AgentRegistry) -> Self {
        let peers = registry
            .ids()
            .into_iter()
            .map(|id| {
                let ids = registry.peers_of(id).iter().map(|d| d.id.clone()).collect();
                (id.to_string(), ids)
            })
            .collect();
        Self {
            peers,
            ..Self::new()
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn ScoringPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Exclude the pipeline's own agent sequence from override targets.
    pub fn with_scheduled<I, S>(mut self, agent_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scheduled = agent_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn performance(&self, agent_id: &str) -> Option<&AgentPerformance> {
        self.performance.get(agent_id)
    }

    /// Record one execution. Records a temporal event the first time the
    /// agent's trend crosses into skip territory.
    pub fn record_execution(
        &mut self,
        agent_id: &str,
        output: &AgentOutput,
        consciousness: &mut ConsciousnessContext,
    ) {
        let window_size = self.policy.window_size();
        let performance = self.performance.entry(agent_id.to_string()).or_default();
        let was_flagged = self.policy.should_skip(performance);
        performance.record(Observation::from(output), window_size);

        if !was_flagged && self.policy.should_skip(performance) {
            tracing::info!(
                agent_id,
                executions = performance.executions,
                mean_confidence = performance.window_mean_confidence(),
                "Session learner flagged agent for skipping"
            );
            consciousness.record_event(
                TemporalEvent::new(
                    "learner_skip_flag",
                    format!("{agent_id} shows a persistent low performance trend"),
                    0.6,
                )
                .with_scale(TemporalScale::ShortTerm)
                .with_data(json!({ "agent_id": agent_id })),
            );
        }
    }

    /// Whether the policy flags `agent_id`'s recent trend.
    pub fn is_flagged(&self, agent_id: &str) -> bool {
        self.performance
            .get(agent_id)
            .is_some_and(|performance| self.policy.should_skip(performance))
    }

    /// True for a flagged agent with no override available.
    pub fn should_skip_agent(&self, agent_id: &str) -> bool {
        self.is_flagged(agent_id) && self.get_routing_override(agent_id).is_none()
    }

    /// A registered peer expected to clearly outperform `agent_id` in this run.
    ///
    /// Only agents that have run can be overridden. Candidates are peers that
    /// have neither run nor are scheduled in the pipeline's sequence.
    pub fn get_routing_override(&self, agent_id: &str) -> Option<String> {
        let nominal_score = self.policy.score(self.performance.get(agent_id)?)?;
        let threshold = nominal_score + self.policy.override_margin();

        self.peers
            .get(agent_id)?
            .iter()
            .filter(|peer| self.is_available(peer))
            .filter_map(|peer| self.score_of(peer).map(|score| (peer, score)))
            .filter(|(_, score)| *score >= threshold - 1e-9)
            // Highest score wins; ties go to the lexicographically first id.
            .max_by(|(a_id, a), (b_id, b)| a.total_cmp(b).then_with(|| b_id.cmp(a_id)))
            .map(|(peer, _)| peer.clone())
    }

    fn is_available(&self, agent_id: &str) -> bool {
        !self.scheduled.contains(agent_id)
            && self
                .performance
                .get(agent_id)
                .map_or(true, |performance| performance.executions == 0)
    }

    fn score_of(&self, agent_id: &str) -> Option<f64> {
        match self.performance.get(agent_id) {
            Some(performance) => self.policy.score(performance),
            None => self.policy.score(&AgentPerformance::default()),
        }
    }

    /// Summarize the run as at most four learnings: a `strategy` naming the
    /// most reliable agent (emitted once any agent was scored), and
    /// `optimization`s for retry-heavy agents, the slowest agent and agents
    /// recommended for skipping.
    pub fn generate_session_learnings(self) -> Vec<Learning> {
        let mut ids: Vec<&String> = self.performance.keys().collect();
        ids.sort();

        let mut learnings = Vec::new();

        let best = ids
            .iter()
            .filter_map(|id| self.score_of(id).map(|score| (*id, score)))
            .max_by(|(a_id, a), (b_id, b)| a.total_cmp(b).then_with(|| b_id.cmp(a_id)));
        if let Some((id, score)) = best {
            let executions = self.performance.get(id).map_or(0, |p| p.executions);
            learnings.push(
                Learning::new(
                    LearningType::Strategy,
                    format!(
                        "Agent {id} was the most reliable this session (score {score:.2} over {executions} executions)"
                    ),
                    SESSION_LEARNER_SOURCE,
                    score,
                )
                .with_actionable(true),
            );
        }

        let retried: Vec<String> = ids
            .iter()
            .filter_map(|id| {
                let retries = self.performance.get(*id)?.total_retries;
                (retries > 0).then(|| format!("{id} ({retries})"))
            })
            .collect();
        if !retried.is_empty() {
            learnings.push(
                Learning::new(
                    LearningType::Optimization,
                    format!(
                        "Agents needed retries: {}. Consider longer timeouts or input validation",
                        retried.join(", ")
                    ),
                    format!("{SESSION_LEARNER_SOURCE}:retries"),
                    0.7,
                )
                .with_actionable(true),
            );
        }

        if ids.len() >= 2 {
            let slowest = ids
                .iter()
                .filter_map(|id| Some((*id, self.performance.get(*id)?.mean_execution_time_ms())))
                .max_by(|(a_id, a), (b_id, b)| a.total_cmp(b).then_with(|| b_id.cmp(a_id)));
            if let Some((id, mean_ms)) = slowest.filter(|(_, mean_ms)| *mean_ms > 0.0) {
                learnings.push(Learning::new(
                    LearningType::Optimization,
                    format!("Agent {id} was the slowest step (mean {mean_ms:.0} ms)"),
                    format!("{SESSION_LEARNER_SOURCE}:latency"),
                    0.6,
                ));
            }
        }

        let skipped: Vec<&str> = ids
            .iter()
            .filter(|id| self.is_flagged(id))
            .map(|id| id.as_str())
            .collect();
        if !skipped.is_empty() {
            learnings.push(
                Learning::new(
                    LearningType::Optimization,
                    format!("Agents recommended for skipping: {}", skipped.join(", ")),
                    format!("{SESSION_LEARNER_SOURCE}:skips"),
                    0.8,
                )
                .with_actionable(true),
            );
        }

        learnings
    }
}

impl Default for SessionLearner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionLearner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLearner")
            .field("observed_agents", &self.performance.len())
            .field("peers", &self.peers)
            .field("scheduled", &self.scheduled)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================
