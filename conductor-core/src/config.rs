//! Configuration types

use crate::{ConductorError, ConductorResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-run session limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of agents that may complete in one run
    pub max_agents: usize,
    /// Wall-clock budget for the whole run
    #[serde(rename = "max_execution_time_ms", with = "duration_millis")]
    pub max_execution_time: Duration,
    /// Consult the session learner for skip/override decisions
    pub enable_learning: bool,
    /// Mean confidence of recent agents below which the run halts
    pub min_confidence_threshold: f64,
    /// Optional cap on accumulated agent cost
    pub cost_budget: Option<f64>,
    /// Reserved for a fan-out mode; runs are always sequential
    pub enable_parallel: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_agents: 10,
            max_execution_time: Duration::from_secs(300),
            enable_learning: true,
            min_confidence_threshold: 0.3,
            cost_budget: None,
            enable_parallel: false,
        }
    }
}

/// Retry and timeout settings applied to agents that do not override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Per-attempt timeout
    #[serde(rename = "agent_timeout_ms", with = "duration_millis")]
    pub agent_timeout: Duration,
    /// Delay before retry `n` is `backoff_base * 2^n`
    #[serde(rename = "backoff_base_ms", with = "duration_millis")]
    pub backoff_base: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            agent_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Backoff delay after the failed attempt with 0-based index `attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_base.saturating_mul(factor)
    }
}

/// Master runtime configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub session: SessionConfig,
    pub retry: RetryConfig,
}

impl RuntimeConfig {
    /// Parse a TOML document. Missing fields fall back to defaults.
    pub fn from_toml_str(source: &str) -> ConductorResult<Self> {
        let config: RuntimeConfig = toml::from_str(source).map_err(|e| {
            ConductorError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `CONDUCTOR_MAX_AGENTS`: Maximum completed agents per run (default: 10)
    /// - `CONDUCTOR_MAX_EXECUTION_TIME_MS`: Run time budget (default: 300000)
    /// - `CONDUCTOR_ENABLE_LEARNING`: Consult the session learner (default: true)
    /// - `CONDUCTOR_MIN_CONFIDENCE`: Health-check confidence floor (default: 0.3)
    /// - `CONDUCTOR_COST_BUDGET`: Optional cost cap (default: unset)
    /// - `CONDUCTOR_MAX_RETRIES`: Retries per agent (default: 2)
    /// - `CONDUCTOR_AGENT_TIMEOUT_MS`: Per-attempt timeout (default: 30000)
    /// - `CONDUCTOR_BACKOFF_BASE_MS`: Backoff base (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            session: SessionConfig {
                max_agents: env_parse("CONDUCTOR_MAX_AGENTS")
                    .unwrap_or(defaults.session.max_agents),
                max_execution_time: env_parse("CONDUCTOR_MAX_EXECUTION_TIME_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.session.max_execution_time),
                enable_learning: std::env::var("CONDUCTOR_ENABLE_LEARNING")
                    .map(|s| s == "true" || s == "1")
                    .unwrap_or(defaults.session.enable_learning),
                min_confidence_threshold: env_parse("CONDUCTOR_MIN_CONFIDENCE")
                    .unwrap_or(defaults.session.min_confidence_threshold),
                cost_budget: env_parse("CONDUCTOR_COST_BUDGET").or(defaults.session.cost_budget),
                enable_parallel: defaults.session.enable_parallel,
            },
            retry: RetryConfig {
                max_retries: env_parse("CONDUCTOR_MAX_RETRIES")
                    .unwrap_or(defaults.retry.max_retries),
                agent_timeout: env_parse("CONDUCTOR_AGENT_TIMEOUT_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.agent_timeout),
                backoff_base: env_parse("CONDUCTOR_BACKOFF_BASE_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.backoff_base),
            },
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - max_agents > 0
    /// - max_execution_time and agent_timeout are positive
    /// - min_confidence_threshold in [0.0, 1.0]
    /// - cost_budget, when set, is positive
    pub fn validate(&self) -> ConductorResult<()> {
        if self.session.max_agents == 0 {
            return Err(invalid(
                "session.max_agents",
                self.session.max_agents.to_string(),
                "max_agents must be greater than 0",
            ));
        }

        if self.session.max_execution_time.is_zero() {
            return Err(invalid(
                "session.max_execution_time",
                format!("{:?}", self.session.max_execution_time),
                "max_execution_time must be positive",
            ));
        }

        let threshold = self.session.min_confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(invalid(
                "session.min_confidence_threshold",
                threshold.to_string(),
                "min_confidence_threshold must be between 0.0 and 1.0",
            ));
        }

        if let Some(budget) = self.session.cost_budget {
            if budget <= 0.0 {
                return Err(invalid(
                    "session.cost_budget",
                    budget.to_string(),
                    "cost_budget must be positive",
                ));
            }
        }

        if self.retry.agent_timeout.is_zero() {
            return Err(invalid(
                "retry.agent_timeout",
                format!("{:?}", self.retry.agent_timeout),
                "agent_timeout must be positive",
            ));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn invalid(field: &str, value: String, reason: &str) -> ConductorError {
    ConductorError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
