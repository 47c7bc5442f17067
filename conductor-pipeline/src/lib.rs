//! CONDUCTOR Pipeline - Multi-Agent Orchestrator
//!
//! Runs a fixed sequence of registered agents, passing a handoff context
//! between them, folding their outputs into a run-scoped consciousness context
//! and adapting skip and routing decisions through the session learner.
//!
//! ```ignore
//! let mut pipeline = AgentPipeline::new(RuntimeConfig::from_env());
//! pipeline.register_agents([planner, writer]);
//! pipeline.define_pipeline("draft", "Draft", ["planner", "writer"], None)?;
//! let result = pipeline
//!     .execute_pipeline("draft", json!({"topic": "tides"}), ExecuteOptions::default())
//!     .await?;
//! ```

pub mod definition;
pub mod executor;
pub mod orchestrator;
pub mod telemetry;

pub use definition::{NoopHooks, PipelineDefinition, PipelineHooks, PipelineRegistry};
pub use executor::execute_agent;
pub use orchestrator::{AgentPipeline, ExecuteOptions, RunState, DEFAULT_INITIATOR};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, TelemetryError};
