//! CONDUCTOR Core - Pipeline Data Types
//!
//! Learnings, signals, agent outputs, handoff contexts and the pure
//! operations over them. All other crates depend on this.

pub mod agent;
pub mod config;
pub mod error;
pub mod handoff;
pub mod identity;
pub mod learning;
pub mod session;
pub mod signal;

pub use agent::{AgentMetrics, AgentOutput, AgentResult, TrailEntry, OUTPUT_SUMMARY_MAX_CHARS};
pub use config::{RetryConfig, RuntimeConfig, SessionConfig};
pub use error::{
    AgentError, ConductorError, ConductorResult, ConfigError, DefinitionError, HandoffError,
    LimitError,
};
pub use handoff::{
    attribute_learnings, create_handoff, create_initial_handoff, create_learning_from_output,
    create_typed_learning_from_output, extract_relevant_learnings, get_trail_summary,
    should_continue_pipeline, should_continue_pipeline_at, validate_handoff, validate_handoff_at,
    ContinueDecision, HandoffContext, HandoffIssue, HandoffOptions, HandoffPriority,
    HandoffPriorityParseError, HandoffValidation, TrailSummary, HEALTH_WINDOW,
    LEARNING_CONTENT_MAX_CHARS,
};
pub use identity::{
    compute_content_hash, new_entity_id, render_value, truncate_chars, AgentId, ContentHash,
    DurationMs, EntityId, PipelineId, Timestamp,
};
pub use learning::{
    clamp_unit, merge_learnings, rank_learnings, Learning, LearningType, LearningTypeParseError,
    CONFIDENCE_TIE_BAND, MAX_MERGED_LEARNINGS,
};
pub use session::{PipelineMetrics, PipelineResult, SessionMeta};
pub use signal::{resolve_signals, FlowDirective, Signal, SignalParseError};
