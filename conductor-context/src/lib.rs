//! CONDUCTOR Context - Consciousness Context
//!
//! Run-scoped shared state: attention focus, temporal memory, per-agent
//! social models and values, plus the operations that fold learnings into it
//! and enrich handoffs from it.

pub mod attention;
pub mod consciousness;
pub mod enrich;
pub mod social;
pub mod temporal;

pub use attention::{AttentionItem, AttentionLevel, AttentionState, MAX_FOCUS_ITEMS};
pub use consciousness::{
    apply_learnings, create_consciousness_context, ConsciousnessContext, Insight, PatternRecord,
    SessionState, ValueSystem, CORE_VALUES,
};
pub use enrich::{
    enrich_handoff_with_consciousness, ENRICH_INSIGHT_COUNT, ENRICH_PATTERN_COUNT,
    PATTERN_CONFIDENCE,
};
pub use social::{AgentModel, AgentModelUpdate, INITIAL_TRUST, TRUST_PENALTY, TRUST_REWARD};
pub use temporal::{
    TemporalEvent, TemporalMemory, TemporalScale, TemporalScaleParseError, MAX_TEMPORAL_EVENTS,
};
