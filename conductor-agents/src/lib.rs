//! CONDUCTOR Agents - Agent Contract and Session Learning
//!
//! The [`Agent`] trait implemented by pipeline steps, the owned
//! [`AgentRegistry`], and the [`SessionLearner`] that adapts skip and routing
//! decisions from within-run observations.

pub mod agent;
pub mod learner;
pub mod registry;

pub use agent::{Agent, AgentDefinition, AgentInput};
pub use learner::{
    AgentPerformance, DefaultScoringPolicy, Observation, ScoringPolicy, SessionLearner,
    SESSION_LEARNER_SOURCE,
};
pub use registry::AgentRegistry;
