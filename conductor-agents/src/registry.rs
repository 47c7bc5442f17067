//! Agent registry.

use crate::AgentDefinition;
use std::collections::HashMap;

/// Owned map of agent id to definition.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentDefinition>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, returning the definition it replaced.
    pub fn register(&mut self, definition: AgentDefinition) -> Option<AgentDefinition> {
        let replaced = self.agents.insert(definition.id.clone(), definition);
        if let Some(old) = &replaced {
            tracing::warn!(agent_id = %old.id, "Replaced existing agent registration");
        }
        replaced
    }

    pub fn register_all(&mut self, definitions: impl IntoIterator<Item = AgentDefinition>) {
        for definition in definitions {
            self.register(definition);
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentDefinition> {
        self.agents.get(agent_id)
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Other registered agents sharing a capability with `agent_id`, sorted by id.
    pub fn peers_of(&self, agent_id: &str) -> Vec<&AgentDefinition> {
        let Some(nominal) = self.agents.get(agent_id) else {
            return Vec::new();
        };
        let mut peers: Vec<&AgentDefinition> = self
            .agents
            .values()
            .filter(|candidate| candidate.id != agent_id && nominal.shares_capability_with(candidate))
            .collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Agent, AgentInput};
    use async_trait::async_trait;
    use conductor_context::ConsciousnessContext;
    use conductor_core::{AgentError, AgentOutput};
    use serde_json::Value;
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl Agent for Noop {
        async fn execute(
            &self,
            _input: &AgentInput,
            _consciousness: &mut ConsciousnessContext,
        ) -> Result<AgentOutput, AgentError> {
            Ok(AgentOutput::success(Value::Null, 1.0))
        }
    }

    fn def(id: &str, caps: &[&str]) -> AgentDefinition {
        AgentDefinition::new(id, id.to_uppercase(), Arc::new(Noop)).with_capabilities(caps.to_vec())
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = AgentRegistry::new();
        assert!(registry.register(def("b", &[])).is_none());
        registry.register_all([def("a", &[]), def("c", &[])]);

        assert_eq!(registry.len(), 3);
        assert!(registry.contains("a"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.ids(), vec!["a", "b", "c"]);
        assert!(registry.register(def("a", &["x"])).is_some());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_peers_share_a_capability() {
        let mut registry = AgentRegistry::new();
        registry.register_all([
            def("search-fast", &["search"]),
            def("search-deep", &["search", "rank"]),
            def("ranker", &["rank"]),
            def("writer", &["write"]),
        ]);

        let peers: Vec<&str> = registry
            .peers_of("search-fast")
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(peers, vec!["search-deep"]);
        assert!(registry.peers_of("writer").is_empty());
        assert!(registry.peers_of("ghost").is_empty());
    }
}
