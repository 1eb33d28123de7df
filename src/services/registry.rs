//! Agent registry.
//!
//! Process-wide read-only mapping from agent name to capability record,
//! populated once at startup with the standard agents plus any
//! platform-specific sets from configuration. Immutable afterwards; tests
//! construct isolated registries.

use std::collections::HashMap;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{standard_agents, AgentCapability};

/// Name-keyed registry of agent capabilities. Lookup by tag preserves
/// insertion order.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: Vec<AgentCapability>,
    by_name: HashMap<String, usize>,
}

impl AgentRegistry {
    /// Empty registry, for tests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the standard agent set.
    pub fn with_standard_agents() -> Self {
        let mut registry = Self::new();
        for agent in standard_agents() {
            // Standard names are distinct; insertion cannot fail.
            let _ = registry.register(agent);
        }
        registry
    }

    /// Insert a capability. Fails when the name is already registered.
    pub fn register(&mut self, capability: AgentCapability) -> DomainResult<()> {
        if self.by_name.contains_key(&capability.name) {
            return Err(DomainError::DuplicateAgent(capability.name));
        }
        self.by_name
            .insert(capability.name.clone(), self.agents.len());
        self.agents.push(capability);
        Ok(())
    }

    /// Look up a capability by name.
    pub fn get(&self, name: &str) -> DomainResult<&AgentCapability> {
        self.by_name
            .get(name)
            .map(|&i| &self.agents[i])
            .ok_or_else(|| DomainError::UnknownAgent(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All capabilities carrying `tag`, in insertion order.
    pub fn find_by_capability(&self, tag: &str) -> Vec<&AgentCapability> {
        self.agents
            .iter()
            .filter(|a| a.capabilities.iter().any(|t| t == tag))
            .collect()
    }

    pub fn list_all(&self) -> &[AgentCapability] {
        &self.agents
    }

    /// Registered agent names, in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }
}
