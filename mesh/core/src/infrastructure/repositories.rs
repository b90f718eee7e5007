// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory agent registry for development, tests and single-node demos.
//! Production deployments implement [`AgentRegistry`] over their own store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::domain::agent::Agent;
use crate::domain::errors::MeshResult;
use crate::domain::registry::{AgentRegistry, RegistryError};

#[derive(Clone, Default)]
pub struct InMemoryAgentRegistry {
    agents: Arc<RwLock<HashMap<String, Agent>>>,
}

impl InMemoryAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `agents`. Later duplicates of an id
    /// replace earlier ones.
    pub fn seeded(agents: impl IntoIterator<Item = Agent>) -> MeshResult<Self> {
        let registry = Self::new();
        for agent in agents {
            registry.upsert(agent)?;
        }
        Ok(registry)
    }

    /// Insert or replace an agent, refreshing `updated_at`.
    pub fn upsert(&self, mut agent: Agent) -> MeshResult<()> {
        agent.validate()?;
        agent.updated_at = Utc::now();
        self.agents.write().insert(agent.agent_id.clone(), agent);
        Ok(())
    }

    pub fn remove(&self, agent_id: &str) -> Option<Agent> {
        self.agents.write().remove(agent_id)
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

#[async_trait]
impl AgentRegistry for InMemoryAgentRegistry {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, RegistryError> {
        Ok(self.agents.read().get(agent_id).cloned())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, RegistryError> {
        let mut agents: Vec<Agent> = self.agents.read().values().cloned().collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentCapability, AgentCategory, AgentStatus};
    use crate::domain::errors::MeshError;

    fn agent(id: &str, category: AgentCategory, status: AgentStatus) -> Agent {
        Agent::new(id, id, category, format!("http://{}.mesh.local", id)).with_status(status)
    }

    #[tokio::test]
    async fn test_upsert_get_and_remove() {
        let registry = InMemoryAgentRegistry::new();
        registry
            .upsert(agent("intake", AgentCategory::Healthcare, AgentStatus::Online))
            .unwrap();

        let found = registry.get_agent("intake").await.unwrap();
        assert_eq!(found.map(|a| a.agent_id), Some("intake".to_string()));
        assert!(registry.get_agent("billing").await.unwrap().is_none());

        assert!(registry.remove("intake").is_some());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_rejects_duplicate_capabilities() {
        let registry = InMemoryAgentRegistry::new();
        let bad = agent("scribe", AgentCategory::Content, AgentStatus::Online)
            .with_capability(AgentCapability::new("summarize", "1.0.0"))
            .with_capability(AgentCapability::new("summarize", "2.0.0"));

        let err = registry.upsert(bad).unwrap_err();
        assert!(matches!(err, MeshError::Validation(_)));
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_default_filters() {
        let registry = InMemoryAgentRegistry::seeded(vec![
            agent("a1", AgentCategory::Healthcare, AgentStatus::Online),
            agent("a2", AgentCategory::Healthcare, AgentStatus::Offline),
            agent("b1", AgentCategory::Business, AgentStatus::Online),
        ])
        .unwrap();

        let healthcare = registry.list_by_category(AgentCategory::Healthcare).await.unwrap();
        assert_eq!(healthcare.len(), 2);

        let online = registry.list_by_status(AgentStatus::Online).await.unwrap();
        let ids: Vec<_> = online.iter().map(|a| a.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b1"]);
    }

    #[tokio::test]
    async fn test_upsert_refreshes_updated_at() {
        let registry = InMemoryAgentRegistry::new();
        let mut stale = agent("a1", AgentCategory::Security, AgentStatus::Online);
        stale.updated_at = Utc::now() - chrono::Duration::hours(1);
        let before = stale.updated_at;

        registry.upsert(stale).unwrap();
        let stored = registry.get_agent("a1").await.unwrap().unwrap();
        assert!(stored.updated_at > before);
    }
}
