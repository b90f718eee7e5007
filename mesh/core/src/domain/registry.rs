// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Registry Contract
//!
//! The persistent agent store lives outside the mesh core. The core consumes
//! it only through [`AgentRegistry`]: point lookups by id and full listings.
//! Returning a stale or partially-updated agent is the store's responsibility,
//! not the router's.
//!
//! | Implementation | Backing |
//! |----------------|---------|
//! | `InMemoryAgentRegistry` | `parking_lot::RwLock<HashMap>` (dev/test) |
//!
//! Production stores implement the trait in their own crates.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::agent::{Agent, AgentCategory, AgentStatus};

#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Find agent by id
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, RegistryError>;

    /// List all registered agents
    async fn list_agents(&self) -> Result<Vec<Agent>, RegistryError>;

    async fn list_by_category(&self, category: AgentCategory) -> Result<Vec<Agent>, RegistryError> {
        let agents = self.list_agents().await?;
        Ok(agents.into_iter().filter(|a| a.category == category).collect())
    }

    async fn list_by_status(&self, status: AgentStatus) -> Result<Vec<Agent>, RegistryError> {
        let agents = self.list_agents().await?;
        Ok(agents.into_iter().filter(|a| a.status == status).collect())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry error: {0}")]
    Backend(String),
}
