// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::errors::MeshError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentCategory {
    Healthcare,
    Business,
    Automation,
    Content,
    Security,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
    Degraded,
    Maintenance,
}

impl AgentStatus {
    /// Degraded and maintenance agents still answer but should not be preferred.
    pub fn is_impaired(&self) -> bool {
        matches!(self, Self::Degraded | Self::Maintenance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Semantic version of the capability contract
    pub version: String,
    pub enabled: bool,
}

impl AgentCapability {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: version.into(),
            enabled: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A registered service endpoint in the mesh.
///
/// Agents are owned by the external registry store; the routing core only
/// reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: AgentCategory,
    pub status: AgentStatus,
    pub endpoint: String,
    /// Ordered; names are unique within an agent
    #[serde(default)]
    pub capabilities: Vec<AgentCapability>,
    /// Lower value = preferred fallback target
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        category: AgentCategory,
        endpoint: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            description: None,
            category,
            status: AgentStatus::Online,
            endpoint: endpoint.into(),
            capabilities: Vec::new(),
            priority: 0,
            last_heartbeat: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_capability(mut self, capability: AgentCapability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn is_online(&self) -> bool {
        self.status == AgentStatus::Online
    }

    /// Names of enabled capabilities, in declaration order.
    pub fn active_capabilities(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        if self.agent_id.trim().is_empty() {
            return Err(MeshError::Validation("agent_id cannot be empty".to_string()));
        }

        let mut seen = HashSet::with_capacity(self.capabilities.len());
        for capability in &self.capabilities {
            if !seen.insert(capability.name.as_str()) {
                return Err(MeshError::Validation(format!(
                    "agent '{}' declares capability '{}' more than once",
                    self.agent_id, capability.name
                )));
            }
        }

        Ok(())
    }
}
