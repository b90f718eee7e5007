// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mesh health rollup.
//!
//! Any offline agent degrades the mesh, as does any degraded or maintenance
//! agent. Both report `degraded`; no agent state maps to `unhealthy`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::debug;

use crate::domain::agent::AgentStatus;
use crate::domain::errors::MeshResult;
use crate::domain::health::{HealthStatus, ServiceHealth, SystemHealth};
use crate::domain::registry::AgentRegistry;

pub const MESH_SERVICE_NAME: &str = "Agent Mesh";

pub struct HealthAggregator {
    registry: Arc<dyn AgentRegistry>,
    started_at: Instant,
    active_connections: AtomicU64,
}

impl HealthAggregator {
    pub fn new(registry: Arc<dyn AgentRegistry>) -> Self {
        Self {
            registry,
            started_at: Instant::now(),
            active_connections: AtomicU64::new(0),
        }
    }

    /// Gauge maintained by the transport layer.
    pub fn set_active_connections(&self, count: u64) {
        self.active_connections.store(count, Ordering::Relaxed);
    }

    pub async fn aggregate(&self) -> MeshResult<SystemHealth> {
        let agents = self.registry.list_agents().await?;

        let offline = agents.iter().filter(|a| a.status == AgentStatus::Offline).count();
        let impaired = agents.iter().filter(|a| a.status.is_impaired()).count();

        let status = if offline > 0 || impaired > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        debug!(
            agents = agents.len(),
            offline,
            impaired,
            %status,
            "Aggregated mesh health"
        );

        Ok(SystemHealth {
            status,
            timestamp: Utc::now(),
            services: vec![ServiceHealth {
                name: MESH_SERVICE_NAME.to_string(),
                status,
                message: Some(format!("{} agents", agents.len())),
            }],
            agents_registered: agents.len(),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed().as_secs(),
        })
    }
}
