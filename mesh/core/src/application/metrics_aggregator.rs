// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Metrics Aggregator
//!
//! Streams agent heartbeats, system health samples and workflow lifecycle
//! events into bounded buffers and reduces them into an [`AggregatedSnapshot`]
//! for dashboards and exporters.
//!
//! Every buffer is capacity-bounded, so memory stays flat regardless of
//! ingestion rate. Workflows that start but never finish are capped at
//! [`MAX_PENDING_WORKFLOWS`], oldest dropped first. Latency series are kept per
//! agent id until [`MetricsAggregator::forget_agent`] drops them, so callers
//! deregistering agents should forget them here too.
//!
//! Snapshots are cached for `snapshot_cache_ttl_ms` as long as nothing new was
//! ingested.

use std::collections::{BTreeMap, HashMap, HashSet};

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::agent::AgentStatus;
use crate::domain::health::{HealthStatus, SystemHealth};
use crate::domain::mesh_config::AggregatorConfig;
use crate::domain::workflow::{WorkflowEvent, WorkflowEventKind, WorkflowOutcome, WorkflowRunRecord};
use crate::infrastructure::exporters::MetricsExporter;
use crate::infrastructure::time_series::{RingBuffer, TimeSeriesBuffer};

const MAX_RECENT_RUNS: usize = 50;
const MAX_SIGNATURES: usize = 20;
const UNKNOWN_SIGNATURE: &str = "unknown";

/// Started workflows tracked while waiting for their completion or failure
pub const MAX_PENDING_WORKFLOWS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorOptions {
    /// Window for every snapshot statistic
    pub window_ms: i64,
    /// Points kept per agent latency series
    pub agent_latency_capacity: usize,
    pub system_health_capacity: usize,
    pub snapshot_cache_ttl_ms: i64,
    /// Finished workflow runs kept for pattern detection
    pub workflow_run_capacity: usize,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        AggregatorConfig::default().into()
    }
}

impl From<AggregatorConfig> for AggregatorOptions {
    fn from(config: AggregatorConfig) -> Self {
        Self {
            window_ms: config.window_ms,
            agent_latency_capacity: config.agent_latency_capacity,
            system_health_capacity: config.system_health_capacity,
            snapshot_cache_ttl_ms: config.snapshot_cache_ttl_ms,
            workflow_run_capacity: config.workflow_run_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHeartbeat {
    pub agent_id: String,
    pub ts: i64,
    /// Observed round-trip or processing latency
    pub latency_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthMetric {
    pub ts: i64,
    pub status: HealthStatus,
    pub active_connections: u64,
    pub agents_registered: usize,
    pub uptime: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLatencyStats {
    pub agent_id: String,
    pub window_ms: i64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub healthy: u64,
    pub degraded: u64,
    pub unhealthy: u64,
}

impl StatusCounts {
    pub fn get(&self, status: HealthStatus) -> u64 {
        match status {
            HealthStatus::Healthy => self.healthy,
            HealthStatus::Degraded => self.degraded,
            HealthStatus::Unhealthy => self.unhealthy,
        }
    }

    fn increment(&mut self, status: HealthStatus) {
        match status {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Degraded => self.degraded += 1,
            HealthStatus::Unhealthy => self.unhealthy += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<SystemHealthMetric>,
    pub status_counts: StatusCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentsSnapshot {
    pub latency: Vec<AgentLatencyStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureCount {
    pub signature: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPatterns {
    pub signature_counts: Vec<SignatureCount>,
    pub avg_duration_ms: f64,
    pub avg_steps: f64,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowsSnapshot {
    pub active_count: usize,
    /// Newest first
    pub recent_runs: Vec<WorkflowRunRecord>,
    pub patterns: WorkflowPatterns,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSnapshot {
    pub generated_at: i64,
    pub window_ms: i64,
    pub system: SystemSnapshot,
    pub agents: AgentsSnapshot,
    pub workflows: WorkflowsSnapshot,
}

struct WorkflowStart {
    started_at: i64,
    steps_count: usize,
    signature: Option<String>,
}

struct CachedSnapshot {
    at: i64,
    snapshot: AggregatedSnapshot,
}

struct AggregatorState {
    agent_latency: BTreeMap<String, TimeSeriesBuffer<f64>>,
    system_health: TimeSeriesBuffer<SystemHealthMetric>,
    workflow_starts: HashMap<String, WorkflowStart>,
    active_workflows: HashSet<String>,
    workflow_runs: RingBuffer<WorkflowRunRecord>,
    dirty: bool,
    cached: Option<CachedSnapshot>,
}

impl AggregatorState {
    fn evict_oldest_start(&mut self) {
        let oldest = self
            .workflow_starts
            .iter()
            .min_by(|a, b| a.1.started_at.cmp(&b.1.started_at).then_with(|| a.0.cmp(b.0)))
            .map(|(id, _)| id.clone());

        if let Some(id) = oldest {
            self.workflow_starts.remove(&id);
            self.active_workflows.remove(&id);
            warn!(workflow_id = %id, "Pending workflow limit reached; dropped oldest unfinished workflow");
        }
    }
}

pub struct MetricsAggregator {
    options: AggregatorOptions,
    state: Mutex<AggregatorState>,
}

impl MetricsAggregator {
    pub fn new(options: AggregatorOptions) -> Self {
        let state = AggregatorState {
            agent_latency: BTreeMap::new(),
            system_health: TimeSeriesBuffer::new(options.system_health_capacity),
            workflow_starts: HashMap::new(),
            active_workflows: HashSet::new(),
            workflow_runs: RingBuffer::new(options.workflow_run_capacity),
            dirty: true,
            cached: None,
        };
        Self {
            options,
            state: Mutex::new(state),
        }
    }

    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    pub fn ingest_heartbeat(&self, heartbeat: &AgentHeartbeat) {
        let mut state = self.state.lock();
        let capacity = self.options.agent_latency_capacity;
        state
            .agent_latency
            .entry(heartbeat.agent_id.clone())
            .or_insert_with(|| TimeSeriesBuffer::new(capacity))
            .push(heartbeat.ts, heartbeat.latency_ms);
        state.dirty = true;
    }

    /// Drops the latency series of an agent that left the mesh.
    pub fn forget_agent(&self, agent_id: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.agent_latency.remove(agent_id).is_some();
        if removed {
            state.dirty = true;
        }
        removed
    }

    pub fn ingest_system_health(&self, sample: SystemHealthMetric) {
        let mut state = self.state.lock();
        state.system_health.push(sample.ts, sample);
        state.dirty = true;
    }

    pub fn ingest_system_health_from_model(&self, health: &SystemHealth, ts: i64) {
        self.ingest_system_health(SystemHealthMetric {
            ts,
            status: health.status,
            active_connections: health.active_connections,
            agents_registered: health.agents_registered,
            uptime: health.uptime,
        });
    }

    /// Tracks the active set on start and records a run on completion or
    /// failure. A finish without a recorded start only clears the active flag.
    pub fn ingest_workflow_event(&self, event: &WorkflowEvent) {
        let mut state = self.state.lock();
        let id = event.workflow_id.as_str();

        let outcome = match event.kind {
            WorkflowEventKind::Started => {
                if !state.workflow_starts.contains_key(id) && state.workflow_starts.len() >= MAX_PENDING_WORKFLOWS {
                    state.evict_oldest_start();
                }
                state.active_workflows.insert(id.to_string());
                state.workflow_starts.insert(
                    id.to_string(),
                    WorkflowStart {
                        started_at: event.ts,
                        steps_count: event.steps_count,
                        signature: event.step_agent_signature.clone(),
                    },
                );
                state.dirty = true;
                return;
            }
            WorkflowEventKind::Completed => WorkflowOutcome::Completed,
            WorkflowEventKind::Failed => WorkflowOutcome::Failed,
        };

        state.active_workflows.remove(id);

        let start = state.workflow_starts.remove(id);
        match start {
            Some(start) => {
                state.workflow_runs.push(WorkflowRunRecord {
                    workflow_id: id.to_string(),
                    started_at: start.started_at,
                    ended_at: event.ts,
                    duration_ms: (event.ts - start.started_at).max(0),
                    steps_count: start.steps_count,
                    status: outcome,
                    step_agent_signature: start.signature,
                });
            }
            None => {
                debug!(workflow_id = id, "Workflow finished without a recorded start");
            }
        }

        state.dirty = true;
    }

    /// Snapshot over the configured window ending at `now`. Reuses the cached
    /// snapshot while nothing was ingested and it is younger than the cache
    /// TTL.
    pub fn snapshot(&self, now: i64) -> AggregatedSnapshot {
        let mut state = self.state.lock();

        if !state.dirty {
            if let Some(cached) = &state.cached {
                if now - cached.at < self.options.snapshot_cache_ttl_ms {
                    return cached.snapshot.clone();
                }
            }
        }

        let snapshot = self.compute_snapshot(&state, now);
        state.cached = Some(CachedSnapshot {
            at: now,
            snapshot: snapshot.clone(),
        });
        state.dirty = false;
        snapshot
    }

    /// Push the current snapshot to `exporter`. Export failures are logged
    /// and never reach the caller.
    pub async fn export_to(&self, exporter: &dyn MetricsExporter, now: i64) {
        let snapshot = self.snapshot(now);
        if let Err(e) = exporter.export(&snapshot).await {
            warn!(
                exporter = exporter.name(),
                error = %e,
                generated_at = snapshot.generated_at,
                "Metrics export failed"
            );
        }
    }

    /// Push one snapshot to several exporters concurrently. Each failure is
    /// logged on its own.
    pub async fn export_to_all(&self, exporters: &[&dyn MetricsExporter], now: i64) {
        let snapshot = self.snapshot(now);
        let results = join_all(exporters.iter().map(|exporter| exporter.export(&snapshot))).await;

        for (exporter, result) in exporters.iter().zip(results) {
            if let Err(e) = result {
                warn!(exporter = exporter.name(), error = %e, "Metrics export failed");
            }
        }
    }

    fn compute_snapshot(&self, state: &AggregatorState, now: i64) -> AggregatedSnapshot {
        let window_ms = self.options.window_ms;

        let mut status_counts = StatusCounts::default();
        let mut latest: Option<SystemHealthMetric> = None;
        state.system_health.for_each_in_window(window_ms, now, |point| {
            status_counts.increment(point.value.status);
            if latest.as_ref().map_or(true, |l| point.ts > l.ts) {
                latest = Some(point.value.clone());
            }
        });

        let latency = state
            .agent_latency
            .iter()
            .map(|(agent_id, series)| {
                let stats = series.numeric_stats(window_ms, now);
                AgentLatencyStats {
                    agent_id: agent_id.clone(),
                    window_ms,
                    min_ms: stats.min,
                    max_ms: stats.max,
                    avg_ms: stats.avg,
                    samples: stats.count,
                }
            })
            .collect();

        let cutoff = now.saturating_sub(window_ms);
        let mut runs: Vec<WorkflowRunRecord> = Vec::new();
        let mut signatures: HashMap<&str, usize> = HashMap::new();
        let mut total_duration = 0i64;
        let mut total_steps = 0usize;
        let mut completed = 0usize;
        let mut failed = 0usize;

        for run in state.workflow_runs.iter().filter(|r| r.ended_at >= cutoff) {
            total_duration += run.duration_ms;
            total_steps += run.steps_count;
            match run.status {
                WorkflowOutcome::Completed => completed += 1,
                WorkflowOutcome::Failed => failed += 1,
            }
            let signature = run.step_agent_signature.as_deref().unwrap_or(UNKNOWN_SIGNATURE);
            *signatures.entry(signature).or_insert(0) += 1;
            runs.push(run.clone());
        }

        let mut signature_counts: Vec<SignatureCount> = signatures
            .into_iter()
            .map(|(signature, count)| SignatureCount {
                signature: signature.to_string(),
                count,
            })
            .collect();
        signature_counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.signature.cmp(&b.signature)));
        signature_counts.truncate(MAX_SIGNATURES);

        let total_runs = completed + failed;
        let (avg_duration_ms, avg_steps) = if total_runs > 0 {
            (
                total_duration as f64 / total_runs as f64,
                total_steps as f64 / total_runs as f64,
            )
        } else {
            (0.0, 0.0)
        };

        runs.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
        runs.truncate(MAX_RECENT_RUNS);

        AggregatedSnapshot {
            generated_at: now,
            window_ms,
            system: SystemSnapshot {
                latest,
                status_counts,
            },
            agents: AgentsSnapshot { latency },
            workflows: WorkflowsSnapshot {
                active_count: state.active_workflows.len(),
                recent_runs: runs,
                patterns: WorkflowPatterns {
                    signature_counts,
                    avg_duration_ms,
                    avg_steps,
                    completed,
                    failed,
                },
            },
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(AggregatorOptions::default())
    }
}
