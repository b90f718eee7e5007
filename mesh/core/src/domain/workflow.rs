// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow lifecycle samples consumed by the metrics aggregator. Scheduling
//! workflows is not the mesh core's concern; it only observes them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowEventKind {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub workflow_id: String,
    pub kind: WorkflowEventKind,
    /// Epoch milliseconds
    pub ts: i64,
    pub steps_count: usize,
    /// Stable rendering of the agent sequence, e.g. "intake>triage>claims"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_agent_signature: Option<String>,
}

impl WorkflowEvent {
    pub fn started(workflow_id: impl Into<String>, ts: i64, steps_count: usize) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            kind: WorkflowEventKind::Started,
            ts,
            steps_count,
            step_agent_signature: None,
        }
    }

    pub fn completed(workflow_id: impl Into<String>, ts: i64) -> Self {
        Self::finished(workflow_id, WorkflowEventKind::Completed, ts)
    }

    pub fn failed(workflow_id: impl Into<String>, ts: i64) -> Self {
        Self::finished(workflow_id, WorkflowEventKind::Failed, ts)
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.step_agent_signature = Some(signature.into());
        self
    }

    fn finished(workflow_id: impl Into<String>, kind: WorkflowEventKind, ts: i64) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            kind,
            ts,
            steps_count: 0,
            step_agent_signature: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowOutcome {
    Completed,
    Failed,
}

impl WorkflowOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A finished workflow run, kept in a bounded buffer for pattern detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunRecord {
    pub workflow_id: String,
    pub started_at: i64,
    pub ended_at: i64,
    pub duration_ms: i64,
    pub steps_count: usize,
    pub status: WorkflowOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_agent_signature: Option<String>,
}
