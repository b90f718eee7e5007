// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Process-wide telemetry: the mesh metrics context and log initialisation.
//!
//! [`MeshMetrics`] owns its own Prometheus recorder instead of installing a
//! global one. Create it once at startup and hand an `Arc` to every router;
//! dropping the last handle tears it down.

use anyhow::Context;
use metrics::{counter, with_local_recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use crate::domain::mesh_config::LoggingConfig;

pub const MESSAGES_ROUTED: &str = "masterlinc_messages_routed_total";
pub const MESSAGES_REROUTED: &str = "masterlinc_messages_rerouted_total";
pub const MESSAGES_REJECTED: &str = "masterlinc_messages_rejected_total";

/// Why the router refused a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Duplicate,
    PolicyDenied,
    ReceiverNotFound,
    RegistryError,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::PolicyDenied => "policy_denied",
            Self::ReceiverNotFound => "receiver_not_found",
            Self::RegistryError => "registry_error",
        }
    }
}

pub struct MeshMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl MeshMetrics {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        Self { recorder, handle }
    }

    pub fn record_routed(&self) {
        with_local_recorder(&self.recorder, || {
            counter!(MESSAGES_ROUTED).increment(1);
        });
    }

    pub fn record_rerouted(&self) {
        with_local_recorder(&self.recorder, || {
            counter!(MESSAGES_REROUTED).increment(1);
        });
    }

    pub fn record_rejected(&self, reason: RejectReason) {
        with_local_recorder(&self.recorder, || {
            counter!(MESSAGES_REJECTED, "reason" => reason.as_str()).increment(1);
        });
    }

    /// Prometheus exposition text of every counter recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl Default for MeshMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `level`;
/// `format` is "json" or anything else for compact text.
pub fn init_logging(level: &str, format: &str) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let result = if format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

/// [`init_logging`] driven by the manifest's `spec.logging` block.
pub fn init_logging_from_config(config: &LoggingConfig) -> anyhow::Result<()> {
    init_logging(&config.level, &config.format)
}
