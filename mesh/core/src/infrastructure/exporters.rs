// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Metrics Exporters
//!
//! Sinks for [`AggregatedSnapshot`]s:
//! - **PrometheusTextFormatter** - renders the exposition text format
//! - **ConsoleMetricsExporter** - logs the snapshot as structured JSON
//! - **HttpTextPostExporter** - POSTs the Prometheus text to a remote collector
//!
//! Exporters report failures through [`ExportError`]; the aggregator logs
//! them and carries on.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info};

use crate::application::metrics_aggregator::{AgentLatencyStats, AggregatedSnapshot};
use crate::domain::health::HealthStatus;
use crate::domain::mesh_config::ExporterConfig;
use crate::domain::workflow::WorkflowOutcome;

#[async_trait]
pub trait MetricsExporter: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    async fn export(&self, snapshot: &AggregatedSnapshot) -> Result<(), ExportError>;
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Collector responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusTextFormatter;

impl PrometheusTextFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(&self, snapshot: &AggregatedSnapshot) -> String {
        let mut out = String::new();
        let window = snapshot.window_ms;

        header(&mut out, "masterlinc_active_workflows", "Number of active workflows");
        let _ = writeln!(out, "masterlinc_active_workflows {}", snapshot.workflows.active_count);

        let latency_gauges: [(&str, &str, fn(&AgentLatencyStats) -> f64); 4] = [
            ("masterlinc_agent_latency_ms_min", "Minimum agent latency over window", |s| s.min_ms),
            ("masterlinc_agent_latency_ms_max", "Maximum agent latency over window", |s| s.max_ms),
            ("masterlinc_agent_latency_ms_avg", "Average agent latency over window", |s| s.avg_ms),
            ("masterlinc_agent_latency_ms_samples", "Agent latency samples over window", |s| s.samples as f64),
        ];
        for (metric, help, value) in latency_gauges {
            header(&mut out, metric, help);
            for stats in &snapshot.agents.latency {
                let _ = writeln!(
                    out,
                    "{}{{agent_id=\"{}\",window_ms=\"{}\"}} {}",
                    metric,
                    escape_label(&stats.agent_id),
                    stats.window_ms,
                    value(stats)
                );
            }
        }

        header(
            &mut out,
            "masterlinc_system_status_samples",
            "Count of system status samples over window",
        );
        for status in HealthStatus::ALL {
            let _ = writeln!(
                out,
                "masterlinc_system_status_samples{{status=\"{}\",window_ms=\"{}\"}} {}",
                escape_label(status.as_str()),
                window,
                snapshot.system.status_counts.get(status)
            );
        }

        header(
            &mut out,
            "masterlinc_workflow_runs",
            "Finished workflow runs over window",
        );
        let patterns = &snapshot.workflows.patterns;
        for (outcome, count) in [
            (WorkflowOutcome::Completed, patterns.completed),
            (WorkflowOutcome::Failed, patterns.failed),
        ] {
            let _ = writeln!(
                out,
                "masterlinc_workflow_runs{{status=\"{}\",window_ms=\"{}\"}} {}",
                outcome.as_str(),
                window,
                count
            );
        }

        out
    }
}

fn header(out: &mut String, metric: &str, help: &str) {
    let _ = writeln!(out, "# HELP {} {}", metric, help);
    let _ = writeln!(out, "# TYPE {} gauge", metric);
}

/// Escape a label value: backslash, newline and double quote.
pub fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '"' => escaped.push_str("\\\""),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Development exporter: logs the snapshot at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleMetricsExporter;

#[async_trait]
impl MetricsExporter for ConsoleMetricsExporter {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn export(&self, snapshot: &AggregatedSnapshot) -> Result<(), ExportError> {
        let json = serde_json::to_string(snapshot)?;
        info!(
            generated_at = snapshot.generated_at,
            snapshot = %json,
            "MASTERLINC metrics"
        );
        Ok(())
    }
}

/// Upper bound on one push, so a stalled collector cannot hold up a flush.
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpTextPostExporter {
    client: Client,
    url: String,
    formatter: PrometheusTextFormatter,
}

impl HttpTextPostExporter {
    pub fn new(url: impl Into<String>) -> Result<Self, ExportError> {
        Self::with_timeout(url, DEFAULT_EXPORT_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, ExportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(url, client))
    }

    /// Uses `client` as is; its timeout settings apply to every push.
    pub fn with_client(url: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            url: url.into(),
            formatter: PrometheusTextFormatter::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TryFrom<&ExporterConfig> for HttpTextPostExporter {
    type Error = ExportError;

    fn try_from(config: &ExporterConfig) -> Result<Self, Self::Error> {
        Self::with_timeout(config.http_url.clone(), Duration::from_millis(config.timeout_ms))
    }
}

#[async_trait]
impl MetricsExporter for HttpTextPostExporter {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn export(&self, snapshot: &AggregatedSnapshot) -> Result<(), ExportError> {
        let body = self.formatter.format(snapshot);

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExportError::Status { status, body });
        }

        debug!(url = %self.url, "Exported metrics snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::metrics_aggregator::{
        AgentsSnapshot, StatusCounts, SystemSnapshot, WorkflowPatterns, WorkflowsSnapshot,
    };

    fn snapshot() -> AggregatedSnapshot {
        AggregatedSnapshot {
            generated_at: 1_000,
            window_ms: 300_000,
            system: SystemSnapshot {
                latest: None,
                status_counts: StatusCounts {
                    healthy: 4,
                    degraded: 1,
                    unhealthy: 0,
                },
            },
            agents: AgentsSnapshot {
                latency: vec![AgentLatencyStats {
                    agent_id: "x".to_string(),
                    window_ms: 300_000,
                    min_ms: 12.5,
                    max_ms: 80.0,
                    avg_ms: 42.0,
                    samples: 7,
                }],
            },
            workflows: WorkflowsSnapshot {
                active_count: 3,
                recent_runs: Vec::new(),
                patterns: WorkflowPatterns {
                    signature_counts: Vec::new(),
                    avg_duration_ms: 0.0,
                    avg_steps: 0.0,
                    completed: 5,
                    failed: 2,
                },
            },
        }
    }

    #[test]
    fn test_prometheus_text_format() {
        let text = PrometheusTextFormatter::new().format(&snapshot());

        assert!(text.contains("# HELP masterlinc_active_workflows Number of active workflows\n"));
        assert!(text.contains("# TYPE masterlinc_active_workflows gauge\n"));
        assert!(text.contains("masterlinc_active_workflows 3\n"));
        assert!(text.contains("# TYPE masterlinc_agent_latency_ms_avg gauge\n"));
        assert!(text.contains("masterlinc_agent_latency_ms_avg{agent_id=\"x\",window_ms=\"300000\"} 42\n"));
        assert!(text.contains("masterlinc_agent_latency_ms_min{agent_id=\"x\",window_ms=\"300000\"} 12.5\n"));
        assert!(text.contains("masterlinc_agent_latency_ms_samples{agent_id=\"x\",window_ms=\"300000\"} 7\n"));
        assert!(text.contains("masterlinc_system_status_samples{status=\"healthy\",window_ms=\"300000\"} 4\n"));
        assert!(text.contains("masterlinc_system_status_samples{status=\"unhealthy\",window_ms=\"300000\"} 0\n"));
        assert!(text.contains("masterlinc_workflow_runs{status=\"failed\",window_ms=\"300000\"} 2\n"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_label_escaping() {
        assert_eq!(escape_label(r#"a\b"#), r#"a\\b"#);
        assert_eq!(escape_label("line\nbreak"), "line\\nbreak");
        assert_eq!(escape_label(r#"say "hi""#), r#"say \"hi\""#);

        let mut snap = snapshot();
        snap.agents.latency[0].agent_id = "we\"ird".to_string();
        let text = PrometheusTextFormatter::new().format(&snap);
        assert!(text.contains("agent_id=\"we\\\"ird\""));
    }

    #[tokio::test]
    async fn test_console_exporter_succeeds() {
        assert!(ConsoleMetricsExporter.export(&snapshot()).await.is_ok());
    }

    #[tokio::test]
    async fn test_http_exporter_posts_prometheus_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/metrics")
            .match_header("content-type", "text/plain")
            .match_body(mockito::Matcher::Regex(
                "masterlinc_active_workflows 3".to_string(),
            ))
            .with_status(200)
            .create_async()
            .await;

        let exporter = HttpTextPostExporter::new(format!("{}/metrics", server.url())).unwrap();
        exporter.export(&snapshot()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_exporter_reports_collector_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/metrics")
            .with_status(503)
            .with_body("collector overloaded")
            .create_async()
            .await;

        let exporter = HttpTextPostExporter::new(format!("{}/metrics", server.url())).unwrap();
        let err = exporter.export(&snapshot()).await.unwrap_err();
        match err {
            ExportError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "collector overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_http_exporter_gives_up_on_stalled_collector() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accepts connections and never answers
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = ExporterConfig {
            http_url: format!("http://{addr}/metrics"),
            timeout_ms: 50,
        };
        let exporter = HttpTextPostExporter::try_from(&config).unwrap();
        assert_eq!(exporter.url(), config.http_url);

        let err = exporter.export(&snapshot()).await.unwrap_err();
        assert!(matches!(err, ExportError::Http(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_http_exporter_with_custom_client() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/push").with_status(202).create_async().await;

        let client = Client::builder().user_agent("masterlinc-mesh").build().unwrap();
        let exporter = HttpTextPostExporter::with_client(format!("{}/push", server.url()), client);
        exporter.export(&snapshot()).await.unwrap();
        mock.assert_async().await;
    }
}
