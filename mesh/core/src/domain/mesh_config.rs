// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Mesh Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing:
// - Router cache sizing (dedup + capability caches)
// - Metrics aggregator windows and buffer capacities
// - Optional remote metrics collector
// - Logging level and format

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "masterlinc.io/v1";
pub const KIND: &str = "MeshConfig";

/// Top-level mesh configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfigManifest {
    /// API version (must be "masterlinc.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "MeshConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: MeshConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshConfigSpec {
    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Remote collector for the HTTP exporter (console-only when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exporter: Option<ExporterConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Message-id dedup cache
    #[serde(default = "default_dedup_cache")]
    pub dedup: CacheConfig,

    /// Agent capability lookup cache
    #[serde(default = "default_capability_cache")]
    pub capabilities: CacheConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_size: usize,
    pub default_ttl_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: i64,

    #[serde(default = "default_agent_latency_capacity")]
    pub agent_latency_capacity: usize,

    #[serde(default = "default_system_health_capacity")]
    pub system_health_capacity: usize,

    #[serde(default = "default_snapshot_cache_ttl_ms")]
    pub snapshot_cache_ttl_ms: i64,

    #[serde(default = "default_workflow_run_capacity")]
    pub workflow_run_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Collector endpoint receiving Prometheus text via POST
    pub http_url: String,

    /// Per-push request timeout
    #[serde(default = "default_export_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_dedup_cache() -> CacheConfig {
    CacheConfig {
        max_size: 20_000,
        default_ttl_ms: 5 * 60 * 1000,
    }
}

fn default_capability_cache() -> CacheConfig {
    CacheConfig {
        max_size: 1_000,
        default_ttl_ms: 30 * 1000,
    }
}

fn default_window_ms() -> i64 {
    5 * 60 * 1000
}

fn default_agent_latency_capacity() -> usize {
    600
}

fn default_system_health_capacity() -> usize {
    180
}

fn default_snapshot_cache_ttl_ms() -> i64 {
    250
}

fn default_workflow_run_capacity() -> usize {
    500
}

fn default_export_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            dedup: default_dedup_cache(),
            capabilities: default_capability_cache(),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            agent_latency_capacity: default_agent_latency_capacity(),
            system_health_capacity: default_system_health_capacity(),
            snapshot_cache_ttl_ms: default_snapshot_cache_ttl_ms(),
            workflow_run_capacity: default_workflow_run_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MeshConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "masterlinc-mesh".to_string(),
                labels: None,
            },
            spec: MeshConfigSpec::default(),
        }
    }
}

impl MeshConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. MASTERLINC_CONFIG_PATH environment variable
    /// 2. ./masterlinc-config.yaml (working directory)
    /// 3. ~/.masterlinc/config.yaml (user home)
    /// 4. /etc/masterlinc/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("MASTERLINC_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./masterlinc-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".masterlinc").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/masterlinc/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default.
    /// An explicit path must exist and parse.
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = explicit_path {
            tracing::info!("Loading mesh configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load mesh config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading mesh configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::warn!("No mesh configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides for container deployments
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("MASTERLINC_LOG_LEVEL") {
            if level.trim().is_empty() {
                tracing::warn!("Ignoring empty MASTERLINC_LOG_LEVEL");
            } else {
                tracing::info!("Environment override: MASTERLINC_LOG_LEVEL={}", level);
                self.spec.logging.level = level;
            }
        }

        if let Ok(url) = std::env::var("MASTERLINC_METRICS_URL") {
            if url.trim().is_empty() {
                tracing::info!("Environment override: MASTERLINC_METRICS_URL is empty, disabling HTTP export");
                self.spec.exporter = None;
            } else {
                tracing::info!("Environment override: MASTERLINC_METRICS_URL={}", url);
                let timeout_ms = self
                    .spec
                    .exporter
                    .as_ref()
                    .map_or_else(default_export_timeout_ms, |e| e.timeout_ms);
                self.spec.exporter = Some(ExporterConfig { http_url: url, timeout_ms });
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let router = &self.spec.router;
        for (name, cache) in [("dedup", &router.dedup), ("capabilities", &router.capabilities)] {
            if cache.max_size == 0 {
                anyhow::bail!("spec.router.{}.max_size must be greater than zero", name);
            }
            if cache.default_ttl_ms <= 0 {
                anyhow::bail!("spec.router.{}.default_ttl_ms must be greater than zero", name);
            }
        }

        let aggregator = &self.spec.aggregator;
        if aggregator.window_ms <= 0 {
            anyhow::bail!("spec.aggregator.window_ms must be greater than zero");
        }
        if aggregator.snapshot_cache_ttl_ms < 0 {
            anyhow::bail!("spec.aggregator.snapshot_cache_ttl_ms cannot be negative");
        }
        if aggregator.agent_latency_capacity == 0
            || aggregator.system_health_capacity == 0
            || aggregator.workflow_run_capacity == 0
        {
            anyhow::bail!("spec.aggregator buffer capacities must be greater than zero");
        }

        if let Some(exporter) = &self.spec.exporter {
            if exporter.http_url.is_empty() {
                anyhow::bail!("spec.exporter.http_url cannot be empty");
            }
            if exporter.timeout_ms == 0 {
                anyhow::bail!("spec.exporter.timeout_ms must be greater than zero");
            }
        }

        match self.spec.logging.format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("Invalid logging format: '{}'. Must be 'text' or 'json'", other),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_manifest() {
        let manifest = MeshConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert_eq!(manifest.spec.router.dedup.max_size, 20_000);
        assert_eq!(manifest.spec.router.dedup.default_ttl_ms, 300_000);
        assert_eq!(manifest.spec.router.capabilities.default_ttl_ms, 30_000);
        assert_eq!(manifest.spec.aggregator.snapshot_cache_ttl_ms, 250);
        assert!(manifest.spec.exporter.is_none());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: masterlinc.io/v1
kind: MeshConfig
metadata:
  name: ward-7
spec:
  router:
    dedup:
      max_size: 500
      default_ttl_ms: 60000
  aggregator:
    window_ms: 60000
  exporter:
    http_url: http://collector:9091/metrics
"#;
        let manifest = MeshConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "ward-7");
        assert_eq!(manifest.spec.router.dedup.max_size, 500);
        assert_eq!(manifest.spec.router.capabilities.max_size, 1_000);
        assert_eq!(manifest.spec.aggregator.window_ms, 60_000);
        assert_eq!(manifest.spec.aggregator.agent_latency_capacity, 600);
        assert_eq!(manifest.spec.logging.level, "info");
        assert_eq!(
            manifest.spec.exporter.as_ref().map(|e| e.http_url.as_str()),
            Some("http://collector:9091/metrics")
        );
        assert_eq!(manifest.spec.exporter.as_ref().map(|e| e.timeout_ms), Some(5_000));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("masterlinc-config.yaml");

        let mut manifest = MeshConfigManifest::default();
        manifest.metadata.name = "icu-mesh".to_string();
        manifest.spec.aggregator.workflow_run_capacity = 42;
        manifest.to_yaml_file(&path).unwrap();

        let parsed = MeshConfigManifest::from_yaml_file(&path).unwrap();
        assert_eq!(parsed.metadata.name, "icu-mesh");
        assert_eq!(parsed.spec.aggregator.workflow_run_capacity, 42);
    }

    #[test]
    fn test_load_or_default_explicit_path_must_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "apiVersion: [not valid").unwrap();

        let result = MeshConfigManifest::load_or_default(Some(file.path().to_path_buf()));
        assert!(result.is_err());

        let missing = MeshConfigManifest::load_or_default(Some(PathBuf::from(
            "/nonexistent/masterlinc-config.yaml",
        )));
        assert!(missing.is_err());
    }

    #[test]
    fn test_validation() {
        let mut manifest = MeshConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.router.dedup.max_size = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.router.dedup.max_size = 10;

        manifest.spec.aggregator.window_ms = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.aggregator.window_ms = 1_000;

        manifest.spec.aggregator.system_health_capacity = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.aggregator.system_health_capacity = 10;

        manifest.spec.logging.format = "xml".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.logging.format = "json".to_string();

        manifest.spec.exporter = Some(ExporterConfig {
            http_url: "http://collector:9091/metrics".to_string(),
            timeout_ms: 0,
        });
        assert!(manifest.validate().is_err());
        manifest.spec.exporter = None;

        assert!(manifest.validate().is_ok());
    }
}
