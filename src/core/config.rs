//! Pipeline configuration from YAML

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the hello-world pipeline
pub const HELLO_WORLD: &str = "hello-world";

/// How a pipeline is exposed as a long-running HTTP deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentSettings {
    /// Address the server binds to
    pub host: String,

    /// Port the server listens on
    pub port: u16,

    /// Idle timeout for keep-alive connections, in seconds.
    ///
    /// Clients poll run status over a single connection for the lifetime
    /// of a run, so this must outlast their polling interval.
    #[serde(alias = "timeout_keep_alive")]
    pub keep_alive_timeout_seconds: u64,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            keep_alive_timeout_seconds: 120,
        }
    }
}

impl DeploymentSettings {
    /// `host:port` string to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout_seconds)
    }
}

/// Runtime settings attached to a pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Settings for serving the pipeline over HTTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentSettings>,
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    #[serde(default = "default_name")]
    pub name: String,

    /// Whether step outputs may be reused across runs
    #[serde(default = "default_enable_cache")]
    pub enable_cache: bool,

    /// Runtime settings
    #[serde(default)]
    pub settings: PipelineSettings,
}

fn default_name() -> String {
    HELLO_WORLD.to_string()
}

fn default_enable_cache() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::local()
    }
}

impl PipelineConfig {
    /// Configuration for running in-process: caching on, no deployment
    pub fn local() -> Self {
        Self {
            name: default_name(),
            enable_cache: true,
            settings: PipelineSettings::default(),
        }
    }

    /// Configuration for serving over HTTP: caching off, default deployment settings
    pub fn deployed() -> Self {
        Self {
            name: default_name(),
            enable_cache: false,
            settings: PipelineSettings {
                deployment: Some(DeploymentSettings::default()),
            },
        }
    }

    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Pipeline name must not be empty");
        }

        if let Some(deployment) = &self.settings.deployment {
            if deployment.host.trim().is_empty() {
                anyhow::bail!("Deployment host must not be empty");
            }
        }

        Ok(())
    }
}
