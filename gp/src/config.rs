//! Guidepost configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main Guidepost configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Protocol server settings
    pub server: ServerConfig,

    /// Workflow-state watcher settings
    pub workflow: WorkflowConfig,

    /// Change-list cache settings
    pub changes: ChangesConfig,

    /// Guided documentation settings
    pub docs: DocsConfig,

    /// Free-form feature flags, read-only to subscribers
    pub flags: HashMap<String, bool>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.changes.ttl_secs == 0 {
            return Err(eyre::eyre!("changes.ttl-secs must be non-zero"));
        }
        if self.changes.refresh_interval_secs == 0 {
            return Err(eyre::eyre!("changes.refresh-interval-secs must be non-zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .guidepost.yml
        let local_config = PathBuf::from(".guidepost.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/guidepost/guidepost.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("guidepost").join("guidepost.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Protocol server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum accepted request line length in bytes
    #[serde(rename = "max-request-bytes")]
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: 1024 * 1024,
        }
    }
}

/// Workflow-state watcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Whether the workflow watcher subscribes at startup
    pub enabled: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Change-list cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangesConfig {
    /// Whether the change-list reader subscribes at startup
    pub enabled: bool,

    /// Cache time-to-live in seconds; a reader past this sees no data
    #[serde(rename = "ttl-secs")]
    pub ttl_secs: u64,

    /// Refresh-check timer interval in seconds
    #[serde(rename = "refresh-interval-secs")]
    pub refresh_interval_secs: u64,

    /// How long one outstanding refresh request stays outstanding before a
    /// warning clears it
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,
}

impl Default for ChangesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            refresh_interval_secs: 60,
            request_timeout_secs: 120,
        }
    }
}

impl ChangesConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Guided documentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    /// Directory holding doc templates
    pub dir: PathBuf,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("docs"),
        }
    }
}
