use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ChainChatError, Result};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
pub const DEFAULT_GENERATE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_PULL_TIMEOUT_SECS: u64 = 1200;

pub const ENV_SERVER: &str = "CHAINCHAT_SERVER";
pub const ENV_GENERATE_TIMEOUT: &str = "CHAINCHAT_GENERATE_TIMEOUT";
pub const ENV_PULL_TIMEOUT: &str = "CHAINCHAT_PULL_TIMEOUT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainChatConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl ChainChatConfig {
    /// Read a JSON config file. Missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ChainChatConfig = serde_json::from_str(&content)
            .map_err(|e| ChainChatError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply `CHAINCHAT_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_SERVER) {
            self.server.base_url = url;
        }
        if let Some(secs) = lookup(ENV_GENERATE_TIMEOUT) {
            self.timeouts.generate_secs = parse_secs(ENV_GENERATE_TIMEOUT, &secs)?;
        }
        if let Some(secs) = lookup(ENV_PULL_TIMEOUT) {
            self.timeouts.pull_secs = parse_secs(ENV_PULL_TIMEOUT, &secs)?;
        }
        Ok(())
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| ChainChatError::Config(format!("{} must be a number of seconds, got '{}'", key, value)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
}

impl ServerConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub generate_secs: u64,
    pub pull_secs: u64,
}

impl TimeoutConfig {
    pub fn generate(&self) -> Duration {
        Duration::from_secs(self.generate_secs)
    }

    pub fn pull(&self) -> Duration {
        Duration::from_secs(self.pull_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            generate_secs: DEFAULT_GENERATE_TIMEOUT_SECS,
            pull_secs: DEFAULT_PULL_TIMEOUT_SECS,
        }
    }
}

/// Optional replacements for the bundled catalog files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub models_path: Option<PathBuf>,
    #[serde(default)]
    pub info_path: Option<PathBuf>,
}
