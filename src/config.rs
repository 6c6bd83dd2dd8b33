//! Configuration model for creel.
//!
//! Represents `creel.yaml` at the site root. Parsing is forward-compatible
//! (unknown fields are ignored) and every field has a sensible default, so a
//! site without a config file behaves identically to one with an empty one.

use crate::error::{CreelError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the creel publishing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds after which a publish lock is considered stale and may be
    /// reclaimed by a competing publisher.
    #[serde(default = "default_stale_lock_secs")]
    pub stale_lock_secs: u64,

    /// Milliseconds to wait between acquisition attempts while another
    /// publisher holds the lock.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Seconds before a waiting acquisition gives up with a timeout error.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Content directory name relative to the site root.
    #[serde(default = "default_content_dir")]
    pub content_dir: String,
}

fn default_stale_lock_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_content_dir() -> String {
    "content".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stale_lock_secs: default_stale_lock_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            content_dir: default_content_dir(),
        }
    }
}

impl Config {
    /// Load the configuration from the given path.
    ///
    /// A missing file yields the default configuration. A file that exists
    /// but cannot be read or parsed is an error; silently falling back to
    /// defaults would mask an operator's intent.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            CreelError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            CreelError::UserError(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate config values.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(CreelError::UserError(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.acquire_timeout_secs == 0 {
            return Err(CreelError::UserError(
                "acquire_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.content_dir.is_empty() || self.content_dir.contains("..") {
            return Err(CreelError::UserError(format!(
                "invalid content_dir: '{}'",
                self.content_dir
            )));
        }
        Ok(())
    }

    /// Serialize the config to YAML for scaffolding.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| CreelError::UserError(format!("failed to serialize config: {}", e)))
    }
}
