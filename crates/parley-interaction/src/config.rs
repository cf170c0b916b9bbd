//! Client configuration file management.
//!
//! Supports reading connection settings from a TOML file, by default
//! `~/.config/parley/config.toml`. Every field has a default so an absent
//! file yields a working local-development configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::session::Credentials;

/// Connection settings for the chat backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the backend, e.g. `http://localhost:8000`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Upper bound for a single network exchange, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Development-only auto-login credentials.
    ///
    /// Never populated by default; only present when the operator writes
    /// the `[dev_auto_login]` section explicitly. Consumed by the CLI,
    /// never by the library layers.
    #[serde(default)]
    pub dev_auto_login: Option<Credentials>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            dev_auto_login: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Configuration file failure.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file at {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("failed to parse configuration file at {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl ClientConfig {
    /// The per-call network timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        toml::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Returns the default configuration file path:
    /// `~/.config/parley/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("parley").join("config.toml"))
    }

    /// Loads from the default path, falling back to defaults when the
    /// file does not exist.
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "ignoring unreadable config file");
                Self::default()
            }),
            _ => Self::default(),
        }
    }
}
