//! YAML configuration loader
//!
//! The config file carries the server host, an `auth` section with the
//! account credentials, and an optional collector URL for the `forward`
//! output mode.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config validation failed: {0}")]
    Validation(String),
}

/// Server account credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Management server hostname or URL.
    pub host: String,
    pub auth: AuthConfig,
    /// Collector URL for the `forward` output mode.
    #[serde(default)]
    pub forward_url: Option<String>,
}

/// Read and validate the config file at `path`.
pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.host.trim().is_empty() {
        return Err(ConfigError::Validation("host must not be empty".to_string()));
    }
    if config.auth.username.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.username must not be empty".to_string(),
        ));
    }
    Ok(())
}
