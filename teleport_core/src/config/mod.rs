//! Runtime configuration for the provisioning client.
//!
//! The API host, bootstrap STUN server, platform label, timeouts and
//! credential directory are all explicit values here rather than constants,
//! so deployments and tests can substitute their own.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("failed to read config file: {0}")]
    IoError(#[from] io::Error),

    /// Error parsing TOML configuration
    #[error("failed to parse TOML config: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration file not found
    #[error("configuration file not found at {0}")]
    FileNotFound(PathBuf),
}

/// Client configuration, loadable from TOML with per-field defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TeleportConfig {
    /// Base URL of the router's signaling API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// STUN server used to bootstrap the local negotiation session
    #[serde(default = "default_bootstrap_server")]
    pub bootstrap_server: String,

    /// Platform label advertised in the offer attributes
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Per-request timeout for signaling HTTP calls, in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Upper bound on waiting for connectivity-check completion, in seconds
    #[serde(default = "default_connectivity_timeout_secs")]
    pub connectivity_timeout_secs: u64,

    /// Directory holding per-profile identities and device tokens
    #[serde(default = "default_credential_dir")]
    pub credential_dir: PathBuf,

    /// Directory where assembled tunnel configs are saved
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Log level: trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_base() -> String {
    "https://client.amplifi.com".to_string()
}

fn default_bootstrap_server() -> String {
    "stun:global.stun.twilio.com:3478".to_string()
}

fn default_platform() -> String {
    "iOS".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_connectivity_timeout_secs() -> u64 {
    30
}

fn default_credential_dir() -> PathBuf {
    PathBuf::from("/etc/wireguard/.teleport")
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/wireguard")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TeleportConfig {
    fn default() -> Self {
        TeleportConfig {
            api_base: default_api_base(),
            bootstrap_server: default_bootstrap_server(),
            platform: default_platform(),
            http_timeout_secs: default_http_timeout_secs(),
            connectivity_timeout_secs: default_connectivity_timeout_secs(),
            credential_dir: default_credential_dir(),
            config_dir: default_config_dir(),
            log_level: default_log_level(),
        }
    }
}

impl TeleportConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path)?;
        let config: TeleportConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file if it exists, otherwise returns defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Default per-user config path, when a home directory is resolvable.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("teleport").join("config.toml"))
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "api_base".to_string(),
                message: format!("{:?} is not an HTTP(S) URL", self.api_base),
            });
        }
        if self.bootstrap_server.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "bootstrap_server".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "http_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.connectivity_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "connectivity_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the HTTP request timeout as a [`Duration`].
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Returns the connectivity-wait bound as a [`Duration`].
    pub fn connectivity_timeout(&self) -> Duration {
        Duration::from_secs(self.connectivity_timeout_secs)
    }
}
