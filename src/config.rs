//! # Configuration Management
//!
//! Centralized configuration for the Pipsqueak server.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Environment variables via `from_env()`
//! - Direct instantiation with defaults
//!
//! The protocol engine itself takes no configuration; everything here feeds
//! the transport layer (listen address, connection limit, idle timeout) and
//! logging. Defaults match the deployed fleet: five simultaneous device
//! connections, a one-second idle window, port 9001.

use crate::error::{PipsqueakError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default cap on simultaneous device connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 5;

/// Default idle-socket timeout in milliseconds.
pub const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 1000;

/// Default listen address.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:9001";

/// Top-level configuration: server knobs plus logging.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PipsqueakConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PipsqueakConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PipsqueakError::Config(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| PipsqueakError::Config(format!("failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables, starting from the
    /// defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("PIPSQUEAK_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(max) = std::env::var("PIPSQUEAK_MAX_CONNECTIONS") {
            if let Ok(val) = max.parse::<usize>() {
                config.server.max_connections = val;
            }
        }

        if let Ok(timeout) = std::env::var("PIPSQUEAK_SOCKET_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.server.socket_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(level) = std::env::var("PIPSQUEAK_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration.
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common misconfigurations.
    ///
    /// Returns a list of validation errors; an empty list means the
    /// configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return a `Result`; convenience method.
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PipsqueakError::Config(format!(
                "configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Transport-layer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. "0.0.0.0:9001".
    pub address: String,

    /// Maximum simultaneous device connections; further connections are
    /// refused at accept time.
    pub max_connections: usize,

    /// Idle-socket timeout: a connection that has not delivered a complete
    /// frame within this window is destroyed.
    #[serde(with = "duration_ms")]
    pub socket_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_owned(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            socket_timeout: Duration::from_millis(DEFAULT_SOCKET_TIMEOUT_MS),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("invalid listen address: {}", self.address));
        }

        if self.max_connections == 0 {
            errors.push("max_connections must be at least 1".to_owned());
        }

        if self.socket_timeout.is_zero() {
            errors.push("socket_timeout must be non-zero".to_owned());
        }

        errors
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Vec<String> {
        if self.level.trim().is_empty() {
            vec!["logging level must not be empty".to_owned()]
        } else {
            Vec::new()
        }
    }
}

/// Serialize `Duration` as integer milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
