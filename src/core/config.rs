//! Configuration parsing and validation.
//!
//! Client configuration is loaded from TOML files with programmatic
//! overrides. Every section is optional; an empty file yields a client for
//! `http://127.0.0.1:2379`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Connection to the etcd endpoint.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Callback context settings.
    #[serde(default)]
    pub callbacks: CallbackConfig,

    /// Snapshot streaming settings.
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Telemetry settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Endpoint URI (e.g., "http://127.0.0.1:2379").
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Auth token attached to every request as `token` metadata.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            auth_token: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ConnectionConfig {
    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Callback context configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Prefix for callback thread names; the resource name is appended.
    #[serde(default = "default_thread_prefix")]
    pub thread_prefix: String,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            thread_prefix: default_thread_prefix(),
        }
    }
}

impl CallbackConfig {
    /// Thread name for the callback context of one resource client.
    pub fn thread_name(&self, resource: &str) -> String {
        format!("{}-{}", self.thread_prefix, resource)
    }
}

/// Snapshot streaming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Chunk size in bytes used by the in-process transport.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_endpoint() -> String {
    "http://127.0.0.1:2379".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_thread_prefix() -> String {
    "etcd-callback".to_string()
}

fn default_chunk_size() -> usize {
    32 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ClientConfig =
            toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref endpoint) = overrides.endpoint {
            self.connection.endpoint = endpoint.clone();
        }
        if let Some(ref token) = overrides.auth_token {
            self.connection.auth_token = Some(token.clone());
        }
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(request_timeout_ms) = overrides.request_timeout_ms {
            self.connection.request_timeout_ms = request_timeout_ms;
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_connection()?;
        self.validate_snapshot()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_connection(&self) -> Result<()> {
        let endpoint = &self.connection.endpoint;
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            anyhow::bail!(
                "connection.endpoint must start with http:// or https://, got: {}",
                endpoint
            );
        }

        if self.connection.connect_timeout_ms == 0 {
            anyhow::bail!("connection.connect_timeout_ms must be > 0");
        }
        if self.connection.request_timeout_ms == 0 {
            anyhow::bail!("connection.request_timeout_ms must be > 0");
        }

        if let Some(ref token) = self.connection.auth_token {
            if token.is_empty() {
                anyhow::bail!("connection.auth_token must not be empty when set");
            }
        }

        if self.callbacks.thread_prefix.is_empty() {
            anyhow::bail!("callbacks.thread_prefix must not be empty");
        }

        Ok(())
    }

    fn validate_snapshot(&self) -> Result<()> {
        if self.snapshot.chunk_size == 0 {
            anyhow::bail!("snapshot.chunk_size must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// Override options applied on top of a loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override endpoint.
    pub endpoint: Option<String>,
    /// Override auth token.
    pub auth_token: Option<String>,
    /// Override log level.
    pub log_level: Option<String>,
    /// Override request timeout.
    pub request_timeout_ms: Option<u64>,
}
