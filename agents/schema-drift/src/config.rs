//! Service configuration
//!
//! Read from `DRIFT_*` environment variables or built in code.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DriftError, Result};

/// Default per-call collaborator timeout
pub const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 5000;

/// Default number of completed request ids kept for replay
pub const DEFAULT_REPLAY_CAPACITY: usize = 1024;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = DriftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            other => Err(DriftError::Config(format!("unknown log format '{}'", other))),
        }
    }
}

/// Metadata graph backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sled { path: PathBuf },
}

/// Service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,

    /// Pipeline catalog file (YAML, JSON or TOML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    #[serde(default)]
    pub store: StoreBackend,

    /// Timeout applied to every collaborator call
    pub collaborator_timeout_ms: u64,

    /// Completed request ids kept for idempotent replay
    #[serde(default = "default_replay_capacity")]
    pub replay_capacity: usize,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_replay_capacity() -> usize {
    DEFAULT_REPLAY_CAPACITY
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            catalog_path: None,
            store: StoreBackend::Memory,
            collaborator_timeout_ms: DEFAULT_COLLABORATOR_TIMEOUT_MS,
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
            log_format: LogFormat::Json,
        }
    }
}

impl ServiceConfig {
    /// Create a new config builder
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::new()
    }

    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let port = match lookup("DRIFT_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| DriftError::Config(format!("DRIFT_PORT is not a port: {}", raw)))?,
            None => defaults.port,
        };
        let collaborator_timeout_ms = match lookup("DRIFT_COLLABORATOR_TIMEOUT_MS") {
            Some(raw) => raw.parse().map_err(|_| {
                DriftError::Config(format!("DRIFT_COLLABORATOR_TIMEOUT_MS is not a number: {}", raw))
            })?,
            None => defaults.collaborator_timeout_ms,
        };
        let replay_capacity = match lookup("DRIFT_REPLAY_CAPACITY") {
            Some(raw) => raw.parse().map_err(|_| {
                DriftError::Config(format!("DRIFT_REPLAY_CAPACITY is not a number: {}", raw))
            })?,
            None => defaults.replay_capacity,
        };
        let log_format = match lookup("DRIFT_LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => defaults.log_format,
        };

        let config = Self {
            host: lookup("DRIFT_HOST").unwrap_or(defaults.host),
            port,
            catalog_path: lookup("DRIFT_CATALOG").map(PathBuf::from),
            store: lookup("DRIFT_STORE_PATH")
                .map(|path| StoreBackend::Sled { path: path.into() })
                .unwrap_or_default(),
            collaborator_timeout_ms,
            replay_capacity,
            log_format,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.collaborator_timeout_ms == 0 {
            return Err(DriftError::Config("collaborator timeout must be positive".into()));
        }
        if self.replay_capacity == 0 {
            return Err(DriftError::Config("replay capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    /// `host:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`ServiceConfig`]
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.catalog_path = Some(path.into());
        self
    }

    pub fn sled_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store = StoreBackend::Sled { path: path.into() };
        self
    }

    pub fn collaborator_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.collaborator_timeout_ms = timeout_ms;
        self
    }

    pub fn replay_capacity(mut self, capacity: usize) -> Self {
        self.config.replay_capacity = capacity;
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    pub fn build(self) -> Result<ServiceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_env_overrides() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("DRIFT_PORT", "9090"),
            ("DRIFT_STORE_PATH", "/var/lib/drift"),
            ("DRIFT_COLLABORATOR_TIMEOUT_MS", "250"),
            ("DRIFT_LOG_FORMAT", "text"),
            ("DRIFT_CATALOG", "catalog.yaml"),
            ("DRIFT_REPLAY_CAPACITY", "64"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(
            config.store,
            StoreBackend::Sled {
                path: "/var/lib/drift".into()
            }
        );
        assert_eq!(config.collaborator_timeout(), Duration::from_millis(250));
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.catalog_path, Some(PathBuf::from("catalog.yaml")));
        assert_eq!(config.replay_capacity, 64);
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(ServiceConfig::from_lookup(lookup(&[("DRIFT_PORT", "eighty")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup(&[("DRIFT_LOG_FORMAT", "xml")])).is_err());
        assert!(ServiceConfig::builder().collaborator_timeout_ms(0).build().is_err());
        assert!(ServiceConfig::builder().replay_capacity(0).build().is_err());
    }
}
