//! Worker configuration.
//!
//! Values come from an optional JSON file named by `WORKER_CONFIG`; individual
//! environment variables override whatever the file says.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{env, fs, io};

use agent_lifecycle_control::Capability;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the optional JSON config file.
pub const CONFIG_PATH_VAR: &str = "WORKER_CONFIG";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The config file is not valid JSON for [`WorkerConfig`].
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A setting has an unusable value.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue {
        /// Setting name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}, expected text or json")),
        }
    }
}

/// Configuration for the worker process.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Agent identifier. Random when not configured.
    #[serde(default = "WorkerConfig::default_agent_id")]
    pub agent_id: String,

    /// Agent name.
    #[serde(default = "WorkerConfig::default_agent_name")]
    pub agent_name: String,

    /// Agent version.
    #[serde(default = "WorkerConfig::default_agent_version")]
    pub agent_version: String,

    /// Capabilities the agent advertises.
    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// How long a graceful stop may take before it is abandoned.
    #[serde(default = "WorkerConfig::default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,

    /// Interval between health heartbeats while running.
    #[serde(default = "WorkerConfig::default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,

    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl WorkerConfig {
    fn default_agent_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn default_agent_name() -> String {
        "agent-lifecycle-worker".to_string()
    }

    fn default_agent_version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    const fn default_shutdown_timeout() -> u64 {
        30
    }

    const fn default_heartbeat_interval() -> u64 {
        15
    }

    /// Load from `WORKER_CONFIG` (if set) and the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or if any
    /// value is out of range.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var_os(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// Parse a JSON config file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, is not valid JSON,
    /// or holds an out-of-range value.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides looked up by variable name. Blank values are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric or enum override
    /// does not parse, or the result fails validation.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("AGENT_ID") {
            self.agent_id = value;
        }
        if let Some(value) = get("AGENT_NAME") {
            self.agent_name = value;
        }
        if let Some(value) = get("AGENT_VERSION") {
            self.agent_version = value;
        }
        if let Some(value) = get("SHUTDOWN_TIMEOUT_SECONDS") {
            self.shutdown_timeout_seconds = parse_seconds("SHUTDOWN_TIMEOUT_SECONDS", &value)?;
        }
        if let Some(value) = get("HEARTBEAT_INTERVAL_SECONDS") {
            self.heartbeat_interval_seconds = parse_seconds("HEARTBEAT_INTERVAL_SECONDS", &value)?;
        }
        if let Some(value) = get("LOG_FORMAT") {
            self.log_format = value
                .parse()
                .map_err(|reason| ConfigError::InvalidValue {
                    name: "LOG_FORMAT",
                    reason,
                })?;
        }

        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.shutdown_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                name: "shutdown_timeout_seconds",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.heartbeat_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                name: "heartbeat_interval_seconds",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Get the shutdown timeout as a `Duration`.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Get the heartbeat interval as a `Duration`.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            agent_id: Self::default_agent_id(),
            agent_name: Self::default_agent_name(),
            agent_version: Self::default_agent_version(),
            capabilities: Vec::new(),
            shutdown_timeout_seconds: Self::default_shutdown_timeout(),
            heartbeat_interval_seconds: Self::default_heartbeat_interval(),
            log_format: LogFormat::default(),
        }
    }
}

fn parse_seconds(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|err: std::num::ParseIntError| ConfigError::InvalidValue {
            name,
            reason: format!("{value:?} is not a whole number of seconds: {err}"),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use agent_lifecycle_control::MetadataValue;
    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn default_config() {
        let config = WorkerConfig::default();
        assert!(uuid::Uuid::parse_str(&config.agent_id).is_ok());
        assert_eq!(config.agent_name, "agent-lifecycle-worker");
        assert_eq!(config.agent_version, env!("CARGO_PKG_VERSION"));
        assert!(config.capabilities.is_empty());
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(15));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn default_ids_are_unique() {
        assert_ne!(
            WorkerConfig::default().agent_id,
            WorkerConfig::default().agent_id
        );
    }

    #[test]
    fn load_from_file() {
        let file = write_config(
            r#"{
                "agent_id": "a1",
                "agent_name": "svc",
                "agent_version": "1.0.0",
                "capabilities": [
                    {
                        "name": "summarize",
                        "version": "2.1.0",
                        "description": "Summarizes documents",
                        "metadata": { "max_tokens": 4096, "languages": ["en", "de"] }
                    }
                ],
                "shutdown_timeout_seconds": 5,
                "log_format": "json"
            }"#,
        );

        let config = WorkerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.agent_id, "a1");
        assert_eq!(config.agent_name, "svc");
        assert_eq!(config.agent_version, "1.0.0");
        assert_eq!(config.shutdown_timeout_seconds, 5);
        assert_eq!(config.heartbeat_interval_seconds, 15);
        assert_eq!(config.log_format, LogFormat::Json);

        let capability = &config.capabilities[0];
        assert_eq!(capability.name, "summarize");
        assert_eq!(
            capability.metadata_value("max_tokens"),
            Some(&MetadataValue::Integer(4096))
        );
    }

    #[test]
    fn partial_file_uses_defaults() {
        let file = write_config(r#"{ "agent_name": "svc" }"#);

        let config = WorkerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.agent_name, "svc");
        assert_eq!(config.agent_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.shutdown_timeout_seconds, 30);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        let err = WorkerConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let file = write_config(r#"{ "shutdown_timeout_seconds": "soon" }"#);

        let err = WorkerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_timeout_in_file_rejected() {
        let file = write_config(r#"{ "shutdown_timeout_seconds": 0 }"#);

        let err = WorkerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                name: "shutdown_timeout_seconds",
                ..
            }
        ));
    }

    #[test]
    fn environment_overrides() {
        let mut config = WorkerConfig::default();
        config
            .apply_overrides(vars(&[
                ("AGENT_ID", "a9"),
                ("AGENT_NAME", "billing"),
                ("AGENT_VERSION", "3.2.1"),
                ("SHUTDOWN_TIMEOUT_SECONDS", " 12 "),
                ("HEARTBEAT_INTERVAL_SECONDS", "2"),
                ("LOG_FORMAT", "JSON"),
            ]))
            .unwrap();

        assert_eq!(config.agent_id, "a9");
        assert_eq!(config.agent_name, "billing");
        assert_eq!(config.agent_version, "3.2.1");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(12));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(2));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let mut config = WorkerConfig::default();
        let id = config.agent_id.clone();

        config
            .apply_overrides(vars(&[("AGENT_ID", "  "), ("LOG_FORMAT", "")]))
            .unwrap();

        assert_eq!(config.agent_id, id);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn invalid_overrides_rejected() {
        let err = WorkerConfig::default()
            .apply_overrides(vars(&[("SHUTDOWN_TIMEOUT_SECONDS", "ten")]))
            .unwrap_err();
        assert!(err.to_string().starts_with("invalid value for SHUTDOWN_TIMEOUT_SECONDS"));

        let err = WorkerConfig::default()
            .apply_overrides(vars(&[("LOG_FORMAT", "yaml")]))
            .unwrap_err();
        assert!(err.to_string().contains("unknown log format"));

        let err = WorkerConfig::default()
            .apply_overrides(vars(&[("HEARTBEAT_INTERVAL_SECONDS", "0")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                name: "heartbeat_interval_seconds",
                ..
            }
        ));
    }

    #[test]
    fn log_format_round_trips_through_display() {
        for format in [LogFormat::Text, LogFormat::Json] {
            assert_eq!(format.to_string().parse::<LogFormat>(), Ok(format));
        }
    }
}
