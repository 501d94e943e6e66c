//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::synapse::DrainMode;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Agent identity and registries
    #[serde(default)]
    pub agent: AgentConfig,

    /// Synapse queue behaviour
    #[serde(default)]
    pub queue: QueueConfig,

    /// Client request behaviour
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply environment overrides on top of this config
    pub fn with_env(mut self) -> Self {
        if let Ok(jid) = std::env::var("VERTEBRA_JID") {
            self.agent.jid = jid;
        }
        if let Ok(drain) = std::env::var("VERTEBRA_DRAIN") {
            match drain.parse() {
                Ok(mode) => self.queue.drain = mode,
                Err(e) => tracing::warn!("Ignoring VERTEBRA_DRAIN: {e}"),
            }
        }
        if let Ok(secs) = std::env::var("VERTEBRA_RESPONSE_TIMEOUT") {
            match secs.parse() {
                Ok(secs) => self.client.response_timeout_secs = secs,
                Err(e) => tracing::warn!("Ignoring VERTEBRA_RESPONSE_TIMEOUT: {e}"),
            }
        }
        if let Ok(filter) = std::env::var("VERTEBRA_LOG") {
            self.logging.filter = filter;
        }

        self
    }

    /// Default config file location (`<config dir>/vertebra/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vertebra").join("config.toml"))
    }
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Own identifier on the bus
    pub jid: String,

    /// Allow only one in-flight request per destination
    pub serialize_per_destination: bool,

    /// Recently served operation tokens remembered for duplicate detection
    pub dedup_window: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            jid: "agent@localhost".to_string(),
            serialize_per_destination: true,
            dedup_window: 256,
        }
    }
}

/// Synapse queue configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How much one fire drains
    pub drain: DrainMode,
}

/// Client request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Fail requests silent for this long (0 = wait forever)
    pub response_timeout_secs: u64,

    /// How often the runtime checks for timed-out requests
    pub sweep_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: 0,
            sweep_interval_ms: 1000,
        }
    }
}

impl ClientConfig {
    /// Response timeout, if enabled
    pub fn response_timeout(&self) -> Option<Duration> {
        (self.response_timeout_secs > 0).then(|| Duration::from_secs(self.response_timeout_secs))
    }

    /// Timeout sweep period
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VertebraError;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.agent.jid, "agent@localhost");
        assert!(config.agent.serialize_per_destination);
        assert_eq!(config.queue.drain, DrainMode::Single);
        assert_eq!(config.client.response_timeout(), None);
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [agent]
            jid = "node@cluster"
            dedup_window = 16

            [queue]
            drain = "continuous"

            [client]
            response_timeout_secs = 30
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.agent.jid, "node@cluster");
        assert_eq!(config.agent.dedup_window, 16);
        assert!(config.agent.serialize_per_destination);
        assert_eq!(config.queue.drain, DrainMode::Continuous);
        assert_eq!(
            config.client.response_timeout(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.client.sweep_interval(), Duration::from_millis(1000));
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\nfilter = \"vertebra=debug\"\njson = true\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.logging.filter, "vertebra=debug");
        assert!(config.logging.json);

        assert!(matches!(
            Config::from_file(dir.path().join("missing.toml")),
            Err(VertebraError::Io(_))
        ));
    }

    #[test]
    fn test_invalid_toml_is_toml_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[queue]\ndrain = \"sideways\"\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(VertebraError::Toml(_))
        ));
    }

    #[test]
    fn test_env_response_timeout() {
        std::env::set_var("VERTEBRA_RESPONSE_TIMEOUT", "soon");
        assert_eq!(Config::from_env().client.response_timeout_secs, 0);

        std::env::set_var("VERTEBRA_RESPONSE_TIMEOUT", "30");
        assert_eq!(
            Config::from_env().client.response_timeout(),
            Some(Duration::from_secs(30))
        );
        std::env::remove_var("VERTEBRA_RESPONSE_TIMEOUT");
    }
}
