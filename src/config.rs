// Endpoint configuration, timeouts and topics
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::base::Endpoint;

/// Command port on the robot dog server (video is served on 8001)
pub const DEFAULT_PORT: u16 = 5001;

// Bridge loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for the bridge watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Deadline for writing one command line to the robot dog
pub const SEND_TIMEOUT: Duration = Duration::from_secs(1);

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "robotdog/cmd/base"; // commands
pub const TOPIC_HEALTH: &str = "robotdog/state/health"; // health status

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No IP address provided")]
    MissingIpAddress,

    #[error("Port must be non-zero")]
    InvalidPort,

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Attributes of the robot dog base, as given by the host configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseConfig {
    #[serde(default)]
    pub ip_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl BaseConfig {
    pub fn new(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            port: DEFAULT_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Parse and validate a JSON attribute document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checked before any connection attempt
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ip_address.trim().is_empty() {
            return Err(ConfigError::MissingIpAddress);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.ip_address.trim(), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_defaults_to_5001() {
        let config = BaseConfig::from_json_str(r#"{"ip_address": "192.168.4.1"}"#).unwrap();
        assert_eq!(config.port, 5001);
        assert_eq!(config.endpoint().to_string(), "192.168.4.1:5001");
    }

    #[test]
    fn test_explicit_port() {
        let config =
            BaseConfig::from_json_str(r#"{"ip_address": "dog.local", "port": 6000}"#).unwrap();
        assert_eq!(config, BaseConfig::new("dog.local").with_port(6000));
    }

    #[test]
    fn test_missing_ip_is_rejected() {
        assert!(matches!(
            BaseConfig::from_json_str(r#"{"port": 5001}"#),
            Err(ConfigError::MissingIpAddress)
        ));
        assert!(matches!(
            BaseConfig::from_json_str(r#"{"ip_address": ""}"#),
            Err(ConfigError::MissingIpAddress)
        ));
    }

    #[test]
    fn test_zero_port_is_rejected() {
        assert!(matches!(
            BaseConfig::new("10.0.0.2").with_port(0).validate(),
            Err(ConfigError::InvalidPort)
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            BaseConfig::from_json_str(r#"{"ip_address": 5}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            BaseConfig::from_json_file("/nonexistent/robotdog.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
