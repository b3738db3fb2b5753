//! Configuration types shared by the core and the CLI

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Static fallback server used when no directory entry is selected.
///
/// The port is kept as text: a malformed value is only detected when a
/// connection is started, and reported then.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FallbackServer {
    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub port: String,

    #[serde(default)]
    pub secret: String,
}

impl FallbackServer {
    pub fn new(address: &str, port: &str, secret: &str) -> Self {
        Self {
            address: address.to_string(),
            port: port.to_string(),
            secret: secret.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.address.is_empty()
    }
}

/// Where the server directory lives and which entry to use
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DirectoryConfig {
    /// Path to the directory JSON file
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Name of the server to select; first entry when unset
    #[serde(default)]
    pub server: Option<String>,
}

/// How dropped sessions are restarted
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectMode {
    /// Restart at once with no limit
    #[default]
    Immediate,
    /// Back off between attempts and give up after `max_attempts` per window
    Backoff,
}

impl ReconnectMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Backoff => "backoff",
        }
    }
}

/// Reconnect settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectConfig {
    #[serde(default)]
    pub mode: ReconnectMode,

    /// Only used in backoff mode
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Only used in backoff mode
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    60
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            mode: ReconnectMode::Immediate,
            max_attempts: default_max_attempts(),
            window_secs: default_window_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_defaults_to_immediate() {
        let config = ReconnectConfig::default();
        assert_eq!(config.mode, ReconnectMode::Immediate);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.window_secs, 60);
    }

    #[test]
    fn reconnect_partial_toml_uses_defaults() {
        let config: ReconnectConfig = toml::from_str(r#"mode = "backoff""#).unwrap();
        assert_eq!(config.mode, ReconnectMode::Backoff);
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn fallback_port_is_kept_as_text() {
        let fallback: FallbackServer =
            toml::from_str("address = \"10.0.0.1\"\nport = \"80a\"\nsecret = \"s\"").unwrap();
        assert_eq!(fallback.port, "80a");
        assert!(fallback.is_configured());
        assert!(!FallbackServer::default().is_configured());
    }

    #[test]
    fn directory_config_toml_roundtrip() {
        let config = DirectoryConfig {
            path: Some(PathBuf::from("/tmp/servers.json")),
            server: Some("Frankfurt".to_string()),
        };
        let toml = toml::to_string(&config).unwrap();
        let parsed: DirectoryConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, config);
    }
}
