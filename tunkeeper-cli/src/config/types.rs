use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tunkeeper_core::{DirectoryConfig, FallbackServer, ReconnectConfig, ReconnectMode};

/// Merged configuration with defaults applied
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TunkeeperConfig {
    #[serde(default)]
    pub fallback: FallbackServer,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// One config file as written; every field optional so layers can merge
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTunkeeperConfig {
    #[serde(default)]
    pub fallback: RawFallbackConfig,

    #[serde(default)]
    pub directory: RawDirectoryConfig,

    #[serde(default)]
    pub reconnect: RawReconnectConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFallbackConfig {
    pub address: Option<String>,
    /// Text on purpose; validated when a connection starts
    pub port: Option<PortValue>,
    pub secret: Option<String>,
}

/// `port = 8000` and `port = "8000"` are both accepted
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

impl PortValue {
    pub fn into_text(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDirectoryConfig {
    pub path: Option<PathBuf>,
    pub server: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReconnectConfig {
    pub mode: Option<ReconnectMode>,
    pub max_attempts: Option<u32>,
    pub window_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_config_accepts_numeric_or_text_port() {
        let numeric: RawTunkeeperConfig = toml::from_str("[fallback]\nport = 8000\n").unwrap();
        assert_eq!(numeric.fallback.port, Some(PortValue::Number(8000)));

        let text: RawTunkeeperConfig = toml::from_str("[fallback]\nport = \"80a\"\n").unwrap();
        assert_eq!(text.fallback.port.unwrap().into_text(), "80a");
    }

    #[test]
    fn raw_config_leaves_unset_fields_empty() {
        let raw: RawTunkeeperConfig = toml::from_str("[reconnect]\nmode = \"backoff\"\n").unwrap();
        assert_eq!(raw.reconnect.mode, Some(ReconnectMode::Backoff));
        assert!(raw.reconnect.max_attempts.is_none());
        assert!(raw.fallback.address.is_none());
        assert!(raw.directory.path.is_none());
    }

    #[test]
    fn default_config_serializes_to_toml() {
        let toml_str = toml::to_string_pretty(&TunkeeperConfig::default()).unwrap();
        assert!(toml_str.contains("[reconnect]"));
        assert!(toml_str.contains("mode = \"immediate\""));
    }
}
