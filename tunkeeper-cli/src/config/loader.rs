use super::types::{
    RawDirectoryConfig, RawFallbackConfig, RawReconnectConfig, RawTunkeeperConfig,
    TunkeeperConfig,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tunkeeper_core::{DirectoryConfig, FallbackServer, ReconnectConfig};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<TunkeeperConfig> {
        let mut raw = RawTunkeeperConfig::default();

        // Layer 1: User config
        let user_path = Self::user_config_path();
        if let Some(user_config) = Self::read_raw(&user_path)? {
            raw = Self::merge_raw(raw, user_config);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if let Some(project_config) = Self::read_raw(&project_path)? {
            raw = Self::merge_raw(raw, project_config);
        }

        Ok(Self::finalize(raw))
    }

    /// Get user config path (`$XDG_CONFIG_HOME/tunkeeper/config.toml`)
    pub fn user_config_path() -> PathBuf {
        tunkeeper_paths::user_config_file()
    }

    /// Get project config path
    /// Can be overridden with TUNKEEPER_PROJECT_CONFIG_DIR env var (useful for isolated e2e tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("TUNKEEPER_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".tunkeeper/config.toml")
        }
    }

    /// Load a single file with defaults applied, ignoring the other layers
    pub fn load_from_path(path: &Path) -> Result<TunkeeperConfig> {
        let raw = Self::read_raw(path)?.unwrap_or_default();
        Ok(Self::finalize(raw))
    }

    fn read_raw(path: &Path) -> Result<Option<RawTunkeeperConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let raw = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(raw))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawTunkeeperConfig, overlay: RawTunkeeperConfig) -> RawTunkeeperConfig {
        RawTunkeeperConfig {
            fallback: RawFallbackConfig {
                address: overlay.fallback.address.or(base.fallback.address),
                port: overlay.fallback.port.or(base.fallback.port),
                secret: overlay.fallback.secret.or(base.fallback.secret),
            },
            directory: RawDirectoryConfig {
                path: overlay.directory.path.or(base.directory.path),
                server: overlay.directory.server.or(base.directory.server),
            },
            reconnect: RawReconnectConfig {
                mode: overlay.reconnect.mode.or(base.reconnect.mode),
                max_attempts: overlay.reconnect.max_attempts.or(base.reconnect.max_attempts),
                window_secs: overlay.reconnect.window_secs.or(base.reconnect.window_secs),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawTunkeeperConfig) -> TunkeeperConfig {
        let reconnect_defaults = ReconnectConfig::default();
        TunkeeperConfig {
            fallback: FallbackServer {
                address: raw.fallback.address.unwrap_or_default(),
                port: raw
                    .fallback
                    .port
                    .map(|p| p.into_text())
                    .unwrap_or_default(),
                secret: raw.fallback.secret.unwrap_or_default(),
            },
            directory: DirectoryConfig {
                path: raw.directory.path,
                server: raw.directory.server,
            },
            reconnect: ReconnectConfig {
                mode: raw.reconnect.mode.unwrap_or(reconnect_defaults.mode),
                max_attempts: raw
                    .reconnect
                    .max_attempts
                    .unwrap_or(reconnect_defaults.max_attempts),
                window_secs: raw
                    .reconnect
                    .window_secs
                    .unwrap_or(reconnect_defaults.window_secs),
            },
        }
    }
}
