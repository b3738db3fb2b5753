//! XDG Base Directory paths for tunkeeper.
//!
//! The CLI keeps its configuration and server directory under XDG paths on
//! every platform, the same layout tools like gh and kubectl use.

use std::path::PathBuf;

const APP_DIR: &str = "tunkeeper";

/// Get the tunkeeper config directory.
///
/// Returns `$XDG_CONFIG_HOME/tunkeeper` if set, otherwise `~/.config/tunkeeper`.
///
/// # Examples
///
/// ```
/// use tunkeeper_paths::config_dir;
///
/// let config = config_dir();
/// let user_config = config.join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// Get the tunkeeper data directory.
///
/// Returns `$XDG_DATA_HOME/tunkeeper` if set, otherwise `~/.local/share/tunkeeper`.
/// A downloaded server directory is expected to live here.
pub fn data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
}

/// Default location of the user config file.
pub fn user_config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default location of the server directory JSON.
pub fn server_directory_file() -> PathBuf {
    data_dir().join("servers.json")
}

fn xdg_dir(var: &str, home_relative: &str) -> PathBuf {
    if let Ok(base) = std::env::var(var)
        && !base.is_empty()
    {
        PathBuf::from(base).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(home_relative).join(APP_DIR)
    } else {
        PathBuf::from(home_relative).join(APP_DIR)
    }
}
