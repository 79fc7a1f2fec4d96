//! Configuration file location

use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Directory name under the config root
const APP_DIR: &str = "dspctl";

/// File name of the device configuration
const CONFIG_FILE: &str = "config.json";

/// Get the XDG config directory for dspctl
/// Uses $XDG_CONFIG_HOME/dspctl on Linux/macOS, falls back to ~/.config/dspctl
pub fn config_dir() -> Option<PathBuf> {
    config_dir_from(std::env::var("XDG_CONFIG_HOME").ok(), dirs::home_dir())
}

fn config_dir_from(xdg_config: Option<String>, home: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(xdg_config) = xdg_config {
        let path = PathBuf::from(xdg_config);
        // XDG requires an absolute path; relative values are ignored
        if path.is_absolute() {
            return Some(path.join(APP_DIR));
        }
    }

    home.map(|h| h.join(".config").join(APP_DIR))
}

/// Default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Pick the configuration file: the one given on the command line, else the default
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => default_config_path().ok_or_else(|| {
            anyhow!("Could not determine the config directory; pass a configuration file")
        }),
    }
}
