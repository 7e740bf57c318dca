//! Configuration loading for pistat.
//!
//! Settings come from an optional `~/.pistat/settings.json`; every field has a
//! default so a missing file yields a working controller. Command-line flags
//! are applied on top by the `cli` module.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::{TaskCatalog, TaskSpec};
use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the pistat home directory (~/.pistat).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".pistat"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.pistat/settings.json, or defaults if it does not exist.
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&get_settings_path()?)
}

/// Load settings from an explicit path. A missing file is not an error.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        tracing::debug!("No settings file at {}, using defaults", path.display());
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.telemetry.sample_interval_secs == 0 {
        return Err(Error::Config(
            "telemetry.sample_interval_secs must be at least 1".to_string(),
        ));
    }
    for task in &settings.tasks {
        if task.id.trim().is_empty() {
            return Err(Error::Config("tasks entries need a non-empty id".to_string()));
        }
        if task.command.is_empty() {
            return Err(Error::Config(format!(
                "task '{}' has an empty command",
                task.id
            )));
        }
    }
    Ok(())
}

/// HTTP/websocket server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the override stores.
    pub state_dir: Option<PathBuf>,
    /// Directory of static viewer assets served at `/`.
    pub static_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            state_dir: None,
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Resolve the state directory, falling back to ~/.pistat/state.
    pub fn resolved_state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(get_home_dir()?.join("state")),
        }
    }
}

/// Controller self-telemetry configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TelemetryConfig {
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,
}

fn default_sample_interval() -> u64 {
    5
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval(),
        }
    }
}

/// pistat settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Extra or replacement catalog entries, merged over the built-ins.
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl Settings {
    pub fn catalog(&self) -> TaskCatalog {
        TaskCatalog::with_overrides(self.tasks.clone())
    }
}
