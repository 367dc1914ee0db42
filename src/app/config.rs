use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: f64 = 15.0;
pub const DEFAULT_ALIVE_SLEEP_SECS: f64 = 3.0;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AdbSettings {
    pub command_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectSettings {
    pub connect_timeout_secs: f64,
    pub alive_sleep_secs: f64,
    pub restart_server: bool,
}

impl Default for ConnectSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            alive_sleep_secs: DEFAULT_ALIVE_SLEEP_SECS,
            restart_server: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandSettings {
    pub command_timeout_secs: u64,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub connect: ConnectSettings,
    #[serde(default)]
    pub command: CommandSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("MULTIADB_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".multiadb_config.json")
}

pub fn backup_config_path(path: &Path) -> PathBuf {
    path.with_extension("backup.json")
}

pub fn load_config(trace_id: &str) -> Result<DiscoveryConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<DiscoveryConfig, AppError> {
    if !path.exists() {
        return Ok(DiscoveryConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let config: DiscoveryConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &DiscoveryConfig,
    path: &Path,
    trace_id: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_config_path(path));
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

pub fn validate_config(mut config: DiscoveryConfig) -> DiscoveryConfig {
    let connect = &mut config.connect;
    if !connect.connect_timeout_secs.is_finite() || connect.connect_timeout_secs <= 0.0 {
        connect.connect_timeout_secs = DEFAULT_CONNECT_TIMEOUT_SECS;
    }
    if !connect.alive_sleep_secs.is_finite() || connect.alive_sleep_secs <= 0.0 {
        connect.alive_sleep_secs = DEFAULT_ALIVE_SLEEP_SECS;
    }
    if connect.alive_sleep_secs > connect.connect_timeout_secs {
        connect.alive_sleep_secs = connect.connect_timeout_secs;
    }
    if config.command.command_timeout_secs == 0 {
        config.command.command_timeout_secs = DEFAULT_COMMAND_TIMEOUT_SECS;
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = "info".to_string();
    }
    config
}
