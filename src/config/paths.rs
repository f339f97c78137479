//! Filesystem locations used by tankobon.

use std::path::PathBuf;

use crate::config::ConfigError;

/// Overrides the configuration directory.
pub const ENV_CONFIG_PATH: &str = "TANKOBON_CONFIG_PATH";

const APP_DIR: &str = "tankobon";

/// `$TANKOBON_CONFIG_PATH` or `<config dir>/tankobon`.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    if let Some(custom) = std::env::var_os(ENV_CONFIG_PATH) {
        return Ok(PathBuf::from(custom));
    }
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(config_dir.join(APP_DIR))
}

pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn logs_dir() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("logs"))
}

/// History database, kept in the cache directory.
pub fn history_db() -> Result<PathBuf, ConfigError> {
    let cache_dir = dirs::cache_dir().ok_or(ConfigError::NoCacheDir)?;
    Ok(cache_dir.join(APP_DIR).join("history.db"))
}
