mod config;
pub mod log_db;

pub use config::{
    Config, HeartbeatConfig, IdentityConfig, PomodoroConfig, ReplayConfig, StorageConfig,
};
pub use log_db::SqliteLog;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/pomolog[-dev]/` based on POMOLOG_ENV.
///
/// Set POMOLOG_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("POMOLOG_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("pomolog-dev")
    } else {
        base_dir.join("pomolog")
    };

    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::DataDir {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}
