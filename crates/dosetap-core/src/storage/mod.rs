mod config;
pub mod database;

pub use config::{Config, SessionConfig};
pub use database::{Database, EventRecord};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/dosetap[-dev]/` based on DOSETAP_ENV.
///
/// Set DOSETAP_ENV=dev to use the development data directory, or
/// DOSETAP_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("DOSETAP_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("DOSETAP_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("dosetap-dev")
            } else {
                base_dir.join("dosetap")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
