mod config;
pub mod database;
pub mod kv;
pub mod migrations;
pub mod timer_store;

pub use config::{BadgesConfig, Config, LedgerConfig, TimerConfigSection};
pub use database::Database;
pub use kv::{KvStore, MemoryStore};
pub use timer_store::{keys, BadgeTotals, PersistedTimer, TimerStateStore};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `FOCUSMATE_DATA_DIR` wins when set. Otherwise `~/.config/focusmate[-dev]/`
/// based on `FOCUSMATE_ENV` (set it to `dev` for a development data directory).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("FOCUSMATE_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("FOCUSMATE_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("focusmate-dev")
            } else {
                base_dir.join("focusmate")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(ConfigError::DataDir)?;
    Ok(dir)
}
