//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Default countdown length and tick cadence
//! - Remote session ledger location and credentials
//! - Badge thresholds
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::timer::DEFAULT_TICK_INTERVAL;

/// Timer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfigSection {
    #[serde(default = "default_duration_min")]
    pub default_duration_min: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

/// Remote session ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Empty means offline: sessions go to the local cache only.
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Badge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgesConfig {
    #[serde(default = "default_streak_badge_days")]
    pub streak_badge_days: u32,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub timer: TimerConfigSection,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub badges: BadgesConfig,
}

fn default_duration_min() -> u64 {
    25
}
fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL.as_millis() as u64
}
fn default_user_id() -> String {
    "local".into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_streak_badge_days() -> u32 {
    7
}

impl Default for TimerConfigSection {
    fn default() -> Self {
        Self {
            default_duration_min: default_duration_min(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user_id: default_user_id(),
            auth_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for BadgesConfig {
    fn default() -> Self {
        Self {
            streak_badge_days: default_streak_badge_days(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("cannot set a whole section".into()));
                    }
                    // Optional strings serialize as null until first set.
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving. Returns error if the key is
    /// unknown or the value does not fit the field.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timer.default_duration_min == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timer.default_duration_min".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.timer.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timer.tick_interval_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
