//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Dose window thresholds and snooze limits
//! - Session timezone and rollover hour
//! - Offline queue retry policy
//! - Undo window length
//! - Quick-log cooldowns
//! - Remote endpoint
//!
//! Configuration is stored at `~/.config/dosetap/config.toml`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::limiter::{default_cooldowns, RateLimiter, MAX_COOLDOWN_SECS};
use crate::queue::{QueueConfig, MAX_BACKOFF_BASE};
use crate::session::{RolloverHour, SessionRules};
use crate::transport::RemoteConfig;
use crate::undo::{UndoConfig, MAX_UNDO_WINDOW_SECS};
use crate::window::WindowConfig;

/// Session identity configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// IANA timezone name, e.g. `America/New_York`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub rollover_hour: RolloverHour,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/dosetap/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub undo: UndoConfig,
    /// Event name -> cooldown seconds. Zero means unlimited.
    #[serde(default = "default_cooldown_table")]
    pub cooldowns: BTreeMap<String, u64>,
    #[serde(default)]
    pub remote: RemoteConfig,
}

fn default_timezone() -> String {
    "UTC".into()
}
fn default_cooldown_table() -> BTreeMap<String, u64> {
    default_cooldowns().into_iter().collect()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            rollover_hour: RolloverHour::DEFAULT,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            session: SessionConfig::default(),
            queue: QueueConfig::default(),
            undo: UndoConfig::default(),
            cooldowns: default_cooldown_table(),
            remote: RemoteConfig::default(),
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
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;

            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => {
                    if let Ok(n) = value.parse::<u64>() {
                        serde_json::Value::Number(n.into())
                    } else if let Ok(n) = value.parse::<f64>() {
                        serde_json::Number::from_f64(n)
                            .map(serde_json::Value::Number)
                            .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                    } else {
                        return Err(invalid(format!("cannot parse '{value}' as number")));
                    }
                }
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                _ => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing defaults on first run.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(err) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
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

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
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

    /// Set a config value by dot-separated key.
    ///
    /// The change is applied only if the resulting config still validates.
    /// Call [`save`](Self::save) to persist it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Flattened `key = value` pairs, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out.sort();
        out
    }

    /// Reject inconsistent thresholds, unknown timezones and bad retry policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate()?;
        self.session_rules()?;

        if self.queue.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "queue.max_retries".into(),
                message: "must be at least 1".into(),
            });
        }
        if !(1.0..=MAX_BACKOFF_BASE).contains(&self.queue.backoff_base) {
            return Err(ConfigError::InvalidValue {
                key: "queue.backoff_base".into(),
                message: format!("must be between 1.0 and {MAX_BACKOFF_BASE}"),
            });
        }
        if self.undo.window_secs == 0 || self.undo.window_secs > MAX_UNDO_WINDOW_SECS {
            return Err(ConfigError::InvalidValue {
                key: "undo.window_secs".into(),
                message: format!("must be between 1 and {MAX_UNDO_WINDOW_SECS}"),
            });
        }
        if let Some((name, _)) = self
            .cooldowns
            .iter()
            .find(|(_, secs)| **secs > MAX_COOLDOWN_SECS)
        {
            return Err(ConfigError::InvalidValue {
                key: format!("cooldowns.{name}"),
                message: format!("must be at most {MAX_COOLDOWN_SECS}"),
            });
        }
        if let Some(url) = self.remote.base_url.as_deref() {
            url::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
                key: "remote.base_url".into(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    pub fn session_rules(&self) -> Result<SessionRules, ConfigError> {
        SessionRules::parse(&self.session.timezone, self.session.rollover_hour.hour()).map_err(
            |e| ConfigError::InvalidValue {
                key: "session.timezone".into(),
                message: e.to_string(),
            },
        )
    }

    pub fn cooldown_table(&self) -> HashMap<String, u64> {
        self.cooldowns
            .iter()
            .map(|(name, secs)| (name.clone(), *secs))
            .collect()
    }

    /// A fresh limiter with this config's cooldowns.
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(&self.cooldown_table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_default_values() {
        let cfg = Config::default();
        assert_eq!(cfg.window.min_interval_minutes, 150);
        assert_eq!(cfg.window.max_interval_minutes, 240);
        assert_eq!(cfg.session.rollover_hour.hour(), 18);
        assert_eq!(cfg.queue.max_retries, 3);
        assert_eq!(cfg.undo.window_secs, 5);
        assert_eq!(cfg.cooldowns.get("bathroom"), Some(&60));
        assert!(cfg.remote.base_url.is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: Config = toml::from_str(
            "[window]\nmax_interval_minutes = 230\n\n[session]\ntimezone = \"Europe/London\"\n",
        )
        .unwrap();
        assert_eq!(cfg.window.max_interval_minutes, 230);
        assert_eq!(cfg.window.min_interval_minutes, 150);
        assert_eq!(cfg.session.timezone, "Europe/London");
        assert_eq!(cfg.session.rollover_hour.hour(), 18);
        assert_eq!(cfg.cooldowns.len(), 13);
    }

    #[test]
    fn rollover_out_of_range_fails_to_parse() {
        let result: Result<Config, _> = toml::from_str("[session]\nrollover_hour = 24\n");
        assert!(result.is_err());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("window.max_snoozes").as_deref(), Some("3"));
        assert_eq!(cfg.get("session.timezone").as_deref(), Some("UTC"));
        assert_eq!(cfg.get("cooldowns.water").as_deref(), Some("60"));
        assert!(cfg.get("window.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("window.max_snoozes", "5").unwrap();
        cfg.set("session.timezone", "America/New_York").unwrap();
        cfg.set("queue.backoff_base", "1.5").unwrap();
        cfg.set("remote.base_url", "https://api.example.com").unwrap();
        assert_eq!(cfg.window.max_snoozes, 5);
        assert_eq!(cfg.session.timezone, "America/New_York");
        assert_eq!(cfg.queue.backoff_base, 1.5);
        assert_eq!(cfg.remote.base_url.as_deref(), Some("https://api.example.com"));
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        let err = cfg.set("window.nonexistent", "1").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(_)));
    }

    #[test]
    fn set_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.set("window.max_snoozes", "many").is_err());
        assert_eq!(cfg.window.max_snoozes, 3);
    }

    #[test]
    fn set_rejects_inconsistent_window() {
        let mut cfg = Config::default();
        let err = cfg.set("window.min_interval_minutes", "300").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert_eq!(cfg.window.min_interval_minutes, 150);
    }

    #[test]
    fn set_rejects_out_of_range_retry_and_durations() {
        let mut cfg = Config::default();
        assert!(cfg.set("queue.backoff_base", "1e10").is_err());
        assert!(cfg.set("queue.backoff_base", "0.5").is_err());
        assert!(cfg.set("queue.backoff_base", "NaN").is_err());
        cfg.set("queue.backoff_base", "60").unwrap();

        let err = cfg.set("cooldowns.bathroom", "10000000000000000").unwrap_err();
        assert!(
            matches!(&err, ConfigError::InvalidValue { key, .. } if key == "cooldowns.bathroom"),
            "{err}"
        );
        assert_eq!(cfg.cooldowns.get("bathroom"), Some(&60));
        cfg.set("cooldowns.bathroom", "86400").unwrap();

        assert!(cfg.set("undo.window_secs", "0").is_err());
        assert!(cfg.set("undo.window_secs", "86401").is_err());
        assert_eq!(cfg.undo.window_secs, 5);

        cfg.validate().unwrap();
        let limiter = cfg.rate_limiter();
        assert_eq!(limiter.cooldown("bathroom"), Some(chrono::Duration::seconds(86_400)));
    }

    #[test]
    fn set_rejects_bad_timezone_and_rollover() {
        let mut cfg = Config::default();
        assert!(cfg.set("session.timezone", "Mars/Olympus").is_err());
        assert!(cfg.set("session.rollover_hour", "24").is_err());
        cfg.set("session.rollover_hour", "0").unwrap();
        assert_eq!(cfg.session.rollover_hour.hour(), 0);
    }

    #[test]
    fn entries_are_flat_and_sorted() {
        let entries = Config::default().entries();
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"window.target_minutes"));
        assert!(keys.contains(&"cooldowns.bathroom"));
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn load_from_writes_defaults_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let first = Config::load_from(&path).unwrap();
        assert!(path.exists());

        let mut changed = first.clone();
        changed.set("undo.window_secs", "8").unwrap();
        changed.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.undo.window_secs, 8);
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "window = [not toml").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
