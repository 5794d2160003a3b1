//! Dose window thresholds.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Minute thresholds for the Dose 2 window.
///
/// All values are minutes and are multiplied by 60 before any comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_min_interval")]
    pub min_interval_minutes: u32,
    #[serde(default = "default_max_interval")]
    pub max_interval_minutes: u32,
    #[serde(default = "default_near_close")]
    pub near_close_threshold_minutes: u32,
    #[serde(default = "default_target")]
    pub target_minutes: u32,
    #[serde(default = "default_snooze_step")]
    pub snooze_step_minutes: u32,
    #[serde(default = "default_max_snoozes")]
    pub max_snoozes: u32,
}

fn default_min_interval() -> u32 {
    150
}
fn default_max_interval() -> u32 {
    240
}
fn default_near_close() -> u32 {
    15
}
fn default_target() -> u32 {
    165
}
fn default_snooze_step() -> u32 {
    10
}
fn default_max_snoozes() -> u32 {
    3
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            min_interval_minutes: default_min_interval(),
            max_interval_minutes: default_max_interval(),
            near_close_threshold_minutes: default_near_close(),
            target_minutes: default_target(),
            snooze_step_minutes: default_snooze_step(),
            max_snoozes: default_max_snoozes(),
        }
    }
}

impl WindowConfig {
    pub fn min_interval_secs(&self) -> i64 {
        i64::from(self.min_interval_minutes) * 60
    }

    pub fn max_interval_secs(&self) -> i64 {
        i64::from(self.max_interval_minutes) * 60
    }

    pub fn near_close_secs(&self) -> i64 {
        i64::from(self.near_close_threshold_minutes) * 60
    }

    pub fn target_secs(&self) -> i64 {
        i64::from(self.target_minutes) * 60
    }

    pub fn snooze_step_secs(&self) -> i64 {
        i64::from(self.snooze_step_minutes) * 60
    }

    /// Check that the thresholds describe a usable window.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("window.min_interval_minutes", self.min_interval_minutes),
            ("window.max_interval_minutes", self.max_interval_minutes),
            ("window.near_close_threshold_minutes", self.near_close_threshold_minutes),
            ("window.target_minutes", self.target_minutes),
            ("window.snooze_step_minutes", self.snooze_step_minutes),
            ("window.max_snoozes", self.max_snoozes),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(invalid(key, "must be a positive integer"));
            }
        }

        if self.min_interval_minutes >= self.max_interval_minutes {
            return Err(invalid(
                "window.min_interval_minutes",
                &format!(
                    "must be less than max_interval_minutes ({})",
                    self.max_interval_minutes
                ),
            ));
        }

        let width = self.max_interval_minutes - self.min_interval_minutes;
        if self.near_close_threshold_minutes >= width {
            return Err(invalid(
                "window.near_close_threshold_minutes",
                &format!("must be shorter than the window itself ({width} minutes)"),
            ));
        }

        if self.target_minutes < self.min_interval_minutes
            || self.target_minutes > self.max_interval_minutes
        {
            return Err(invalid(
                "window.target_minutes",
                &format!(
                    "must lie within {}..={}",
                    self.min_interval_minutes, self.max_interval_minutes
                ),
            ));
        }

        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(WindowConfig::default().validate().is_ok());
        assert_eq!(WindowConfig::default().min_interval_secs(), 9_000);
        assert_eq!(WindowConfig::default().max_interval_secs(), 14_400);
    }

    #[test]
    fn rejects_inverted_window() {
        let cfg = WindowConfig {
            min_interval_minutes: 240,
            max_interval_minutes: 150,
            ..WindowConfig::default()
        };
        match cfg.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert_eq!(key, "window.min_interval_minutes")
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn rejects_target_outside_window() {
        let cfg = WindowConfig {
            target_minutes: 250,
            ..WindowConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_snooze_step() {
        let cfg = WindowConfig {
            snooze_step_minutes: 0,
            ..WindowConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg: WindowConfig = toml::from_str("max_interval_minutes = 180").unwrap();
        assert_eq!(cfg.max_interval_minutes, 180);
        assert_eq!(cfg.min_interval_minutes, 150);
    }
}
