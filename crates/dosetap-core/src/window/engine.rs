//! Dose window engine.
//!
//! The window engine is a pure function of the caller's dose facts, the
//! configured thresholds and the current instant. It stores nothing: the
//! phase is recomputed on every query.
//!
//! ## Phases
//!
//! ```text
//! NoDose1 -> BeforeWindow -> Active -> NearClose -> Closed
//!                 \____________\__________\_________\--> Completed
//! (wake recorded, check-in pending)                  --> Finalizing
//! ```
//!
//! Boundaries: `elapsed == min` is Active, `elapsed == max` is Closed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::WindowConfig;
use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPhase {
    NoDose1,
    BeforeWindow,
    Active,
    NearClose,
    Closed,
    Completed,
    /// Wake recorded but the morning check-in is still open.
    Finalizing,
}

/// What the main button offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrimaryAction {
    Disabled { reason: String },
    WaitUntilEarliest { remaining_secs: i64 },
    TakeNow,
    TakeBeforeWindowEnds { remaining_secs: i64 },
    TakeWithOverride { reason: String },
}

/// Snooze availability. An enabled snooze carries the time left to close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnoozeAction {
    Enabled { remaining_secs: i64 },
    Disabled { reason: String },
}

impl SnoozeAction {
    pub fn is_enabled(&self) -> bool {
        matches!(self, SnoozeAction::Enabled { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipAction {
    Enabled,
    Disabled { reason: String },
}

impl SkipAction {
    pub fn is_enabled(&self) -> bool {
        matches!(self, SkipAction::Enabled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowError {
    Dose1Required,
    WindowExceeded,
}

/// Facts about one dosing night, as persisted by the session store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseFacts {
    #[serde(default)]
    pub dose1_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dose2_taken_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dose2_skipped: bool,
    #[serde(default)]
    pub snooze_count: u32,
    #[serde(default)]
    pub wake_final_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub check_in_completed: bool,
}

/// Immutable snapshot of the window at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowContext {
    pub phase: WindowPhase,
    pub primary: PrimaryAction,
    pub snooze: SnoozeAction,
    pub skip: SkipAction,
    pub elapsed_since_dose1_secs: Option<i64>,
    /// Raw `max - elapsed`; negative once the window has closed.
    pub remaining_to_max_secs: Option<i64>,
    pub errors: Vec<WindowError>,
    pub snooze_count: u32,
}

impl WindowContext {
    /// Remaining seconds floored at zero, for display.
    pub fn remaining_display_secs(&self) -> Option<i64> {
        self.remaining_to_max_secs.map(|r| r.max(0))
    }
}

/// Evaluate the dose window. First matching rule wins.
pub fn evaluate(facts: &DoseFacts, config: &WindowConfig, now: DateTime<Utc>) -> WindowContext {
    let elapsed = facts.dose1_at.map(|d1| (now - d1).num_seconds());
    let remaining = elapsed.map(|e| config.max_interval_secs() - e);

    let ctx = |phase, primary, snooze, skip, errors| WindowContext {
        phase,
        primary,
        snooze,
        skip,
        elapsed_since_dose1_secs: elapsed,
        remaining_to_max_secs: remaining,
        errors,
        snooze_count: facts.snooze_count,
    };

    if facts.wake_final_at.is_some() && !facts.check_in_completed {
        return ctx(
            WindowPhase::Finalizing,
            disabled_primary("complete check-in"),
            disabled_snooze("complete check-in"),
            disabled_skip("complete check-in"),
            vec![],
        );
    }

    if facts.check_in_completed || facts.dose2_taken_at.is_some() || facts.dose2_skipped {
        return ctx(
            WindowPhase::Completed,
            disabled_primary("session complete"),
            disabled_snooze("session complete"),
            disabled_skip("session complete"),
            vec![],
        );
    }

    let Some(elapsed) = elapsed else {
        return ctx(
            WindowPhase::NoDose1,
            disabled_primary("dose 1 required"),
            disabled_snooze("dose 1 required"),
            disabled_skip("dose 1 required"),
            vec![WindowError::Dose1Required],
        );
    };

    let min_s = config.min_interval_secs();
    let max_s = config.max_interval_secs();
    let remaining = max_s - elapsed;

    if elapsed < min_s {
        return ctx(
            WindowPhase::BeforeWindow,
            PrimaryAction::WaitUntilEarliest {
                remaining_secs: min_s - elapsed,
            },
            disabled_snooze("too early"),
            SkipAction::Enabled,
            vec![],
        );
    }

    if elapsed >= max_s {
        return ctx(
            WindowPhase::Closed,
            PrimaryAction::TakeWithOverride {
                reason: "window expired".to_string(),
            },
            disabled_snooze("window expired"),
            SkipAction::Enabled,
            vec![WindowError::WindowExceeded],
        );
    }

    if remaining <= config.near_close_secs() {
        return ctx(
            WindowPhase::NearClose,
            PrimaryAction::TakeBeforeWindowEnds {
                remaining_secs: remaining,
            },
            disabled_snooze(&format!(
                "<{} minutes left",
                config.near_close_threshold_minutes
            )),
            SkipAction::Enabled,
            vec![],
        );
    }

    let snooze = if facts.snooze_count >= config.max_snoozes {
        disabled_snooze("snooze limit")
    } else {
        SnoozeAction::Enabled {
            remaining_secs: remaining,
        }
    };

    ctx(
        WindowPhase::Active,
        PrimaryAction::TakeNow,
        snooze,
        SkipAction::Enabled,
        vec![],
    )
}

fn disabled_primary(reason: &str) -> PrimaryAction {
    PrimaryAction::Disabled {
        reason: reason.to_string(),
    }
}

fn disabled_snooze(reason: &str) -> SnoozeAction {
    SnoozeAction::Disabled {
        reason: reason.to_string(),
    }
}

fn disabled_skip(reason: &str) -> SkipAction {
    SkipAction::Disabled {
        reason: reason.to_string(),
    }
}

/// Window engine bound to a configuration and a clock.
///
/// Holds no session state; every call re-derives the context from the facts
/// passed in.
#[derive(Debug, Clone)]
pub struct WindowEngine {
    config: WindowConfig,
    clock: Arc<dyn Clock>,
}

impl WindowEngine {
    pub fn new(config: WindowConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Evaluate `facts` at the clock's current instant.
    pub fn context(&self, facts: &DoseFacts) -> WindowContext {
        evaluate(facts, &self.config, self.clock.now())
    }
}
