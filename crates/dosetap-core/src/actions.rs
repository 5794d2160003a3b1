//! Dose actions: what the user did, when, and how it folds into the night.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::undo::UndoableAction;
use crate::window::{evaluate, DoseFacts, WindowConfig, WindowContext, WindowPhase};

/// A user action bound for local storage and the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DoseAction {
    TakeDose1 {
        at: DateTime<Utc>,
    },
    TakeDose2 {
        at: DateTime<Utc>,
        /// Taken after the window closed, acknowledged by the user.
        #[serde(default)]
        override_window: bool,
    },
    SkipDose {
        at: DateTime<Utc>,
    },
    Snooze {
        at: DateTime<Utc>,
        minutes: u32,
    },
    /// Quick-log event such as "bathroom"; subject to cooldowns.
    LogEvent {
        at: DateTime<Utc>,
        name: String,
    },
    WakeFinal {
        at: DateTime<Utc>,
    },
    CheckIn {
        at: DateTime<Utc>,
    },
}

impl DoseAction {
    pub fn kind(&self) -> &'static str {
        match self {
            DoseAction::TakeDose1 { .. } => "take_dose1",
            DoseAction::TakeDose2 { .. } => "take_dose2",
            DoseAction::SkipDose { .. } => "skip_dose",
            DoseAction::Snooze { .. } => "snooze",
            DoseAction::LogEvent { .. } => "log_event",
            DoseAction::WakeFinal { .. } => "wake_final",
            DoseAction::CheckIn { .. } => "check_in",
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            DoseAction::TakeDose1 { at }
            | DoseAction::TakeDose2 { at, .. }
            | DoseAction::SkipDose { at }
            | DoseAction::Snooze { at, .. }
            | DoseAction::LogEvent { at, .. }
            | DoseAction::WakeFinal { at }
            | DoseAction::CheckIn { at } => *at,
        }
    }

    /// Queue label, e.g. `log_event:bathroom`.
    pub fn label(&self) -> String {
        match self {
            DoseAction::LogEvent { name, .. } => format!("log_event:{name}"),
            other => other.kind().to_string(),
        }
    }

    /// The undo slot entry for this action, if it can be undone.
    pub fn undoable(&self) -> Option<UndoableAction> {
        match self {
            DoseAction::TakeDose1 { .. } => Some(UndoableAction::TakeDose1),
            DoseAction::TakeDose2 { .. } => Some(UndoableAction::TakeDose2),
            DoseAction::SkipDose { .. } => Some(UndoableAction::SkipDose),
            DoseAction::Snooze { minutes, .. } => Some(UndoableAction::Snooze { minutes: *minutes }),
            _ => None,
        }
    }

    /// Rebuild the action behind a committed undo entry.
    pub fn from_undoable(action: &UndoableAction, at: DateTime<Utc>) -> Self {
        match action {
            UndoableAction::TakeDose1 => DoseAction::TakeDose1 { at },
            UndoableAction::TakeDose2 => DoseAction::TakeDose2 {
                at,
                override_window: false,
            },
            UndoableAction::SkipDose => DoseAction::SkipDose { at },
            UndoableAction::Snooze { minutes } => DoseAction::Snooze {
                at,
                minutes: *minutes,
            },
        }
    }

    /// Fold this action into the night's facts.
    pub fn apply_to(&self, facts: &mut DoseFacts) {
        match self {
            DoseAction::TakeDose1 { at } => facts.dose1_at = Some(*at),
            DoseAction::TakeDose2 { at, .. } => facts.dose2_taken_at = Some(*at),
            DoseAction::SkipDose { .. } => facts.dose2_skipped = true,
            DoseAction::Snooze { .. } => facts.snooze_count += 1,
            DoseAction::WakeFinal { at } => facts.wake_final_at = Some(*at),
            DoseAction::CheckIn { .. } => facts.check_in_completed = true,
            DoseAction::LogEvent { .. } => {}
        }
    }

    /// Check the action against the window as it stands at the action's time.
    ///
    /// Returns the evaluated context on success.
    pub fn validate(
        &self,
        facts: &DoseFacts,
        config: &WindowConfig,
    ) -> Result<WindowContext, ValidationError> {
        let ctx = evaluate(facts, config, self.at());
        let refuse = |reason: &str| ValidationError::ActionRefused {
            action: self.kind().to_string(),
            reason: reason.to_string(),
        };

        match self {
            DoseAction::TakeDose1 { .. } => {
                if ctx.phase != WindowPhase::NoDose1 {
                    return Err(refuse("dose 1 already recorded"));
                }
            }
            DoseAction::TakeDose2 {
                override_window, ..
            } => match ctx.phase {
                WindowPhase::Active | WindowPhase::NearClose => {}
                WindowPhase::Closed if *override_window => {}
                WindowPhase::Closed => return Err(refuse("window expired; override required")),
                WindowPhase::BeforeWindow => return Err(refuse("too early")),
                WindowPhase::NoDose1 => return Err(refuse("dose 1 required")),
                WindowPhase::Completed | WindowPhase::Finalizing => {
                    return Err(refuse("session complete"))
                }
            },
            DoseAction::SkipDose { .. } => {
                if let crate::window::SkipAction::Disabled { reason } = &ctx.skip {
                    return Err(refuse(reason));
                }
            }
            DoseAction::Snooze { .. } => {
                if let crate::window::SnoozeAction::Disabled { reason } = &ctx.snooze {
                    return Err(refuse(reason));
                }
            }
            DoseAction::WakeFinal { .. } => {
                if facts.wake_final_at.is_some() {
                    return Err(refuse("wake already recorded"));
                }
            }
            DoseAction::CheckIn { .. } => {
                if ctx.phase != WindowPhase::Finalizing {
                    return Err(refuse("no check-in pending"));
                }
            }
            DoseAction::LogEvent { .. } => {}
        }
        Ok(ctx)
    }
}
