//! Snooze planning on top of the window engine.
//!
//! A snooze moves the Dose 2 reminder forward by one snooze step. It is only
//! granted while the engine reports snooze as enabled and the pushed reminder
//! still lands before the window closes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::config::WindowConfig;
use super::engine::{evaluate, DoseFacts, SnoozeAction};

/// Why a snooze request was turned down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnoozeRejection {
    /// The engine has snooze disabled for the current phase.
    Unavailable { reason: String },
    /// The pushed reminder would fire at or after window close.
    PastWindowClose { closes_at: DateTime<Utc> },
}

impl std::fmt::Display for SnoozeRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnoozeRejection::Unavailable { reason } => write!(f, "snooze unavailable: {reason}"),
            SnoozeRejection::PastWindowClose { closes_at } => {
                write!(f, "snooze would pass window close at {}", closes_at.to_rfc3339())
            }
        }
    }
}

impl std::error::Error for SnoozeRejection {}

/// A granted snooze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozePlan {
    pub remind_at: DateTime<Utc>,
    pub snooze_count: u32,
    pub snoozes_left: u32,
}

/// Reminder instant for an unsnoozed night.
pub fn target_at(dose1_at: DateTime<Utc>, config: &WindowConfig) -> DateTime<Utc> {
    dose1_at + Duration::seconds(config.target_secs())
}

/// Instant the window closes.
pub fn closes_at(dose1_at: DateTime<Utc>, config: &WindowConfig) -> DateTime<Utc> {
    dose1_at + Duration::seconds(config.max_interval_secs())
}

/// Plan one more snooze at `now`.
pub fn plan_snooze(
    facts: &DoseFacts,
    config: &WindowConfig,
    now: DateTime<Utc>,
) -> Result<SnoozePlan, SnoozeRejection> {
    let ctx = evaluate(facts, config, now);
    if let SnoozeAction::Disabled { reason } = ctx.snooze {
        return Err(SnoozeRejection::Unavailable { reason });
    }

    // An enabled snooze implies dose 1 is set.
    let Some(dose1_at) = facts.dose1_at else {
        return Err(SnoozeRejection::Unavailable {
            reason: "dose 1 required".to_string(),
        });
    };

    let remind_at = now + Duration::seconds(config.snooze_step_secs());
    let closes = closes_at(dose1_at, config);
    if remind_at >= closes {
        return Err(SnoozeRejection::PastWindowClose { closes_at: closes });
    }

    let snooze_count = facts.snooze_count + 1;
    Ok(SnoozePlan {
        remind_at,
        snooze_count,
        snoozes_left: config.max_snoozes.saturating_sub(snooze_count),
    })
}
