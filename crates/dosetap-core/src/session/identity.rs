//! Session identity: which dosing night an instant belongs to.
//!
//! A night runs from the rollover hour on one local day to the rollover hour
//! on the next, and is named after the day it started on.
//!
//! Two keys exist and they intentionally disagree before the rollover hour:
//!
//! - [`session_key`] assigns a pre-rollover instant to the night that is
//!   still running (yesterday's date).
//! - [`pre_sleep_key`] assigns it to the night that is about to begin
//!   (today's date), since pre-sleep entries describe the coming night.
//!
//! The two are reconciled by a single rule: `pre_sleep_key(t)` always equals
//! `session_key` of the next session to start at or after `t`, i.e.
//! `session_key(next_rollover(t))` before the rollover hour and
//! `session_key(t)` after it.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const KEY_FORMAT: &str = "%Y-%m-%d";

/// Local hour (0..=23) at which one night ends and the next begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RolloverHour(u32);

impl RolloverHour {
    pub const DEFAULT: RolloverHour = RolloverHour(18);

    pub fn new(hour: u32) -> Result<Self, ValidationError> {
        if hour > 23 {
            return Err(ValidationError::RolloverHour(hour));
        }
        Ok(Self(hour))
    }

    pub fn hour(self) -> u32 {
        self.0
    }
}

impl Default for RolloverHour {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for RolloverHour {
    type Error = ValidationError;

    fn try_from(hour: u32) -> Result<Self, Self::Error> {
        Self::new(hour)
    }
}

impl From<RolloverHour> for u32 {
    fn from(hour: RolloverHour) -> Self {
        hour.0
    }
}

/// Parse an IANA timezone identifier.
pub fn parse_timezone(name: &str) -> Result<Tz, ValidationError> {
    name.parse::<Tz>()
        .map_err(|_| ValidationError::Timezone(name.to_string()))
}

/// Canonical "YYYY-MM-DD" key of the night containing `instant`.
pub fn session_key(instant: DateTime<Utc>, tz: Tz, rollover: RolloverHour) -> String {
    let local = instant.with_timezone(&tz);
    let date = if local.hour() < rollover.hour() {
        local.date_naive() - Duration::days(1)
    } else {
        local.date_naive()
    };
    date.format(KEY_FORMAT).to_string()
}

/// Key shown for "tonight". Same rule as [`session_key`].
pub fn tonight_key(instant: DateTime<Utc>, tz: Tz, rollover: RolloverHour) -> String {
    session_key(instant, tz, rollover)
}

/// Key for pre-sleep entries: the local date, never shifted back.
pub fn pre_sleep_key(instant: DateTime<Utc>, tz: Tz, _rollover: RolloverHour) -> String {
    instant
        .with_timezone(&tz)
        .date_naive()
        .format(KEY_FORMAT)
        .to_string()
}

/// First rollover instant strictly after `after`.
pub fn next_rollover(after: DateTime<Utc>, tz: Tz, rollover: RolloverHour) -> DateTime<Utc> {
    let today = after.with_timezone(&tz).date_naive();
    let candidate = rollover_on(today, tz, rollover);
    if candidate > after {
        return candidate;
    }
    let tomorrow = today + Duration::days(1);
    rollover_on(tomorrow, tz, rollover)
}

/// Rollover instant on a local date.
///
/// Ambiguous wall times (fall back) resolve to the earlier instant. Wall
/// times inside a spring-forward gap move to the first valid half hour.
fn rollover_on(date: NaiveDate, tz: Tz, rollover: RolloverHour) -> DateTime<Utc> {
    let wall = date
        .and_hms_opt(rollover.hour(), 0, 0)
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN));

    for step in 0..=4 {
        let shifted = wall + Duration::minutes(30 * step);
        match tz.from_local_datetime(&shifted) {
            LocalResult::Single(t) => return t.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => continue,
        }
    }
    tz.from_utc_datetime(&wall).with_timezone(&Utc)
}

/// Timezone and rollover hour bundled for callers that hold configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRules {
    pub timezone: Tz,
    pub rollover: RolloverHour,
}

impl SessionRules {
    pub fn new(timezone: Tz, rollover: RolloverHour) -> Self {
        Self { timezone, rollover }
    }

    /// Build from configuration strings.
    pub fn parse(timezone: &str, rollover_hour: u32) -> Result<Self, ValidationError> {
        Ok(Self {
            timezone: parse_timezone(timezone)?,
            rollover: RolloverHour::new(rollover_hour)?,
        })
    }

    pub fn key_for(&self, instant: DateTime<Utc>) -> String {
        session_key(instant, self.timezone, self.rollover)
    }

    pub fn pre_sleep_key_for(&self, instant: DateTime<Utc>) -> String {
        pre_sleep_key(instant, self.timezone, self.rollover)
    }

    pub fn next_rollover_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        next_rollover(after, self.timezone, self.rollover)
    }
}
