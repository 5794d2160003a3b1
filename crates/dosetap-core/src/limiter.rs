//! Per-event cooldown limiter.
//!
//! Guards against accidental double taps on quick-log buttons. Each event
//! name has a static cooldown; an occurrence inside the cooldown of the last
//! accepted one is rejected and leaves the stored acceptance untouched.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Quick-log events and their cooldown in seconds. Zero means unlimited.
pub const DEFAULT_COOLDOWNS: [(&str, u64); 13] = [
    ("bathroom", 60),
    ("water", 60),
    ("snack", 60),
    ("lights_out", 0),
    ("in_bed", 0),
    ("brief_wake", 0),
    ("anxiety", 0),
    ("dream", 0),
    ("heart_racing", 0),
    ("noise", 0),
    ("temperature", 0),
    ("pain", 0),
    ("wake_final", 0),
];

/// Longest accepted cooldown. Larger values are clamped.
pub const MAX_COOLDOWN_SECS: u64 = 24 * 60 * 60;

/// Default cooldown table as an owned map.
pub fn default_cooldowns() -> HashMap<String, u64> {
    DEFAULT_COOLDOWNS
        .iter()
        .map(|(name, secs)| ((*name).to_string(), *secs))
        .collect()
}

/// Serialized cooldown registry.
///
/// All operations take the same lock, so concurrent callers observe them as
/// atomic.
#[derive(Debug)]
pub struct RateLimiter {
    cooldowns: HashMap<String, Duration>,
    last_accepted: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RateLimiter {
    /// Build from an event name -> cooldown seconds table.
    ///
    /// Cooldowns above [`MAX_COOLDOWN_SECS`] are clamped to it.
    pub fn new(cooldowns: &HashMap<String, u64>) -> Self {
        let cooldowns = cooldowns
            .iter()
            .filter(|(_, secs)| **secs > 0)
            .map(|(name, secs)| {
                if *secs > MAX_COOLDOWN_SECS {
                    tracing::warn!(event = %name, secs, "cooldown too long, clamping");
                }
                let secs = i64::try_from((*secs).min(MAX_COOLDOWN_SECS)).unwrap_or(0);
                (name.clone(), Duration::seconds(secs))
            })
            .collect();
        Self {
            cooldowns,
            last_accepted: Mutex::new(HashMap::new()),
        }
    }

    /// Configured cooldown for `event`, if any.
    pub fn cooldown(&self, event: &str) -> Option<Duration> {
        self.cooldowns.get(event).copied()
    }

    /// Accept `event` at `at` unless it falls inside its cooldown.
    ///
    /// Accepting records `at`; rejecting records nothing.
    pub fn should_allow(&self, event: &str, at: DateTime<Utc>) -> bool {
        let mut last = self.lock();
        if !Self::passes(self.cooldown(event), last.get(event).copied(), at) {
            tracing::debug!(event, %at, "event rejected by cooldown");
            return false;
        }
        if self.cooldowns.contains_key(event) {
            last.insert(event.to_string(), at);
        }
        true
    }

    /// Same gate as [`should_allow`](Self::should_allow) without recording.
    pub fn can_log(&self, event: &str, at: DateTime<Utc>) -> bool {
        let last = self.lock();
        Self::passes(self.cooldown(event), last.get(event).copied(), at)
    }

    /// Time left before `event` would be accepted at `at`. Zero when free.
    pub fn remaining_cooldown(&self, event: &str, at: DateTime<Utc>) -> Duration {
        let last = self.lock();
        match (self.cooldown(event), last.get(event)) {
            (Some(cooldown), Some(prior)) => (cooldown - (at - *prior)).max(Duration::zero()),
            _ => Duration::zero(),
        }
    }

    /// Record an acceptance without gating, e.g. when seeding from history.
    pub fn register(&self, event: &str, at: DateTime<Utc>) {
        self.lock().insert(event.to_string(), at);
    }

    /// Last accepted instant for `event`.
    pub fn last_accepted(&self, event: &str) -> Option<DateTime<Utc>> {
        self.lock().get(event).copied()
    }

    pub fn reset(&self, event: &str) {
        self.lock().remove(event);
    }

    pub fn reset_all(&self) {
        self.lock().clear();
    }

    fn passes(
        cooldown: Option<Duration>,
        prior: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> bool {
        match (cooldown, prior) {
            (Some(cooldown), Some(prior)) => at - prior >= cooldown,
            _ => true,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&default_cooldowns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 26, 2, 0, 0).unwrap()
    }

    #[test]
    fn rejection_keeps_first_acceptance() {
        let limiter = RateLimiter::default();
        assert!(limiter.should_allow("bathroom", t0()));
        assert!(!limiter.should_allow("bathroom", t0() + Duration::seconds(30)));
        assert_eq!(limiter.last_accepted("bathroom"), Some(t0()));
    }

    #[test]
    fn accepts_again_once_cooldown_elapsed() {
        let limiter = RateLimiter::default();
        assert!(limiter.should_allow("bathroom", t0()));
        assert!(limiter.should_allow("bathroom", t0() + Duration::seconds(60)));
        assert_eq!(
            limiter.last_accepted("bathroom"),
            Some(t0() + Duration::seconds(60))
        );
    }

    #[test]
    fn zero_and_unknown_events_are_unlimited() {
        let limiter = RateLimiter::default();
        assert!(limiter.should_allow("dream", t0()));
        assert!(limiter.should_allow("dream", t0()));
        assert!(limiter.should_allow("not_configured", t0()));
        assert!(limiter.should_allow("not_configured", t0()));
        assert_eq!(limiter.remaining_cooldown("dream", t0()), Duration::zero());
    }

    #[test]
    fn can_log_never_mutates() {
        let limiter = RateLimiter::default();
        assert!(limiter.can_log("water", t0()));
        assert!(limiter.can_log("water", t0()));
        assert!(limiter.last_accepted("water").is_none());

        limiter.should_allow("water", t0());
        assert!(!limiter.can_log("water", t0() + Duration::seconds(59)));
        assert_eq!(limiter.last_accepted("water"), Some(t0()));
    }

    #[test]
    fn remaining_cooldown_counts_down() {
        let limiter = RateLimiter::default();
        limiter.should_allow("snack", t0());
        assert_eq!(
            limiter.remaining_cooldown("snack", t0() + Duration::seconds(20)),
            Duration::seconds(40)
        );
        assert_eq!(
            limiter.remaining_cooldown("snack", t0() + Duration::seconds(90)),
            Duration::zero()
        );
    }

    #[test]
    fn register_seeds_without_gating() {
        let limiter = RateLimiter::default();
        limiter.register("bathroom", t0());
        assert!(!limiter.should_allow("bathroom", t0() + Duration::seconds(10)));

        limiter.register("bathroom", t0() + Duration::seconds(10));
        assert_eq!(
            limiter.last_accepted("bathroom"),
            Some(t0() + Duration::seconds(10))
        );
    }

    #[test]
    fn reset_clears_one_or_all() {
        let limiter = RateLimiter::default();
        limiter.should_allow("bathroom", t0());
        limiter.should_allow("water", t0());

        limiter.reset("bathroom");
        assert!(limiter.should_allow("bathroom", t0()));
        assert!(!limiter.should_allow("water", t0()));

        limiter.reset_all();
        assert!(limiter.should_allow("water", t0()));
    }

    #[test]
    fn concurrent_taps_accept_exactly_once() {
        let limiter = Arc::new(RateLimiter::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.should_allow("bathroom", t0()))
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(accepted, 1);
    }

    #[test]
    fn oversized_cooldown_is_clamped() {
        let table = HashMap::from([
            ("bathroom".to_string(), 10_000_000_000_000_000),
            ("water".to_string(), u64::MAX),
        ]);
        let limiter = RateLimiter::new(&table);
        let day = Duration::seconds(86_400);
        assert_eq!(limiter.cooldown("bathroom"), Some(day));
        assert_eq!(limiter.cooldown("water"), Some(day));

        assert!(limiter.should_allow("water", t0()));
        assert!(!limiter.should_allow("water", t0() + Duration::hours(23)));
        assert!(limiter.should_allow("water", t0() + day));
    }

    #[test]
    fn default_table_has_thirteen_events() {
        let table = default_cooldowns();
        assert_eq!(table.len(), 13);
        assert_eq!(table.values().filter(|s| **s == 60).count(), 3);
    }
}
