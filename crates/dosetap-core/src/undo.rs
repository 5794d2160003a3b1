//! Short-window undo for dose actions.
//!
//! A just-performed action sits in a single pending slot for a few seconds.
//! Within that window the user can reverse it; afterwards, or when another
//! action replaces it, it is committed. The coordinator does no I/O itself:
//! persistence and notifications hang off the `on_commit` / `on_undo` hooks.
//!
//! Each registration owns a generation number. The countdown task only
//! commits if its generation is still the pending one, and it is aborted
//! whenever the slot is replaced or resolved, so a stale timer cannot
//! commit twice.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndoableAction {
    TakeDose1,
    TakeDose2,
    SkipDose,
    Snooze { minutes: u32 },
}

impl UndoableAction {
    /// Short text for an undo banner.
    pub fn describe(&self) -> String {
        match self {
            UndoableAction::TakeDose1 => "Dose 1 taken".to_string(),
            UndoableAction::TakeDose2 => "Dose 2 taken".to_string(),
            UndoableAction::SkipDose => "Dose 2 skipped".to_string(),
            UndoableAction::Snooze { minutes } => format!("Snoozed {minutes} min"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    Success(UndoableAction),
    /// Window already elapsed; the action was committed instead.
    Expired,
    NoAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

/// Longest accepted undo window. Larger values are clamped.
pub const MAX_UNDO_WINDOW_SECS: u64 = 24 * 60 * 60;

fn default_window_secs() -> u64 {
    5
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
        }
    }
}

pub type UndoCallback = Arc<dyn Fn(&UndoableAction) + Send + Sync>;

struct Pending {
    action: UndoableAction,
    registered_at: DateTime<Utc>,
    generation: u64,
}

#[derive(Default)]
struct UndoState {
    pending: Option<Pending>,
    countdown: Option<JoinHandle<()>>,
    generation: u64,
}

struct Inner {
    window: Duration,
    clock: Arc<dyn Clock>,
    on_commit: UndoCallback,
    on_undo: UndoCallback,
    state: Mutex<UndoState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, UndoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Countdown expiry for `generation`.
    fn expire(&self, generation: u64) {
        let action = {
            let mut state = self.lock();
            match &state.pending {
                Some(p) if p.generation == generation => {
                    state.countdown = None;
                    state.pending.take().map(|p| p.action)
                }
                _ => None,
            }
        };
        if let Some(action) = action {
            tracing::info!(action = %action.describe(), "undo window elapsed, committing");
            (self.on_commit)(&action);
        }
    }
}

/// Single-slot undo register with timeout-driven auto-commit.
#[derive(Clone)]
pub struct UndoCoordinator {
    inner: Arc<Inner>,
}

impl UndoCoordinator {
    pub fn new(
        config: UndoConfig,
        clock: Arc<dyn Clock>,
        on_commit: UndoCallback,
        on_undo: UndoCallback,
    ) -> Self {
        if config.window_secs > MAX_UNDO_WINDOW_SECS {
            tracing::warn!(secs = config.window_secs, "undo window too long, clamping");
        }
        let secs = i64::try_from(config.window_secs.min(MAX_UNDO_WINDOW_SECS)).unwrap_or(0);
        Self {
            inner: Arc::new(Inner {
                window: Duration::seconds(secs),
                clock,
                on_commit,
                on_undo,
                state: Mutex::new(UndoState::default()),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Make `action` the pending one and start its countdown.
    ///
    /// A different action already pending is committed first. Re-registering
    /// the same action only restarts the window.
    ///
    /// Returns the undo window granted to the new action. Outside a Tokio
    /// runtime no countdown can run, so the action is committed at once and
    /// the granted window is zero.
    pub fn register(&self, action: UndoableAction) -> std::time::Duration {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(action = %action.describe(), "no runtime for undo countdown, committing immediately");
            let prior = {
                let mut state = self.inner.lock();
                if let Some(countdown) = state.countdown.take() {
                    countdown.abort();
                }
                state.generation += 1;
                state.pending.take()
            };
            if let Some(prior) = prior {
                if prior.action != action {
                    (self.inner.on_commit)(&prior.action);
                }
            }
            (self.inner.on_commit)(&action);
            return std::time::Duration::ZERO;
        };

        let window = self.inner.window;
        let prior = {
            let mut state = self.inner.lock();
            if let Some(countdown) = state.countdown.take() {
                countdown.abort();
            }
            state.generation += 1;
            let generation = state.generation;
            let prior = state.pending.replace(Pending {
                action: action.clone(),
                registered_at: self.inner.clock.now(),
                generation,
            });

            let inner = Arc::clone(&self.inner);
            let sleep_for = window.to_std().unwrap_or_default();
            state.countdown = Some(runtime.spawn(async move {
                tokio::time::sleep(sleep_for).await;
                inner.expire(generation);
            }));
            prior
        };

        if let Some(prior) = prior {
            if prior.action != action {
                tracing::info!(action = %prior.action.describe(), "replaced before undo window elapsed, committing");
                (self.inner.on_commit)(&prior.action);
            }
        }
        window.to_std().unwrap_or_default()
    }

    /// Reverse the pending action if its window is still open.
    pub fn undo(&self) -> UndoOutcome {
        let now = self.inner.clock.now();
        let (action, expired) = {
            let mut state = self.inner.lock();
            let Some(pending) = state.pending.take() else {
                return UndoOutcome::NoAction;
            };
            if let Some(countdown) = state.countdown.take() {
                countdown.abort();
            }
            let expired = now - pending.registered_at > self.inner.window;
            (pending.action, expired)
        };

        if expired {
            tracing::info!(action = %action.describe(), "undo requested too late, committing");
            (self.inner.on_commit)(&action);
            UndoOutcome::Expired
        } else {
            tracing::info!(action = %action.describe(), "action undone");
            (self.inner.on_undo)(&action);
            UndoOutcome::Success(action)
        }
    }

    /// Commit the pending action now, e.g. when the app goes to background.
    pub fn commit_pending(&self) -> Option<UndoableAction> {
        let action = {
            let mut state = self.inner.lock();
            if let Some(countdown) = state.countdown.take() {
                countdown.abort();
            }
            state.pending.take().map(|p| p.action)
        };
        if let Some(action) = &action {
            (self.inner.on_commit)(action);
        }
        action
    }

    pub fn can_undo(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .lock()
            .pending
            .as_ref()
            .is_some_and(|p| now - p.registered_at <= self.inner.window)
    }

    /// Time left in the current window. Zero when nothing is pending.
    pub fn remaining_time(&self) -> Duration {
        let now = self.inner.clock.now();
        match &self.inner.lock().pending {
            Some(p) => (self.inner.window - (now - p.registered_at)).max(Duration::zero()),
            None => Duration::zero(),
        }
    }

    pub fn pending(&self) -> Option<UndoableAction> {
        self.inner.lock().pending.as_ref().map(|p| p.action.clone())
    }
}

impl std::fmt::Debug for UndoCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoCoordinator")
            .field("window", &self.inner.window)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
