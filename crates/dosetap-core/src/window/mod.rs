mod config;
mod engine;
mod snooze;

pub use config::WindowConfig;
pub use engine::{
    evaluate, DoseFacts, PrimaryAction, SkipAction, SnoozeAction, WindowContext, WindowEngine,
    WindowError, WindowPhase,
};
pub use snooze::{closes_at, plan_snooze, target_at, SnoozePlan, SnoozeRejection};
