//! # DoseTap Core Library
//!
//! This library provides the core logic for DoseTap, a companion for
//! two-dose overnight medication. All operations are available through the
//! standalone `dosetap` CLI, which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Window Engine**: A pure function from dose facts, thresholds and an
//!   instant to the current phase and the actions allowed in it
//! - **Session Identity**: Maps instants to the night they belong to, with a
//!   configurable local rollover hour
//! - **Offline Queue**: Retries failed remote deliveries with exponential
//!   backoff once connectivity returns
//! - **Undo**: A few-second window to reverse the last dose action
//! - **Storage**: SQLite-based session storage and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`WindowEngine`]: Dose 2 window evaluation
//! - [`SessionRules`]: Session keys and rollover instants
//! - [`DosingFacade`]: Rate limiting, delivery and queue fallback
//! - [`UndoCoordinator`]: Pending-action slot with timed commit
//! - [`Database`]: Session persistence
//! - [`Config`]: Application configuration management

pub mod actions;
pub mod clock;
pub mod error;
pub mod facade;
pub mod limiter;
pub mod queue;
pub mod session;
pub mod storage;
pub mod transport;
pub mod undo;
pub mod window;

pub use actions::DoseAction;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, TransportError, ValidationError};
pub use facade::{DosingFacade, PerformOutcome};
pub use limiter::RateLimiter;
pub use queue::{ActionQueue, Connectivity, FlushReport, FlushStatus, QueueConfig, QueuedTask};
pub use session::{RolloverHour, SessionRules};
pub use storage::{Config, Database};
pub use transport::{DoseTransport, HttpTransport, LocalOnly, RemoteConfig};
pub use undo::{UndoConfig, UndoCoordinator, UndoOutcome, UndoableAction};
pub use window::{DoseFacts, WindowConfig, WindowContext, WindowEngine, WindowPhase};
