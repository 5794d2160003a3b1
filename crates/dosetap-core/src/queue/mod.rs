//! Offline action queue.

pub mod action_queue;
pub mod connectivity;

#[cfg(test)]
mod action_queue_tests;

pub use action_queue::{
    ActionQueue, DroppedTask, FlushReport, FlushStatus, QueueConfig, QueuedTask, QueuedTaskInfo,
    TaskFuture, MAX_BACKOFF, MAX_BACKOFF_BASE,
};
pub use connectivity::{AlwaysOnline, Connectivity, ConnectivityFlag};
