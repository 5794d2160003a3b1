//! In-memory retry queue for actions whose remote delivery failed.
//!
//! Tasks are opaque closures supplied by the caller. The queue knows nothing
//! about the network beyond the [`Connectivity`] probe consulted at the start
//! of a flush.
//!
//! Ordering: FIFO for tasks that never failed. A failed task is re-appended
//! at the tail after its backoff, so it gives up its position to everything
//! enqueued behind it.
//!
//! A task leaves the queue only by succeeding or by exhausting its attempts.
//! If a flush future is dropped while a task is running or backing off, the
//! task goes back to the head of the queue.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connectivity::Connectivity;
use crate::error::TransportError;

/// Upper bound on a single backoff delay.
pub const MAX_BACKOFF: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// Largest accepted `backoff_base`.
pub const MAX_BACKOFF_BASE: f64 = 60.0;

pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send>>;
type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Total execution attempts before a task is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay after the n-th failed attempt is `backoff_base^n` seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base() -> f64 {
    2.0
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
        }
    }
}

impl QueueConfig {
    /// Backoff after `attempts` failed executions, capped at [`MAX_BACKOFF`].
    pub fn backoff_for(&self, attempts: u32) -> std::time::Duration {
        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let secs = self.backoff_base.powi(exponent);
        if secs.is_nan() || secs <= 0.0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}

/// A queued unit of remote work.
#[derive(Clone)]
pub struct QueuedTask {
    pub id: Uuid,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    execute: TaskFn,
}

impl QueuedTask {
    pub fn new<F, Fut>(label: impl Into<String>, created_at: DateTime<Utc>, execute: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TransportError>> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            created_at,
            attempts: 0,
            execute: Arc::new(move || Box::pin(execute()) as TaskFuture),
        }
    }

    pub fn info(&self) -> QueuedTaskInfo {
        QueuedTaskInfo {
            id: self.id,
            label: self.label.clone(),
            created_at: self.created_at,
            attempts: self.attempts,
        }
    }

    fn run(&self) -> TaskFuture {
        (self.execute)()
    }
}

impl fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedTask")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("created_at", &self.created_at)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a queued task without its closure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTaskInfo {
    pub id: Uuid,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
}

/// A task dropped after exhausting its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedTask {
    pub task: QueuedTaskInfo,
    pub last_error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushStatus {
    /// Queue drained.
    Completed,
    /// Offline at flush start; queue untouched.
    Offline,
    /// Another flush loop owns the queue.
    AlreadyRunning,
}

/// Outcome of one flush. Logging drops is left to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushReport {
    pub status: FlushStatus,
    pub delivered: Vec<QueuedTaskInfo>,
    pub retried: u32,
    pub dropped: Vec<DroppedTask>,
}

impl FlushReport {
    fn empty(status: FlushStatus) -> Self {
        Self {
            status,
            delivered: Vec::new(),
            retried: 0,
            dropped: Vec::new(),
        }
    }
}

/// Serialized FIFO retry queue.
///
/// The task list lock is never held across an await point; only one flush
/// loop runs at a time.
#[derive(Debug)]
pub struct ActionQueue {
    config: QueueConfig,
    connectivity: Arc<dyn Connectivity>,
    tasks: Mutex<VecDeque<QueuedTask>>,
    flushing: AtomicBool,
}

impl ActionQueue {
    pub fn new(config: QueueConfig, connectivity: Arc<dyn Connectivity>) -> Self {
        Self {
            config,
            connectivity,
            tasks: Mutex::new(VecDeque::new()),
            flushing: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn enqueue(&self, task: QueuedTask) {
        self.lock().push_back(task);
    }

    pub fn pending(&self) -> Vec<QueuedTaskInfo> {
        self.lock().iter().map(QueuedTask::info).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drain the queue, retrying failures with exponential backoff.
    pub async fn flush(&self) -> FlushReport {
        if !self.connectivity.is_online() {
            return FlushReport::empty(FlushStatus::Offline);
        }
        if self.flushing.swap(true, Ordering::AcqRel) {
            return FlushReport::empty(FlushStatus::AlreadyRunning);
        }
        let _running = FlushGuard(&self.flushing);

        let mut report = FlushReport::empty(FlushStatus::Completed);
        loop {
            let Some(task) = self.lock().pop_front() else {
                break;
            };
            let running = task.run();
            let mut in_flight = InFlight {
                queue: self,
                task: Some(task),
            };
            let result = running.await;

            let Some(mut task) = in_flight.task.take() else {
                break;
            };
            task.attempts += 1;
            match result {
                Ok(()) => report.delivered.push(task.info()),
                Err(_) if task.attempts < self.config.max_retries => {
                    let backoff = self.config.backoff_for(task.attempts);
                    in_flight.task = Some(task);
                    tokio::time::sleep(backoff).await;
                    report.retried += 1;
                    if let Some(task) = in_flight.task.take() {
                        self.lock().push_back(task);
                    }
                }
                Err(err) => report.dropped.push(DroppedTask {
                    task: task.info(),
                    last_error: err.to_string(),
                }),
            }
        }
        report
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the task being worked on; returns it to the head of the queue if
/// the flush is cancelled before the task settles.
struct InFlight<'a> {
    queue: &'a ActionQueue,
    task: Option<QueuedTask>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            tracing::debug!(label = %task.label, attempts = task.attempts, "flush cancelled, requeueing in-flight task");
            self.queue.lock().push_front(task);
        }
    }
}

struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
