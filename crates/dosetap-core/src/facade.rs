//! Dosing facade: rate-limit, deliver, and fall back to the offline queue.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actions::DoseAction;
use crate::clock::Clock;
use crate::limiter::RateLimiter;
use crate::queue::{ActionQueue, FlushReport, QueuedTask};
use crate::transport::DoseTransport;

/// What happened to a performed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformOutcome {
    Delivered,
    /// Remote failed; the action waits in the queue.
    Queued,
    /// Quick-log event inside its cooldown; nothing was sent.
    RateLimited,
}

/// Single entry point for user actions bound for the remote.
pub struct DosingFacade {
    transport: Arc<dyn DoseTransport>,
    limiter: Arc<RateLimiter>,
    queue: Arc<ActionQueue>,
    clock: Arc<dyn Clock>,
}

impl DosingFacade {
    pub fn new(
        transport: Arc<dyn DoseTransport>,
        limiter: Arc<RateLimiter>,
        queue: Arc<ActionQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            limiter,
            queue,
            clock,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub async fn perform(&self, action: DoseAction) -> PerformOutcome {
        if let DoseAction::LogEvent { name, at } = &action {
            if !self.limiter.should_allow(name, *at) {
                debug!(event = %name, "quick-log dropped by cooldown");
                return PerformOutcome::RateLimited;
            }
        }

        match self.transport.deliver(&action).await {
            Ok(()) => {
                info!(kind = action.kind(), at = %action.at(), "action delivered");
                PerformOutcome::Delivered
            }
            Err(err) => {
                warn!(kind = action.kind(), error = %err, "delivery failed, queueing");
                self.queue.enqueue(self.task_for(action));
                PerformOutcome::Queued
            }
        }
    }

    /// Retry everything queued. Dropped tasks are logged here.
    pub async fn flush_pending(&self) -> FlushReport {
        let report = self.queue.flush().await;
        for dropped in &report.dropped {
            warn!(
                label = %dropped.task.label,
                attempts = dropped.task.attempts,
                error = %dropped.last_error,
                "queued action dropped after retries"
            );
        }
        if !report.delivered.is_empty() {
            info!(count = report.delivered.len(), "queued actions delivered");
        }
        report
    }

    fn task_for(&self, action: DoseAction) -> QueuedTask {
        let transport = Arc::clone(&self.transport);
        let action = Arc::new(action);
        QueuedTask::new(action.label(), self.clock.now(), move || {
            let transport = Arc::clone(&transport);
            let action = Arc::clone(&action);
            async move { transport.deliver(&action).await }
        })
    }
}

impl std::fmt::Debug for DosingFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DosingFacade")
            .field("limiter", &self.limiter)
            .field("queue", &self.queue)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TransportError;
    use crate::queue::{AlwaysOnline, FlushStatus, QueueConfig};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Fails the first `failures` deliveries and records successful kinds.
    #[derive(Default)]
    struct MockTransport {
        failures: u32,
        calls: AtomicU32,
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DoseTransport for MockTransport {
        async fn deliver(&self, action: &DoseAction) -> Result<(), TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                return Err(TransportError::Network("offline".into()));
            }
            self.delivered.lock().unwrap().push(action.label());
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 26, 1, 0, 0).unwrap()
    }

    fn facade(transport: Arc<MockTransport>) -> DosingFacade {
        DosingFacade::new(
            transport,
            Arc::new(RateLimiter::default()),
            Arc::new(ActionQueue::new(QueueConfig::default(), Arc::new(AlwaysOnline))),
            Arc::new(ManualClock::new(t0())),
        )
    }

    fn bathroom(at: DateTime<Utc>) -> DoseAction {
        DoseAction::LogEvent {
            at,
            name: "bathroom".into(),
        }
    }

    #[tokio::test]
    async fn success_is_not_queued() {
        let transport = Arc::new(MockTransport::default());
        let facade = facade(transport.clone());

        let outcome = facade.perform(DoseAction::TakeDose1 { at: t0() }).await;

        assert_eq!(outcome, PerformOutcome::Delivered);
        assert!(facade.queue().is_empty());
        assert_eq!(*transport.delivered.lock().unwrap(), vec!["take_dose1"]);
    }

    #[tokio::test]
    async fn cooldown_drops_second_tap_without_sending() {
        let transport = Arc::new(MockTransport::default());
        let facade = facade(transport.clone());

        assert_eq!(facade.perform(bathroom(t0())).await, PerformOutcome::Delivered);
        assert_eq!(
            facade.perform(bathroom(t0() + Duration::seconds(30))).await,
            PerformOutcome::RateLimited
        );
        assert_eq!(
            facade.perform(bathroom(t0() + Duration::seconds(60))).await,
            PerformOutcome::Delivered
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_queues_then_flush_delivers() {
        let transport = Arc::new(MockTransport {
            failures: 1,
            ..Default::default()
        });
        let facade = facade(transport.clone());

        let outcome = facade
            .perform(DoseAction::TakeDose2 {
                at: t0(),
                override_window: false,
            })
            .await;
        assert_eq!(outcome, PerformOutcome::Queued);

        let pending = facade.queue().pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].label, "take_dose2");
        assert_eq!(pending[0].created_at, t0());

        let report = facade.flush_pending().await;
        assert_eq!(report.status, FlushStatus::Completed);
        assert_eq!(report.delivered.len(), 1);
        assert!(facade.queue().is_empty());
        assert_eq!(*transport.delivered.lock().unwrap(), vec!["take_dose2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_quick_log_is_not_queued() {
        let transport = Arc::new(MockTransport {
            failures: u32::MAX,
            ..Default::default()
        });
        let facade = facade(transport.clone());

        assert_eq!(facade.perform(bathroom(t0())).await, PerformOutcome::Queued);
        assert_eq!(
            facade.perform(bathroom(t0() + Duration::seconds(1))).await,
            PerformOutcome::RateLimited
        );
        assert_eq!(facade.queue().len(), 1);
    }
}
