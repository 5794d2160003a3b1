//! Tests for action_queue module.

#[cfg(test)]
mod tests {
    use super::super::action_queue::*;
    use super::super::connectivity::{AlwaysOnline, ConnectivityFlag};
    use crate::error::TransportError;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn created() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 26, 2, 0, 0).unwrap()
    }

    /// Task that fails its first `failures` executions and logs each run.
    fn flaky_task(
        label: &str,
        failures: u32,
        calls: Arc<AtomicU32>,
        log: Arc<Mutex<Vec<String>>>,
    ) -> QueuedTask {
        let name = label.to_string();
        QueuedTask::new(label, created(), move || {
            let calls = Arc::clone(&calls);
            let log = Arc::clone(&log);
            let name = name.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                log.lock().unwrap().push(name);
                if n <= failures {
                    Err(TransportError::Network("connection reset".into()))
                } else {
                    Ok(())
                }
            }
        })
    }

    fn online_queue(max_retries: u32) -> ActionQueue {
        ActionQueue::new(
            QueueConfig {
                max_retries,
                backoff_base: 2.0,
            },
            Arc::new(AlwaysOnline),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_flush_leaves_queue_untouched() {
        let calls = Arc::new(AtomicU32::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = ActionQueue::new(QueueConfig::default(), Arc::new(ConnectivityFlag::new(false)));
        queue.enqueue(flaky_task("a", 0, calls.clone(), log.clone()));
        queue.enqueue(flaky_task("b", 0, calls.clone(), log.clone()));
        let before = queue.pending();

        let report = queue.flush().await;

        assert_eq!(report.status, FlushStatus::Offline);
        assert_eq!(queue.pending(), before);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = online_queue(3);
        queue.enqueue(flaky_task("dose2", 2, calls.clone(), log));

        let report = queue.flush().await;

        assert!(queue.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.retried, 2);
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.delivered[0].attempts, 3);
        assert!(report.dropped.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_task_is_dropped() {
        let calls = Arc::new(AtomicU32::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = online_queue(3);
        queue.enqueue(flaky_task("dose2", u32::MAX, calls.clone(), log));

        let report = queue.flush().await;

        assert!(queue.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].task.attempts, 3);
        assert!(report.dropped[0].last_error.contains("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_costs_queue_position() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = online_queue(3);
        queue.enqueue(flaky_task("a", 1, Arc::new(AtomicU32::new(0)), log.clone()));
        queue.enqueue(flaky_task("b", 0, Arc::new(AtomicU32::new(0)), log.clone()));
        queue.enqueue(flaky_task("c", 0, Arc::new(AtomicU32::new(0)), log.clone()));

        queue.flush().await;

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_exponentially() {
        let calls = Arc::new(AtomicU32::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = online_queue(3);
        queue.enqueue(flaky_task("dose2", 2, calls, log));

        let started = tokio::time::Instant::now();
        queue.flush().await;
        let waited = started.elapsed();

        // 2^1 after the first failure, 2^2 after the second.
        assert!(waited >= Duration::from_secs(6), "waited {waited:?}");
        assert!(waited < Duration::from_secs(7), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_flush_loop_runs() {
        let calls = Arc::new(AtomicU32::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = online_queue(3);
        queue.enqueue(flaky_task("dose2", 1, calls.clone(), log));

        let (first, second) = tokio::join!(queue.flush(), queue.flush());

        assert_eq!(first.status, FlushStatus::Completed);
        assert_eq!(second.status, FlushStatus::AlreadyRunning);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_after_reconnect() {
        let calls = Arc::new(AtomicU32::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let link = Arc::new(ConnectivityFlag::new(false));
        let queue = ActionQueue::new(QueueConfig::default(), link.clone());
        queue.enqueue(flaky_task("dose1", 0, calls.clone(), log));

        assert_eq!(queue.flush().await.status, FlushStatus::Offline);
        assert_eq!(queue.len(), 1);

        link.set_online(true);
        let report = queue.flush().await;
        assert_eq!(report.status, FlushStatus::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_backoff_keeps_task_at_head() {
        let calls = Arc::new(AtomicU32::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = online_queue(3);
        queue.enqueue(flaky_task("dose2", 1, calls.clone(), log.clone()));
        queue.enqueue(flaky_task("bathroom", 0, Arc::new(AtomicU32::new(0)), log));

        // First attempt fails, then the 2s backoff outlives the timeout.
        let cut = tokio::time::timeout(Duration::from_secs(1), queue.flush()).await;
        assert!(cut.is_err());

        let pending = queue.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].label, "dose2");
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[1].label, "bathroom");

        let report = queue.flush().await;
        assert_eq!(report.status, FlushStatus::Completed);
        assert_eq!(report.delivered.len(), 2);
        assert_eq!(report.delivered[0].attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_restores_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let slow_calls = Arc::clone(&calls);
        let queue = online_queue(3);
        queue.enqueue(QueuedTask::new("dose1", created(), move || {
            slow_calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }
        }));

        let cut = tokio::time::timeout(Duration::from_secs(1), queue.flush()).await;
        assert!(cut.is_err());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending()[0].attempts, 0);

        let report = queue.flush().await;
        assert_eq!(report.status, FlushStatus::Completed);
        assert_eq!(report.delivered[0].attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff_for() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.backoff_for(1), Duration::from_secs(2));
        assert_eq!(cfg.backoff_for(2), Duration::from_secs(4));
        assert_eq!(cfg.backoff_for(0), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_saturates() {
        let huge = QueueConfig {
            max_retries: 3,
            backoff_base: 1e10,
        };
        assert_eq!(huge.backoff_for(1), MAX_BACKOFF);
        assert_eq!(huge.backoff_for(40), MAX_BACKOFF);

        let largest = QueueConfig {
            max_retries: 3,
            backoff_base: f64::MAX,
        };
        assert_eq!(largest.backoff_for(2), MAX_BACKOFF);
    }

    #[test]
    fn test_pending_snapshot_is_fifo() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = online_queue(3);
        queue.enqueue(flaky_task("first", 0, Arc::new(AtomicU32::new(0)), log.clone()));
        queue.enqueue(flaky_task("second", 0, Arc::new(AtomicU32::new(0)), log));

        let labels: Vec<_> = queue.pending().into_iter().map(|t| t.label).collect();
        assert_eq!(labels, vec!["first", "second"]);
        assert!(queue.pending().iter().all(|t| t.attempts == 0));
    }
}
