//! Notification dispatcher - a bounded queue of notices drained by mail workers.
//!
//! Independent of the admission queue: a saturated mailer never backs up
//! admission, and admission rejections never touch pending mail.
//! Notices are lost on restart.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};

use intake_core::domain::Notice;
use intake_core::ports::{Mailer, NotifyStats};
use intake_core::{ConfigError, NotifyError};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum pending notices.
    pub max_size: usize,
    /// Number of mail workers.
    pub workers: usize,
    /// Upper bound on delivery attempts per notice.
    pub max_attempts: u32,
    /// Base delay before a retry, multiplied by the attempt number.
    pub retry_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_size: 500,
            workers: 2,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

pub struct NotificationDispatcher {
    config: DispatcherConfig,
    stats: Arc<DispatchStats>,
    notice_sender: mpsc::Sender<Notice>,
    // Held so the channel stays open when no workers run.
    _notice_receiver: Arc<Mutex<mpsc::Receiver<Notice>>>,
}

#[derive(Default)]
struct DispatchStats {
    pending: AtomicUsize,
    processing: AtomicUsize,
    delivered: AtomicUsize,
    failed: AtomicUsize,
}

impl NotificationDispatcher {
    /// Build the dispatcher and spawn its workers on the current Tokio runtime.
    pub fn new(config: DispatcherConfig, mailer: Arc<dyn Mailer>) -> Result<Self, ConfigError> {
        if config.max_size == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if config.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if config.workers > 0 && tokio::runtime::Handle::try_current().is_err() {
            return Err(ConfigError::NoRuntime);
        }

        let (tx, rx) = mpsc::channel::<Notice>(config.max_size);
        let receiver = Arc::new(Mutex::new(rx));
        let stats = Arc::new(DispatchStats::default());

        for worker_id in 0..config.workers {
            let receiver = receiver.clone();
            let mailer = mailer.clone();
            let stats = stats.clone();
            // Weak, so dropping the dispatcher closes the channel and stops the workers.
            let retry_sender = tx.downgrade();
            let backoff = config.retry_backoff;

            tokio::spawn(async move {
                tracing::info!("Mail worker {} started", worker_id);

                loop {
                    let notice = {
                        let mut rx = receiver.lock().await;
                        rx.recv().await
                    };

                    let Some(mut notice) = notice else {
                        tracing::info!("Mail worker {} shutting down", worker_id);
                        break;
                    };

                    stats.pending.fetch_sub(1, Ordering::Relaxed);
                    stats.processing.fetch_add(1, Ordering::Relaxed);

                    notice.attempts += 1;
                    tracing::debug!(
                        worker = worker_id,
                        notice_id = %notice.id,
                        kind = ?notice.kind,
                        attempt = notice.attempts,
                        "Delivering notice"
                    );

                    let result = AssertUnwindSafe(mailer.deliver(&notice))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(NotifyError::Delivery("mailer panicked".to_string())));

                    stats.processing.fetch_sub(1, Ordering::Relaxed);

                    match result {
                        Ok(()) => {
                            stats.delivered.fetch_add(1, Ordering::Relaxed);
                            tracing::info!(
                                notice_id = %notice.id,
                                subject = notice.subject(),
                                "Notice delivered"
                            );
                        }
                        Err(e) if notice.attempts < notice.max_attempts => {
                            tracing::warn!(
                                notice_id = %notice.id,
                                attempt = notice.attempts,
                                max_attempts = notice.max_attempts,
                                error = %e,
                                "Delivery failed, will retry"
                            );
                            stats.pending.fetch_add(1, Ordering::Relaxed);
                            let retry_sender = retry_sender.clone();
                            let stats = stats.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(backoff * notice.attempts).await;
                                let requeued = match retry_sender.upgrade() {
                                    Some(sender) => sender.send(notice).await.is_ok(),
                                    None => false,
                                };
                                if !requeued {
                                    stats.pending.fetch_sub(1, Ordering::Relaxed);
                                    stats.failed.fetch_add(1, Ordering::Relaxed);
                                    tracing::error!("Failed to re-enqueue notice for retry");
                                }
                            });
                        }
                        Err(e) => {
                            stats.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::error!(
                                notice_id = %notice.id,
                                recipient = %notice.recipient,
                                error = %e,
                                "Notice failed after max attempts"
                            );
                        }
                    }
                }
            });
        }

        Ok(Self {
            config,
            stats,
            notice_sender: tx,
            _notice_receiver: receiver,
        })
    }

    /// Queue a notice without waiting. Attempts are capped at the
    /// configured maximum.
    pub fn dispatch(&self, mut notice: Notice) -> Result<(), NotifyError> {
        notice.max_attempts = notice.max_attempts.clamp(1, self.config.max_attempts);

        self.stats.pending.fetch_add(1, Ordering::Relaxed);
        match self.notice_sender.try_send(notice) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.stats.pending.fetch_sub(1, Ordering::Relaxed);
                match e {
                    TrySendError::Full(_) => Err(NotifyError::QueueFull),
                    TrySendError::Closed(_) => Err(NotifyError::Closed),
                }
            }
        }
    }

    pub fn stats(&self) -> NotifyStats {
        NotifyStats {
            pending: self.stats.pending.load(Ordering::Relaxed),
            processing: self.stats.processing.load(Ordering::Relaxed),
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use intake_core::domain::{NoticeKind, SubmissionKind};
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    /// Fails the first `failures` deliveries, then succeeds.
    struct FlakyMailer {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyMailer {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn deliver(&self, _notice: &Notice) -> Result<(), NotifyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(NotifyError::Delivery("smtp timeout".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn notice() -> Notice {
        Notice::new(
            NoticeKind::AdminCopy(SubmissionKind::Signup),
            "admin@school.org",
            json!({ "fullName": "Grace Hopper" }),
        )
    }

    fn fast_config(workers: usize) -> DispatcherConfig {
        DispatcherConfig {
            workers,
            retry_backoff: Duration::from_millis(5),
            ..Default::default()
        }
    }

    async fn settle(dispatcher: &NotificationDispatcher, done: usize) -> NotifyStats {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let stats = dispatcher.stats();
            if stats.delivered + stats.failed >= done && stats.pending == 0 {
                return stats;
            }
            assert!(Instant::now() < deadline, "dispatcher stalled: {stats:?}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_delivers_notices() {
        let mailer = FlakyMailer::new(0);
        let dispatcher = NotificationDispatcher::new(fast_config(2), mailer.clone()).unwrap();

        for _ in 0..5 {
            dispatcher.dispatch(notice()).unwrap();
        }

        let stats = settle(&dispatcher, 5).await;
        assert_eq!(stats.delivered, 5);
        assert_eq!(stats.failed, 0);
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_retries_until_delivered() {
        let mailer = FlakyMailer::new(2);
        let dispatcher = NotificationDispatcher::new(fast_config(1), mailer.clone()).unwrap();

        dispatcher.dispatch(notice()).unwrap();

        let stats = settle(&dispatcher, 1).await;
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mailer = FlakyMailer::new(u32::MAX);
        let dispatcher = NotificationDispatcher::new(fast_config(1), mailer.clone()).unwrap();

        // Asking for more attempts than configured is capped at three.
        dispatcher.dispatch(notice().with_max_attempts(10)).unwrap();

        let stats = settle(&dispatcher, 1).await;
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.failed, 1);
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_waiting() {
        let dispatcher = NotificationDispatcher::new(
            DispatcherConfig {
                max_size: 2,
                workers: 0,
                ..Default::default()
            },
            FlakyMailer::new(0),
        )
        .unwrap();

        dispatcher.dispatch(notice()).unwrap();
        dispatcher.dispatch(notice()).unwrap();
        assert!(matches!(dispatcher.dispatch(notice()), Err(NotifyError::QueueFull)));
        assert_eq!(dispatcher.stats().pending, 2);
    }

    #[test]
    fn test_invalid_config() {
        let zero = DispatcherConfig {
            max_size: 0,
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            NotificationDispatcher::new(zero, FlakyMailer::new(0)),
            Err(ConfigError::ZeroCapacity)
        ));
    }
}
