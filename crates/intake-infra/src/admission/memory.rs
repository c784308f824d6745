//! In-memory admission queue.
//!
//! A bounded channel drained by a fixed pool of Tokio workers. Admission
//! is non-blocking: the per-client rate check and the enqueue run in one
//! critical section and fail closed. Tasks are lost on restart and no drain
//! is attempted on shutdown.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};

use intake_core::ports::{AdmissionQueue, QueueStats, RateLimiter, TaskProcessor};
use intake_core::{AdmissionDecision, ConfigError, ProcessingError, Quota, QueuedTask, RejectReason};

use crate::rate_limit::{Refusal, SlidingWindowConfig, SlidingWindowLimiter};

/// Admission queue configuration.
#[derive(Debug, Clone)]
pub struct AdmissionQueueConfig {
    /// Maximum buffered tasks.
    pub max_queue_size: usize,
    /// Number of worker tasks (0 leaves the queue undrained).
    pub workers: usize,
    /// Throttle applied by a worker to every task.
    pub processing_delay: Duration,
    /// How long an idle worker waits before re-checking for shutdown.
    pub poll_interval: Duration,
    /// Per-client budget checked before enqueueing.
    pub rate_quota: Quota,
    /// Timestamps kept per client.
    pub max_history: usize,
}

impl Default for AdmissionQueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 200,
            workers: 10,
            processing_delay: Duration::from_millis(50),
            poll_interval: Duration::from_secs(1),
            rate_quota: Quota::per_minute(30),
            max_history: 100,
        }
    }
}

/// Processor that does nothing; the worker's delay is the only throttle.
pub struct ThrottleOnly;

#[async_trait]
impl TaskProcessor for ThrottleOnly {
    async fn process(&self, task: &QueuedTask) -> Result<(), ProcessingError> {
        tracing::trace!(task_id = %task.id, "Task throttled");
        Ok(())
    }
}

/// In-memory admission queue with an embedded per-client rate limiter.
pub struct InMemoryAdmissionQueue {
    config: AdmissionQueueConfig,
    limiter: SlidingWindowLimiter,
    task_sender: mpsc::Sender<QueuedTask>,
    // Held so the channel stays open when no workers run.
    task_receiver: Arc<Mutex<mpsc::Receiver<QueuedTask>>>,
    stats: Arc<TaskStats>,
    shutdown: Arc<AtomicBool>,
}

#[derive(Default)]
struct TaskStats {
    running: AtomicUsize,
    processing: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl InMemoryAdmissionQueue {
    /// Build the queue and spawn its workers on the current Tokio runtime.
    pub fn new(config: AdmissionQueueConfig) -> Result<Self, ConfigError> {
        Self::with_processor(config, Arc::new(ThrottleOnly))
    }

    pub fn with_processor(
        config: AdmissionQueueConfig,
        processor: Arc<dyn TaskProcessor>,
    ) -> Result<Self, ConfigError> {
        if config.max_queue_size == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        config.rate_quota.validate(config.max_history)?;
        if config.workers > 0 && tokio::runtime::Handle::try_current().is_err() {
            return Err(ConfigError::NoRuntime);
        }

        let limiter = SlidingWindowLimiter::new(SlidingWindowConfig {
            max_history: config.max_history,
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel(config.max_queue_size);

        let queue = Self {
            config,
            limiter,
            task_sender: tx,
            task_receiver: Arc::new(Mutex::new(rx)),
            stats: Arc::new(TaskStats::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        queue.start_workers(processor);

        Ok(queue)
    }

    fn start_workers(&self, processor: Arc<dyn TaskProcessor>) {
        for worker_id in 0..self.config.workers {
            let worker = Worker {
                id: worker_id,
                receiver: self.task_receiver.clone(),
                processor: processor.clone(),
                stats: self.stats.clone(),
                shutdown: self.shutdown.clone(),
                processing_delay: self.config.processing_delay,
                poll_interval: self.config.poll_interval,
            };
            tokio::spawn(worker.run());
        }
    }

    /// Admission with an explicit clock reading for the rate check.
    pub fn add_request_at(
        &self,
        endpoint: &str,
        payload: serde_json::Value,
        client_id: &str,
        now: Instant,
    ) -> AdmissionDecision {
        let task = QueuedTask::new(endpoint, payload, client_id);
        let task_id = task.id;
        let quota = [self.config.rate_quota];

        let result = self.limiter.admit_at(&[(client_id, &quota[..])], now, || {
            self.task_sender.try_send(task).map_err(|e| match e {
                TrySendError::Full(_) => RejectReason::QueueFull,
                TrySendError::Closed(_) => {
                    tracing::error!("Admission queue closed");
                    RejectReason::QueueFull
                }
            })
        });

        match result {
            Ok(()) => {
                tracing::debug!(
                    task_id = %task_id,
                    endpoint = %endpoint,
                    client = %client_id,
                    queue_size = self.size(),
                    "Request queued"
                );
                AdmissionDecision::Queued
            }
            Err(Refusal::OverQuota(quota)) => {
                tracing::debug!(client = %client_id, quota = %quota, "Rate limit exceeded");
                AdmissionDecision::Rejected(RejectReason::RateLimited)
            }
            Err(Refusal::Declined(reason)) => {
                tracing::warn!(
                    client = %client_id,
                    endpoint = %endpoint,
                    max_size = self.config.max_queue_size,
                    "Admission queue full"
                );
                AdmissionDecision::Rejected(reason)
            }
        }
    }

    /// Ask workers to exit after their current task or poll timeout.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        tracing::info!("Admission queue shutting down");
    }

    /// Workers that have started and not yet exited.
    pub fn running_workers(&self) -> usize {
        self.stats.running.load(Ordering::Relaxed)
    }

    /// Clients with live rate-limit history.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.tracked_clients()
    }
}

impl AdmissionQueue for InMemoryAdmissionQueue {
    fn add_request(
        &self,
        endpoint: &str,
        payload: serde_json::Value,
        client_id: &str,
    ) -> AdmissionDecision {
        self.add_request_at(endpoint, payload, client_id, Instant::now())
    }

    fn size(&self) -> usize {
        self.task_sender.max_capacity() - self.task_sender.capacity()
    }

    fn max_size(&self) -> usize {
        self.config.max_queue_size
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            size: self.size(),
            max_size: self.max_size(),
            workers: self.config.workers,
            processing: self.stats.processing.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }
}

struct Worker {
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedTask>>>,
    processor: Arc<dyn TaskProcessor>,
    stats: Arc<TaskStats>,
    shutdown: Arc<AtomicBool>,
    processing_delay: Duration,
    poll_interval: Duration,
}

impl Worker {
    async fn run(self) {
        self.stats.running.fetch_add(1, Ordering::Relaxed);
        tracing::info!(worker = self.id, "Admission worker started");

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let next = {
                let mut rx = self.receiver.lock().await;
                // The flag may have been set while this worker waited for the lock.
                if self.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                tokio::time::timeout(self.poll_interval, rx.recv()).await
            };

            match next {
                // Idle poll, not an error.
                Err(_elapsed) => continue,
                Ok(Some(task)) => self.handle(task).await,
                Ok(None) => break,
            }
        }

        self.stats.running.fetch_sub(1, Ordering::Relaxed);
        tracing::info!(worker = self.id, "Admission worker stopped");
    }

    async fn handle(&self, task: QueuedTask) {
        self.stats.processing.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            worker = self.id,
            task_id = %task.id,
            endpoint = %task.endpoint,
            "Processing task"
        );

        if !self.processing_delay.is_zero() {
            tokio::time::sleep(self.processing_delay).await;
        }

        let outcome = AssertUnwindSafe(self.processor.process(&task))
            .catch_unwind()
            .await;

        self.stats.processing.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            Ok(Ok(())) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(worker = self.id, task_id = %task.id, "Task complete");
            }
            Ok(Err(e)) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker = self.id, task_id = %task.id, error = %e, "Task failed");
            }
            Err(_panic) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker = self.id, task_id = %task.id, "Task processor panicked");
            }
        }
    }
}
