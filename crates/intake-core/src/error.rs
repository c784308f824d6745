//! Error types.
//!
//! Overload never shows up here: rate limiting and backpressure are
//! reported as [`AdmissionDecision`](crate::AdmissionDecision) values.

use thiserror::Error;

/// Invalid construction parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Queue capacity must be at least 1")]
    ZeroCapacity,

    #[error("Quota must allow at least one request: {0}")]
    ZeroLimit(String),

    #[error("Quota window must be non-zero: {0}")]
    ZeroWindow(String),

    #[error("Quota {quota} exceeds the per-client history cap of {cap}")]
    LimitExceedsHistory { quota: String, cap: usize },

    #[error("Worker pool requires a running Tokio runtime")]
    NoRuntime,

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Failure raised by a task processor while a worker drains the queue.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Task processing failed: {0}")]
    Failed(String),
}

/// Notification dispatch and delivery errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification queue is full")]
    QueueFull,

    #[error("Notification queue is closed")]
    Closed,

    #[error("Delivery failed: {0}")]
    Delivery(String),
}
