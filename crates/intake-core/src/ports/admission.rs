//! Admission queue port - bounded buffering of admitted requests.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{AdmissionDecision, QueuedTask};
use crate::error::ProcessingError;

/// Bounded queue that gates requests before they trigger side effects.
pub trait AdmissionQueue: Send + Sync {
    /// Rate-check and enqueue without blocking. Overload is reported in the
    /// returned decision, never by waiting.
    fn add_request(
        &self,
        endpoint: &str,
        payload: serde_json::Value,
        client_id: &str,
    ) -> AdmissionDecision;

    /// Tasks currently buffered.
    fn size(&self) -> usize;

    /// Buffer capacity.
    fn max_size(&self) -> usize;

    fn stats(&self) -> QueueStats;
}

/// Work run by a queue worker after its throttle delay.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(&self, task: &QueuedTask) -> Result<(), ProcessingError>;
}

/// Queue statistics for health and monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub size: usize,
    pub max_size: usize,
    pub workers: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}
