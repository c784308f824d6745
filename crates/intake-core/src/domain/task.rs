use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An admitted request waiting for a worker.
///
/// Immutable once created; the payload is never inspected by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: Uuid,
    /// Endpoint label, e.g. `/api/signup`.
    pub endpoint: String,
    pub payload: serde_json::Value,
    /// Source address of the submitter.
    pub client_id: String,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn new(
        endpoint: impl Into<String>,
        payload: serde_json::Value,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint: endpoint.into(),
            payload,
            client_id: client_id.into(),
            enqueued_at: Utc::now(),
        }
    }
}
