//! Mail delivery port.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::Notice;
use crate::error::NotifyError;

/// Delivers a single notice. Transports live behind this trait.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, notice: &Notice) -> Result<(), NotifyError>;
}

/// Notification dispatch statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotifyStats {
    pub pending: usize,
    pub processing: usize,
    pub delivered: usize,
    pub failed: usize,
}
