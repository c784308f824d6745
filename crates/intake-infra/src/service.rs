//! Intake service - the composition root shared by request handlers.

use std::sync::Arc;

use intake_core::domain::{Notice, SubmissionKind};
use intake_core::ports::{AdmissionQueue, Mailer, NotifyStats, QueueStats};
use intake_core::{AdmissionDecision, ConfigError, RejectReason};

use crate::admission::InMemoryAdmissionQueue;
use crate::config::IntakeConfig;
use crate::notify::{NotificationDispatcher, TracingMailer};
use crate::rate_limit::{AbuseGuard, TieredRateLimiter};

/// Admission pipeline plus notification dispatch.
///
/// A submission passes the abuse guard, then the tiered rate limits, then
/// the admission queue. The first stage to refuse decides the outcome.
pub struct IntakeService {
    guard: AbuseGuard,
    limits: TieredRateLimiter,
    queue: Arc<dyn AdmissionQueue>,
    notifier: NotificationDispatcher,
    admin_email: Option<String>,
}

impl IntakeService {
    /// Build the service with the in-memory queue and the logging mailer.
    /// Must be called inside a Tokio runtime when workers are configured.
    pub fn new(config: &IntakeConfig) -> Result<Self, ConfigError> {
        let queue = Arc::new(InMemoryAdmissionQueue::new(config.queue.clone())?);
        Self::with_parts(config, queue, Arc::new(TracingMailer))
    }

    pub fn with_parts(
        config: &IntakeConfig,
        queue: Arc<dyn AdmissionQueue>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, ConfigError> {
        let service = Self {
            guard: AbuseGuard::new(&config.guard)?,
            limits: TieredRateLimiter::new(config.policy.clone(), config.history_cap)?,
            queue,
            notifier: NotificationDispatcher::new(config.notify.clone(), mailer)?,
            admin_email: config.admin_email.clone(),
        };

        tracing::info!(
            max_queue_size = service.queue.max_size(),
            admin_notices = service.admin_email.is_some(),
            "Intake service ready"
        );

        Ok(service)
    }

    /// Run a submission through the admission pipeline.
    pub fn submit(
        &self,
        endpoint: &str,
        payload: serde_json::Value,
        client_id: &str,
    ) -> AdmissionDecision {
        if let Err(reason) = self.guard.check(client_id) {
            tracing::debug!(client = %client_id, endpoint = %endpoint, %reason, "Submission refused");
            return AdmissionDecision::Rejected(reason);
        }

        if let Err(quota) = self.limits.check(endpoint, client_id) {
            tracing::debug!(client = %client_id, endpoint = %endpoint, quota = %quota, "Rate limit exceeded");
            return AdmissionDecision::Rejected(RejectReason::RateLimited);
        }

        self.queue.add_request(endpoint, payload, client_id)
    }

    /// Submit, and on admission hand the notices to the dispatcher.
    /// Dispatch failures are logged and never change the decision.
    pub fn submit_and_notify(
        &self,
        endpoint: &str,
        payload: serde_json::Value,
        client_id: &str,
        notices: Vec<Notice>,
    ) -> AdmissionDecision {
        let decision = self.submit(endpoint, payload, client_id);
        if !decision.is_admitted() {
            return decision;
        }

        for notice in notices {
            let notice_id = notice.id;
            if let Err(e) = self.notifier.dispatch(notice) {
                tracing::error!(notice_id = %notice_id, error = %e, "Failed to queue notice");
            }
        }

        decision
    }

    /// Notices owed for a submission, addressed with the configured admin.
    pub fn notices_for(
        &self,
        kind: SubmissionKind,
        submitter: Option<&str>,
        fields: serde_json::Value,
    ) -> Vec<Notice> {
        Notice::for_submission(kind, submitter, self.admin_email.as_deref(), fields)
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn notification_stats(&self) -> NotifyStats {
        self.notifier.stats()
    }

    /// Block list administration.
    pub fn guard(&self) -> &AbuseGuard {
        &self.guard
    }
}
