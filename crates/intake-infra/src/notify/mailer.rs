//! Mailer that writes notices to the log instead of sending them.

use async_trait::async_trait;

use intake_core::NotifyError;
use intake_core::domain::Notice;
use intake_core::ports::Mailer;

/// Logs each notice at info level. Used when no mail transport is wired in.
#[derive(Debug, Default, Clone)]
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn deliver(&self, notice: &Notice) -> Result<(), NotifyError> {
        tracing::info!(
            notice_id = %notice.id,
            recipient = %notice.recipient,
            subject = notice.subject(),
            kind = ?notice.kind,
            fields = %notice.fields,
            "Notice sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::domain::NoticeKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_tracing_mailer_accepts_notice() {
        let notice = Notice::new(
            NoticeKind::SuggestionReceived,
            "admin@school.org",
            json!({ "suggestion": "More bike racks" }),
        );
        assert!(TracingMailer.deliver(&notice).await.is_ok());
    }
}
