use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of form a submission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Signup,
    Suggestion,
}

/// Which notice to send. Chosen from the submission type, never by
/// inspecting rendered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "of")]
pub enum NoticeKind {
    /// Receipt sent to the student who signed up.
    SignupConfirmation,
    /// Sent to the administrator when a suggestion arrives.
    SuggestionReceived,
    /// Administrator's copy of a submission.
    AdminCopy(SubmissionKind),
}

impl NoticeKind {
    pub fn subject(&self) -> &'static str {
        match self {
            NoticeKind::SignupConfirmation => "Program Signup Confirmation",
            NoticeKind::SuggestionReceived => "Suggestion Received",
            NoticeKind::AdminCopy(SubmissionKind::Signup) => "New Signup Received",
            NoticeKind::AdminCopy(SubmissionKind::Suggestion) => "New Suggestion Received",
        }
    }
}

/// A notification waiting to be delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub id: Uuid,
    pub kind: NoticeKind,
    pub recipient: String,
    /// Submission fields made available to the mailer.
    pub fields: serde_json::Value,
    /// Delivery attempts made so far.
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl Notice {
    pub fn new(kind: NoticeKind, recipient: impl Into<String>, fields: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            recipient: recipient.into(),
            fields,
            attempts: 0,
            max_attempts: 3,
            created_at: Utc::now(),
        }
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn subject(&self) -> &'static str {
        self.kind.subject()
    }

    /// Notices owed for a submission.
    ///
    /// A signup confirms to the submitter and copies the administrator when
    /// one is configured and is not the submitter. A suggestion only goes to
    /// the administrator.
    pub fn for_submission(
        kind: SubmissionKind,
        submitter: Option<&str>,
        admin: Option<&str>,
        fields: serde_json::Value,
    ) -> Vec<Notice> {
        let mut notices = Vec::new();

        match kind {
            SubmissionKind::Signup => {
                if let Some(submitter) = submitter {
                    notices.push(Notice::new(
                        NoticeKind::SignupConfirmation,
                        submitter,
                        fields.clone(),
                    ));
                }
                if let Some(admin) = admin.filter(|admin| Some(*admin) != submitter) {
                    notices.push(Notice::new(NoticeKind::AdminCopy(kind), admin, fields));
                }
            }
            SubmissionKind::Suggestion => {
                if let Some(admin) = admin {
                    notices.push(Notice::new(NoticeKind::SuggestionReceived, admin, fields));
                }
            }
        }

        notices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signup_notices() {
        let notices = Notice::for_submission(
            SubmissionKind::Signup,
            Some("student@school.org"),
            Some("admin@school.org"),
            json!({ "fullName": "Ada Lovelace" }),
        );

        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].kind, NoticeKind::SignupConfirmation);
        assert_eq!(notices[0].recipient, "student@school.org");
        assert_eq!(notices[1].kind, NoticeKind::AdminCopy(SubmissionKind::Signup));
        assert_eq!(notices[1].subject(), "New Signup Received");
    }

    #[test]
    fn test_admin_submitting_gets_one_notice() {
        let notices = Notice::for_submission(
            SubmissionKind::Signup,
            Some("admin@school.org"),
            Some("admin@school.org"),
            json!({}),
        );
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::SignupConfirmation);
    }

    #[test]
    fn test_suggestion_without_admin() {
        assert!(Notice::for_submission(SubmissionKind::Suggestion, None, None, json!({})).is_empty());

        let notices = Notice::for_submission(
            SubmissionKind::Suggestion,
            Some("someone@school.org"),
            Some("admin@school.org"),
            json!({}),
        );
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].recipient, "admin@school.org");
        assert_eq!(notices[0].subject(), "Suggestion Received");
    }
}
