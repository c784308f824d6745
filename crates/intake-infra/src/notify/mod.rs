//! Outbound notifications for accepted submissions.

mod dispatcher;
mod mailer;

pub use dispatcher::{DispatcherConfig, NotificationDispatcher};
pub use mailer::TracingMailer;
