//! Domain types - admission decisions, quotas, queued work and notices.

mod decision;
mod notice;
mod quota;
mod task;

pub use decision::{AdmissionDecision, RejectReason};
pub use notice::{Notice, NoticeKind, SubmissionKind};
pub use quota::{Quota, RatePolicy};
pub use task::QueuedTask;
