//! Ports - trait definitions for the admission subsystem's seams.
//! Infrastructure provides the implementations.

mod admission;
mod mailer;
mod rate_limit;

pub use admission::{AdmissionQueue, QueueStats, TaskProcessor};
pub use mailer::{Mailer, NotifyStats};
pub use rate_limit::RateLimiter;
