//! # Intake Core
//!
//! The domain layer of the form-intake backend.
//! Admission decisions, quotas, queued tasks and notices, plus the ports
//! that infrastructure implements. No runtime or I/O dependencies.

pub mod domain;
pub mod error;
pub mod ports;

pub use domain::{AdmissionDecision, Quota, QueuedTask, RejectReason};
pub use error::{ConfigError, NotifyError, ProcessingError};
