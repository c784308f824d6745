//! Admission queue implementations.

mod memory;

pub use memory::{AdmissionQueueConfig, InMemoryAdmissionQueue, ThrottleOnly};
