//! # Intake Infrastructure
//!
//! In-memory implementations of the ports defined in `intake-core`:
//! sliding-window rate limiting, the abuse guard, the bounded admission
//! queue and its worker pool, and notification dispatch. Also hosts
//! configuration, telemetry setup and the [`IntakeService`] composition root.
//!
//! Nothing here persists; all state is lost on restart.

pub mod admission;
pub mod config;
pub mod notify;
pub mod rate_limit;
pub mod service;
pub mod telemetry;

// Re-exports
pub use admission::{AdmissionQueueConfig, InMemoryAdmissionQueue, ThrottleOnly};
pub use config::IntakeConfig;
pub use notify::{DispatcherConfig, NotificationDispatcher, TracingMailer};
pub use rate_limit::{
    AbuseGuard, GuardConfig, SlidingWindowConfig, SlidingWindowLimiter, TieredRateLimiter,
};
pub use service::IntakeService;
pub use telemetry::{TelemetryConfig, init_telemetry};
