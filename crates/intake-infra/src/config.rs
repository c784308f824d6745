//! Service configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use intake_core::Quota;
use intake_core::domain::RatePolicy;

use crate::admission::AdmissionQueueConfig;
use crate::notify::DispatcherConfig;
use crate::rate_limit::GuardConfig;

/// Everything needed to build an [`IntakeService`](crate::IntakeService).
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub queue: AdmissionQueueConfig,
    pub policy: RatePolicy,
    /// Timestamps kept per key by the tiered limiter.
    pub history_cap: usize,
    pub guard: GuardConfig,
    pub notify: DispatcherConfig,
    /// Receives copies of submissions. Unset disables admin notices.
    pub admin_email: Option<String>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            queue: AdmissionQueueConfig::default(),
            policy: RatePolicy::default(),
            history_cap: 256,
            guard: GuardConfig::default(),
            notify: DispatcherConfig::default(),
            admin_email: None,
        }
    }
}

impl IntakeConfig {
    /// Load a `.env` file if present, then read the environment.
    pub fn load() -> Self {
        if dotenvy::dotenv().is_ok() {
            tracing::debug!("Loaded .env file");
        }
        Self::from_env()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing or malformed values
    /// fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let queue = AdmissionQueueConfig {
            max_queue_size: var(&lookup, "QUEUE_MAX_SIZE").unwrap_or(defaults.queue.max_queue_size),
            workers: var(&lookup, "QUEUE_WORKERS").unwrap_or(defaults.queue.workers),
            processing_delay: var(&lookup, "QUEUE_PROCESSING_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.queue.processing_delay),
            poll_interval: var(&lookup, "QUEUE_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.queue.poll_interval),
            rate_quota: Quota::new(
                var(&lookup, "ADMISSION_RATE_LIMIT").unwrap_or(defaults.queue.rate_quota.limit),
                var(&lookup, "ADMISSION_RATE_WINDOW_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.queue.rate_quota.window),
            ),
            max_history: defaults.queue.max_history,
        };

        let policy = RatePolicy {
            global: vec![
                Quota::per_day(var(&lookup, "RATE_LIMIT_PER_DAY").unwrap_or(200)),
                Quota::per_hour(var(&lookup, "RATE_LIMIT_PER_HOUR").unwrap_or(50)),
            ],
            ..defaults.policy
        };

        let guard = GuardConfig {
            max_per_minute: var(&lookup, "GUARD_MAX_PER_MINUTE").unwrap_or(defaults.guard.max_per_minute),
            burst_size: var(&lookup, "GUARD_BURST_SIZE").unwrap_or(defaults.guard.burst_size),
            burst_window: var(&lookup, "GUARD_BURST_WINDOW_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.guard.burst_window),
        };

        let notify = DispatcherConfig {
            max_size: var(&lookup, "NOTIFY_MAX_SIZE").unwrap_or(defaults.notify.max_size),
            workers: var(&lookup, "NOTIFY_WORKERS").unwrap_or(defaults.notify.workers),
            max_attempts: var(&lookup, "NOTIFY_MAX_ATTEMPTS").unwrap_or(defaults.notify.max_attempts),
            ..defaults.notify
        };

        Self {
            queue,
            policy,
            history_cap: var(&lookup, "RATE_HISTORY_CAP").unwrap_or(defaults.history_cap),
            guard,
            notify,
            admin_email: lookup("ADMIN_EMAIL")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }
}

fn var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}
