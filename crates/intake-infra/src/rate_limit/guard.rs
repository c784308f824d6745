//! Abuse guard - blocks clients with abusive request patterns.

use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use intake_core::ports::RateLimiter;
use intake_core::{ConfigError, Quota, RejectReason};

use super::sliding::{Refusal, SlidingWindowConfig, SlidingWindowLimiter};

/// Abuse guard configuration.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Sustained requests per minute before a client is blocked.
    pub max_per_minute: u32,
    /// Requests arriving within `burst_window` that trigger a block.
    pub burst_size: u32,
    pub burst_window: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 100,
            burst_size: 10,
            burst_window: Duration::from_secs(2),
        }
    }
}

/// Per-client abuse detection in front of the rate limits.
///
/// Keeps a short timestamp history per client. A client trips the guard on
/// request `max_per_minute + 1` inside any minute, or on the `burst_size`-th
/// request inside `burst_window`. Tripping puts the client on the block list
/// for the life of the process, or until [`AbuseGuard::unblock`].
pub struct AbuseGuard {
    sustained: Quota,
    burst: Quota,
    history: SlidingWindowLimiter,
    blocked: RwLock<HashSet<String>>,
}

impl AbuseGuard {
    pub fn new(config: &GuardConfig) -> Result<Self, ConfigError> {
        if config.max_per_minute == 0 {
            return Err(ConfigError::Invalid {
                key: "max_per_minute",
                reason: "must be at least 1".to_string(),
            });
        }
        // A burst of N trips on the N-th request, so N - 1 earlier ones are allowed.
        if config.burst_size < 2 {
            return Err(ConfigError::Invalid {
                key: "burst_size",
                reason: "must be at least 2".to_string(),
            });
        }
        if config.burst_window.is_zero() {
            return Err(ConfigError::Invalid {
                key: "burst_window",
                reason: "must be non-zero".to_string(),
            });
        }

        let history = SlidingWindowLimiter::new(SlidingWindowConfig {
            max_history: config.max_per_minute.max(config.burst_size) as usize,
            ..Default::default()
        });

        Ok(Self {
            sustained: Quota::per_minute(config.max_per_minute),
            burst: Quota::new(config.burst_size - 1, config.burst_window),
            history,
            blocked: RwLock::new(HashSet::new()),
        })
    }

    /// Admit the request or say why the client is turned away.
    pub fn check(&self, client_id: &str) -> Result<(), RejectReason> {
        self.check_at(client_id, Instant::now())
    }

    pub fn check_at(&self, client_id: &str, now: Instant) -> Result<(), RejectReason> {
        if self.is_blocked(client_id) {
            return Err(RejectReason::Blocked);
        }

        let quotas = [self.sustained, self.burst];
        let tripped = match self
            .history
            .admit_at(&[(client_id, &quotas[..])], now, || Ok::<(), Infallible>(()))
        {
            Ok(()) => return Ok(()),
            Err(Refusal::OverQuota(quota)) => quota,
            Err(Refusal::Declined(never)) => match never {},
        };

        tracing::warn!(
            client = %client_id,
            quota = %tripped,
            burst = tripped == self.burst,
            "Blocking client for suspicious activity"
        );
        self.blocked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client_id.to_string());

        Err(RejectReason::Suspicious)
    }

    pub fn is_blocked(&self, client_id: &str) -> bool {
        self.blocked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(client_id)
    }

    /// Lift a block. Returns whether the client was blocked.
    pub fn unblock(&self, client_id: &str) -> bool {
        let removed = self
            .blocked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(client_id);
        if removed {
            tracing::info!(client = %client_id, "Client unblocked");
        }
        removed
    }

    pub fn blocked_clients(&self) -> Vec<String> {
        let mut clients: Vec<String> = self
            .blocked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        clients.sort();
        clients
    }

    /// Forget history for clients that have gone quiet.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    pub fn sweep_at(&self, now: Instant) {
        self.history.purge_expired_at(now);
    }

    /// Clients with live history.
    pub fn tracked_clients(&self) -> usize {
        self.history.tracked_clients()
    }
}
