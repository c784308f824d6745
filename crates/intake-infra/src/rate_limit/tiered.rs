//! Tiered limits - global per-client caps plus tighter per-endpoint caps.

use std::convert::Infallible;
use std::time::{Duration, Instant};

use intake_core::domain::RatePolicy;
use intake_core::ports::RateLimiter;
use intake_core::{ConfigError, Quota};

use super::sliding::{Refusal, SlidingWindowConfig, SlidingWindowLimiter};

/// Evaluates a [`RatePolicy`] against one shared sliding-window store.
///
/// Global quotas count every request from a client. Endpoint quotas count
/// only that client's requests to that endpoint. All applicable quotas are
/// checked atomically and a request is recorded only if every one passes.
pub struct TieredRateLimiter {
    policy: RatePolicy,
    limiter: SlidingWindowLimiter,
}

impl TieredRateLimiter {
    pub fn new(policy: RatePolicy, max_history: usize) -> Result<Self, ConfigError> {
        policy.validate(max_history)?;

        let limiter = SlidingWindowLimiter::new(SlidingWindowConfig {
            max_history,
            retention: policy
                .longest_window()
                .saturating_mul(2)
                .max(Duration::from_secs(300)),
            ..Default::default()
        });

        Ok(Self { policy, limiter })
    }

    pub fn policy(&self) -> &RatePolicy {
        &self.policy
    }

    /// Returns the exhausted quota on rejection.
    pub fn check(&self, endpoint: &str, client_id: &str) -> Result<(), Quota> {
        self.check_at(endpoint, client_id, Instant::now())
    }

    pub fn check_at(&self, endpoint: &str, client_id: &str, now: Instant) -> Result<(), Quota> {
        let global_key = format!("g|{client_id}");
        // Length-prefixed so no endpoint/client split can alias another.
        let endpoint_key = format!("e|{}|{endpoint}|{client_id}", endpoint.len());
        let endpoint_quotas = self.policy.endpoint_quotas(endpoint);

        let mut checks: Vec<(&str, &[Quota])> = Vec::with_capacity(2);
        if !self.policy.global.is_empty() {
            checks.push((global_key.as_str(), self.policy.global.as_slice()));
        }
        if !endpoint_quotas.is_empty() {
            checks.push((endpoint_key.as_str(), endpoint_quotas));
        }

        self.limiter
            .admit_at(&checks, now, || Ok::<(), Infallible>(()))
            .map_err(|refusal| match refusal {
                Refusal::OverQuota(quota) => quota,
                Refusal::Declined(never) => match never {},
            })
    }

    pub fn purge_expired_at(&self, now: Instant) {
        self.limiter.purge_expired_at(now);
    }

    /// Live history keys, global and per-endpoint.
    pub fn tracked_keys(&self) -> usize {
        self.limiter.tracked_clients()
    }
}
