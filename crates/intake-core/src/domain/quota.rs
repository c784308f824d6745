use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

/// A sliding-window budget: at most `limit` requests in any trailing `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quota {
    pub limit: u32,
    pub window: Duration,
}

impl Quota {
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    pub const fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub const fn per_hour(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60 * 60))
    }

    pub const fn per_day(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(24 * 60 * 60))
    }

    /// Reject quotas that could never admit anything or that a history
    /// capped at `history_cap` entries cannot count.
    pub fn validate(&self, history_cap: usize) -> Result<(), ConfigError> {
        if self.limit == 0 {
            return Err(ConfigError::ZeroLimit(self.to_string()));
        }
        if self.window.is_zero() {
            return Err(ConfigError::ZeroWindow(self.to_string()));
        }
        if self.limit as usize > history_cap {
            return Err(ConfigError::LimitExceedsHistory {
                quota: self.to_string(),
                cap: history_cap,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per {}s", self.limit, self.window.as_secs())
    }
}

/// Tiered limits: global quotas per client, plus per-endpoint quotas
/// tracked separately for each (endpoint, client) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePolicy {
    pub global: Vec<Quota>,
    pub endpoints: HashMap<String, Vec<Quota>>,
}

impl Default for RatePolicy {
    fn default() -> Self {
        let endpoints = [
            ("/api/signup", vec![Quota::per_minute(10), Quota::per_hour(20)]),
            ("/api/suggestion", vec![Quota::per_minute(5), Quota::per_hour(10)]),
            ("/api/queue-status", vec![Quota::per_minute(5)]),
            ("/health", vec![Quota::per_minute(10)]),
        ]
        .into_iter()
        .map(|(endpoint, quotas)| (endpoint.to_string(), quotas))
        .collect();

        Self {
            global: vec![Quota::per_day(200), Quota::per_hour(50)],
            endpoints,
        }
    }
}

impl RatePolicy {
    /// Policy with only global quotas.
    pub fn global(quotas: Vec<Quota>) -> Self {
        Self {
            global: quotas,
            endpoints: HashMap::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>, quotas: Vec<Quota>) -> Self {
        self.endpoints.insert(endpoint.into(), quotas);
        self
    }

    /// Endpoint-specific quotas, empty for endpoints without their own limits.
    pub fn endpoint_quotas(&self, endpoint: &str) -> &[Quota] {
        self.endpoints
            .get(endpoint)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn quotas(&self) -> impl Iterator<Item = &Quota> {
        self.global.iter().chain(self.endpoints.values().flatten())
    }

    pub fn longest_window(&self) -> Duration {
        self.quotas().map(|q| q.window).max().unwrap_or_default()
    }

    pub fn validate(&self, history_cap: usize) -> Result<(), ConfigError> {
        self.quotas().try_for_each(|q| q.validate(history_cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(Quota::per_minute(30).validate(100).is_ok());
        assert_eq!(
            Quota::per_minute(0).validate(100),
            Err(ConfigError::ZeroLimit("0 per 60s".to_string()))
        );
        assert!(matches!(
            Quota::new(5, Duration::ZERO).validate(100),
            Err(ConfigError::ZeroWindow(_))
        ));
        assert!(matches!(
            Quota::per_day(200).validate(100),
            Err(ConfigError::LimitExceedsHistory { cap: 100, .. })
        ));
    }

    #[test]
    fn test_default_policy() {
        let policy = RatePolicy::default();
        assert_eq!(policy.longest_window(), Duration::from_secs(86_400));
        assert_eq!(policy.endpoint_quotas("/api/suggestion")[0], Quota::per_minute(5));
        assert!(policy.endpoint_quotas("/unknown").is_empty());
        assert!(policy.validate(256).is_ok());
        assert!(policy.validate(100).is_err());
    }
}
