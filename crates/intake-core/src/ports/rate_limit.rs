//! Rate limiting port.

use std::time::Duration;

/// Sliding-window rate limiter keyed by client identifier.
///
/// Checks are synchronous and never wait for capacity.
pub trait RateLimiter: Send + Sync {
    /// Admit and record one request if `client_id` has fewer than `limit`
    /// requests in the trailing `window`. Returns `false` and records
    /// nothing otherwise.
    fn check_and_record(&self, client_id: &str, limit: u32, window: Duration) -> bool;

    /// Number of clients with live history.
    fn tracked_clients(&self) -> usize;
}
