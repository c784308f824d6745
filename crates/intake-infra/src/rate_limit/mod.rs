//! Rate limiting implementations.

mod guard;
mod sliding;
mod tiered;

pub use guard::{AbuseGuard, GuardConfig};
pub use sliding::{Refusal, SlidingWindowConfig, SlidingWindowLimiter};
pub use tiered::TieredRateLimiter;
