//! Request admission controls

pub mod rate_limiting;

pub use rate_limiting::{PlanRateLimiter, RateLimitDecision};
