//! Resilience policies
//!
//! Each policy is a small state machine plus an entry point on
//! [`SafeCall`](crate::SafeCall):
//!
//! - **[`retry`]**: repeated attempts with exponential backoff and a veto
//! - **[`circuit_breaker`]**: rejects calls after repeated failures
//! - **[`rate_limiter`]**: sliding-window admission control
//! - **[`timeout`]**: deadline on a detached task
//!
//! Policies compose by nesting: a `CallError` returned by an inner policy
//! passes through the outer one unchanged and is reported only once.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState,
};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterConfigBuilder};
pub use retry::{RetryConfig, RetryConfigBuilder};
