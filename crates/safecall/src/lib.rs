//! Call-resilience toolkit.
//!
//! `safecall` wraps fallible async (and sync) operations with uniform failure
//! containment and recovery policies. Every entry point lives on the
//! [`SafeCall`] context object, which owns the pluggable log sink, the error
//! filter chain, the global failure handlers, the retry defaults and the
//! scheduler table.
//!
//! # Modules
//!
//! - [`invoker`]: failure capture (`Err` values and panics) into [`CallResult`]
//! - [`funnel`]: ignore patterns, log sink and global handlers
//! - [`resilience`]: retry, circuit breaker, rate limiter, timeout guard
//! - [`cache`]: memoization with TTL expiry
//! - [`observability`]: call profiler and latency histogram
//! - [`time`]: named periodic scheduler
//! - [`config`]: serde-backed configuration loading
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use safecall::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use safecall::SafeCall;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let safecall = SafeCall::new();
//! let breaker = CircuitBreaker::new(
//!     CircuitBreakerConfig::builder()
//!         .failure_threshold(3)
//!         .reset_timeout(Duration::from_secs(30))
//!         .build()?,
//! )?;
//!
//! let value = safecall
//!     .call_with_circuit_breaker(&breaker, || async { Ok::<_, std::io::Error>(42) })
//!     .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod funnel;
pub mod invoker;
pub mod observability;
pub mod resilience;
pub mod safecall;
pub mod time;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types for convenience
// ------------------------
pub use cache::{MemoStats, Memoized};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::SafeCallConfig;
pub use error::{BoxedError, CallError, CallResult, ConfigError, ConfigResult, SharedError};
pub use funnel::{
    ErrorFilterChain, FailureEvent, FailureHandler, GlobalHandlerRegistry, HandlerId, LogLevel,
    LogSink, TracingSink,
};
pub use observability::{ProfileSnapshot, Profiler};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, RateLimiter,
    RateLimiterConfig, RetryConfig,
};
pub use safecall::{RetryVeto, SafeCall};
pub use time::ScheduleHandle;
