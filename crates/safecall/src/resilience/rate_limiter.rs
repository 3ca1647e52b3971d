//! Sliding-window rate limiting
//!
//! A [`RateLimiter`] admits at most `max_calls` calls in any window of length
//! `window`. Timestamps of admitted calls are kept in a queue; before every
//! admission check, timestamps whose age is at least `window` are pruned from
//! the front. Prune, check and record happen under a single lock.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{BoxedError, CallError, CallResult, ConfigError, ConfigResult};
use crate::funnel::LogLevel;
use crate::safecall::SafeCall;

/// Configuration for the sliding-window limiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Maximum calls admitted per window
    pub max_calls: usize,
    /// Window length
    #[serde(rename = "window_ms", with = "crate::config::duration_millis")]
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { max_calls: 10, window: Duration::from_secs(1) }
    }
}

impl RateLimiterConfig {
    /// Create a new configuration builder
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_calls == 0 {
            return Err(ConfigError::invalid("max_calls must be greater than 0"));
        }
        if self.window.is_zero() {
            return Err(ConfigError::invalid("window must be greater than zero"));
        }
        Ok(())
    }
}

/// Builder for RateLimiterConfig
#[derive(Debug, Default)]
pub struct RateLimiterConfigBuilder {
    config: RateLimiterConfig,
}

impl RateLimiterConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_calls(mut self, max_calls: usize) -> Self {
        self.config.max_calls = max_calls;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    pub fn build(self) -> ConfigResult<RateLimiterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Sliding-window rate limiter
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use safecall::RateLimiter;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = RateLimiter::per_window(2, Duration::from_secs(1))?;
///
/// assert!(limiter.try_acquire());
/// assert!(limiter.try_acquire());
/// assert!(!limiter.try_acquire());
/// # Ok(())
/// # }
/// ```
pub struct RateLimiter<C: Clock = SystemClock> {
    config: RateLimiterConfig,
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    rejected: Arc<AtomicU64>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("recorded", &self.timestamps.lock().len())
            .field("rejected", &self.rejected.load(Ordering::Relaxed))
            .finish()
    }
}

impl<C: Clock> Clone for RateLimiter<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            timestamps: Arc::clone(&self.timestamps),
            rejected: Arc::clone(&self.rejected),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl RateLimiter<SystemClock> {
    /// Create a limiter using the system clock
    pub fn new(config: RateLimiterConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Convenience constructor for `max_calls` per `window`
    pub fn per_window(max_calls: usize, window: Duration) -> ConfigResult<Self> {
        Self::new(RateLimiterConfig { max_calls, window })
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a limiter with a custom clock (useful for testing)
    pub fn with_clock(config: RateLimiterConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            timestamps: Arc::new(Mutex::new(VecDeque::with_capacity(config.max_calls))),
            config,
            rejected: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(clock),
        })
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = timestamps.front() {
            if now.duration_since(*oldest) >= self.config.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admit a call if the window has room, recording its timestamp
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps, now);

        if timestamps.len() >= self.config.max_calls {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(
                in_window = timestamps.len(),
                max_calls = self.config.max_calls,
                "Rate limit exceeded"
            );
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Calls admitted within the current window
    pub fn current_usage(&self) -> usize {
        let now = self.clock.now();
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps, now);
        timestamps.len()
    }

    /// Calls that can still be admitted within the current window
    pub fn remaining(&self) -> usize {
        self.config.max_calls.saturating_sub(self.current_usage())
    }

    /// Total calls rejected since creation or the last reset
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Forget every recorded call
    pub fn reset(&self) {
        self.timestamps.lock().clear();
        self.rejected.store(0, Ordering::Relaxed);
    }
}

impl SafeCall {
    /// Run `operation` if `limiter` admits it.
    ///
    /// # Errors
    /// Returns `CallError::RateLimited` without running the operation when
    /// the window is full, otherwise the operation's own outcome.
    pub async fn call_with_rate_limit<C, F, Fut, T, E>(
        &self,
        limiter: &RateLimiter<C>,
        operation: F,
    ) -> CallResult<T>
    where
        C: Clock,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxedError>,
    {
        if !limiter.try_acquire() {
            self.log(LogLevel::Warn, "Rate limited");
            return Err(CallError::RateLimited);
        }
        self.call(operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::testing::RecordingSink;

    fn limiter(max_calls: usize, window_ms: u64) -> (RateLimiter<MockClock>, MockClock) {
        let clock = MockClock::new();
        let config = RateLimiterConfig::builder()
            .max_calls(max_calls)
            .window(Duration::from_millis(window_ms))
            .build()
            .unwrap();
        (RateLimiter::with_clock(config, clock.clone()).unwrap(), clock)
    }

    /// Validates configuration defaults and validation.
    ///
    /// Assertions:
    /// - Confirms the default is 10 calls per second.
    /// - Ensures zero `max_calls` and a zero window are rejected.
    #[test]
    fn test_config_defaults_and_validation() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.max_calls, 10);
        assert_eq!(config.window, Duration::from_secs(1));

        assert!(RateLimiterConfig::builder().max_calls(0).build().is_err());
        assert!(RateLimiterConfig::builder().window(Duration::ZERO).build().is_err());
    }

    #[test]
    fn test_rejects_when_window_full() {
        let (limiter, _clock) = limiter(3, 1000);

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.current_usage(), 3);
        assert_eq!(limiter.rejected_count(), 1);
    }

    /// Validates timestamps expire once their age reaches the window.
    ///
    /// # Test Steps
    /// 1. Fill the window at t=0
    /// 2. At t=window-1ms the window is still full
    /// 3. At t=window the oldest entries are pruned and calls are admitted
    #[test]
    fn test_sliding_window_prunes_at_window_boundary() {
        let (limiter, clock) = limiter(2, 100);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());

        clock.advance_millis(99);
        assert!(!limiter.try_acquire());

        clock.advance_millis(1);
        assert_eq!(limiter.remaining(), 2);
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_window_slides_per_timestamp() {
        let (limiter, clock) = limiter(2, 100);
        assert!(limiter.try_acquire());
        clock.advance_millis(60);
        assert!(limiter.try_acquire());

        clock.advance_millis(40);
        assert_eq!(limiter.current_usage(), 1);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_reset_clears_window() {
        let (limiter, _clock) = limiter(1, 1000);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        limiter.reset();
        assert_eq!(limiter.rejected_count(), 0);
        assert!(limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_call_with_rate_limit_logs_rejection() {
        let sink = RecordingSink::new();
        let safecall = SafeCall::with_sink(sink.clone());
        let (limiter, _clock) = limiter(1, 1000);

        let first = safecall.call_with_rate_limit(&limiter, || async { Ok::<_, String>(1) }).await;
        let second = safecall.call_with_rate_limit(&limiter, || async { Ok::<_, String>(2) }).await;

        assert_eq!(first.unwrap(), 1);
        assert!(matches!(second, Err(CallError::RateLimited)));
        assert_eq!(sink.messages_at(LogLevel::Warn), vec!["Rate limited".to_string()]);
    }
}
