//! Circuit breaker
//!
//! A breaker gates calls on recent failure history:
//!
//! ```text
//!            failures >= threshold
//!   CLOSED ------------------------> OPEN
//!     ^                               |
//!     | success        reset_timeout  |
//!     |                elapsed        v
//!     +-------------------------- HALF_OPEN
//! ```
//!
//! While `OPEN`, calls are rejected with [`CallError::CircuitOpen`] without
//! running the operation. Once strictly more than `reset_timeout` has passed
//! since the last failure, the next call moves the breaker to `HALF_OPEN`
//! with a zeroed failure count and lets the call through. A success closes
//! the breaker; failures in `HALF_OPEN` accumulate toward the full threshold
//! again.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{BoxedError, CallError, CallResult, ConfigError, ConfigResult};
use crate::safecall::SafeCall;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected
    Open,
    /// Calls flow again to probe for recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,
    /// Time since the last failure before an open circuit lets a probe through
    #[serde(rename = "reset_timeout_ms", with = "crate::config::duration_millis")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, reset_timeout: Duration::from_secs(60) }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub name: Option<String>,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Calls admitted through the breaker
    pub total_calls: u64,
    /// Calls rejected while open
    pub rejected_calls: u64,
    pub last_failure_time: Option<Instant>,
    pub state_changed_at: Instant,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    state_changed_at: Instant,
}

impl BreakerState {
    fn transition(&mut self, to: CircuitState, now: Instant) {
        self.state = to;
        self.state_changed_at = now;
    }
}

/// Per-instance circuit breaker
///
/// Clones share state, so a breaker can be handed to several tasks that
/// guard the same dependency.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: Option<String>,
    config: CircuitBreakerConfig,
    state: Arc<Mutex<BreakerState>>,
    total_calls: Arc<AtomicU64>,
    rejected_calls: Arc<AtomicU64>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &state.state)
            .field("failure_count", &state.failure_count)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            total_calls: Arc::clone(&self.total_calls),
            rejected_calls: Arc::clone(&self.rejected_calls),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a circuit breaker using the system clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a circuit breaker with the default threshold and reset timeout
    pub fn with_defaults() -> Self {
        Self::from_valid(CircuitBreakerConfig::default(), SystemClock)
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::from_valid(config, clock))
    }

    fn from_valid(config: CircuitBreakerConfig, clock: C) -> Self {
        let now = clock.now();
        Self {
            name: None,
            config,
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                state_changed_at: now,
            })),
            total_calls: Arc::new(AtomicU64::new(0)),
            rejected_calls: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(clock),
        }
    }

    /// Attach a name used in log output
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    /// Decide whether a call may run, moving `OPEN` to `HALF_OPEN` once the
    /// reset timeout has passed.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.state == CircuitState::Open {
            let cooled_down = state
                .last_failure_time
                .map_or(true, |failed_at| now.duration_since(failed_at) > self.config.reset_timeout);
            if cooled_down {
                state.transition(CircuitState::HalfOpen, now);
                state.failure_count = 0;
                info!(breaker = self.label(), "Circuit breaker half-open, probing");
            }
        }

        if state.state == CircuitState::Open {
            self.rejected_calls.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        self.total_calls.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.state == CircuitState::HalfOpen {
            state.transition(CircuitState::Closed, now);
            info!(breaker = self.label(), "Circuit breaker closed after successful probe");
        }
        state.failure_count = 0;
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();

        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_time = Some(now);

        if state.failure_count >= self.config.failure_threshold && state.state != CircuitState::Open {
            let failures = state.failure_count;
            state.transition(CircuitState::Open, now);
            warn!(breaker = self.label(), failures, "Circuit breaker opened");
        }
    }

    /// Current state, without applying the reset-timeout transition
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// Snapshot of the breaker's counters
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.state.lock();
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            last_failure_time: state.last_failure_time,
            state_changed_at: state.state_changed_at,
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.transition(CircuitState::Closed, now);
        state.failure_count = 0;
        state.last_failure_time = None;
        info!(breaker = self.label(), "Circuit breaker manually reset to closed state");
    }
}

impl SafeCall {
    /// Run `operation` behind `breaker`.
    ///
    /// # Errors
    /// Returns `CallError::CircuitOpen` without running the operation while
    /// the breaker is open, otherwise the operation's own outcome.
    #[instrument(skip_all, fields(breaker = breaker.name().unwrap_or("unnamed")))]
    pub async fn call_with_circuit_breaker<C, F, Fut, T, E>(
        &self,
        breaker: &CircuitBreaker<C>,
        operation: F,
    ) -> CallResult<T>
    where
        C: Clock,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxedError>,
    {
        if !breaker.try_acquire() {
            debug!("Circuit breaker rejecting call");
            return Err(CallError::CircuitOpen);
        }

        let result = self.call(operation).await;
        match &result {
            Ok(_) => breaker.record_success(),
            Err(_) => breaker.record_failure(),
        }
        result
    }
}
