//! The [`SafeCall`] context object
//!
//! A `SafeCall` owns everything the policies share: the log sink, the ignore
//! patterns, the global handlers, the retry defaults and veto, and the
//! scheduler table. It is a cheap handle around an `Arc`, so clones observe
//! the same configuration.
//!
//! Policy entry points live next to their state machines:
//!
//! | Entry point | Module |
//! |-------------|--------|
//! | `call_with_retry` | [`resilience::retry`](crate::resilience::retry) |
//! | `call_with_circuit_breaker` | [`resilience::circuit_breaker`](crate::resilience::circuit_breaker) |
//! | `call_with_rate_limit` | [`resilience::rate_limiter`](crate::resilience::rate_limiter) |
//! | `call_with_timeout` | [`resilience::timeout`](crate::resilience::timeout) |
//! | `memoize` | [`cache::memoize`](crate::cache::memoize) |
//! | `call_with_profiler` | [`observability::profiler`](crate::observability::profiler) |
//! | `schedule` | [`time::scheduler`](crate::time::scheduler) |

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::SafeCallConfig;
use crate::error::{BoxedError, CallError, CallResult, ConfigResult};
use crate::funnel::{FailureFunnel, FailureHandler, HandlerId, LogLevel, LogSink, TracingSink};
use crate::invoker::{capture, capture_sync, Captured};
use crate::resilience::RetryConfig;
use crate::time::scheduler::ScheduleRegistry;

/// Predicate consulted after each failed retry attempt.
///
/// Returning `false` stops retrying immediately.
pub type RetryVeto = Arc<dyn Fn(&CallError) -> bool + Send + Sync>;

pub(crate) struct Inner {
    pub(crate) funnel: FailureFunnel,
    pub(crate) retry_defaults: RwLock<RetryConfig>,
    pub(crate) retry_veto: RwLock<Option<RetryVeto>>,
    pub(crate) schedules: ScheduleRegistry,
}

/// Shared context for every guarded call
#[derive(Clone)]
pub struct SafeCall {
    pub(crate) inner: Arc<Inner>,
}

impl fmt::Debug for SafeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeCall")
            .field("funnel", &self.inner.funnel)
            .field("retry_defaults", &*self.inner.retry_defaults.read())
            .field("retry_veto", &self.inner.retry_veto.read().is_some())
            .field("schedules", &self.inner.schedules.names())
            .finish()
    }
}

impl Default for SafeCall {
    fn default() -> Self {
        Self::new()
    }
}

impl SafeCall {
    /// Create a context that logs through `tracing`
    pub fn new() -> Self {
        Self::with_sink(TracingSink)
    }

    /// Create a context with a custom log sink
    pub fn with_sink<S: LogSink + 'static>(sink: S) -> Self {
        Self::with_shared_sink(Arc::new(sink))
    }

    fn with_shared_sink(sink: Arc<dyn LogSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                funnel: FailureFunnel::new(sink),
                retry_defaults: RwLock::new(RetryConfig::default()),
                retry_veto: RwLock::new(None),
                schedules: ScheduleRegistry::new(),
            }),
        }
    }

    /// Create a context from loaded configuration
    ///
    /// # Errors
    /// Returns a `ConfigError` when the retry defaults are invalid or an
    /// ignore pattern does not compile.
    pub fn from_config(config: &SafeCallConfig, sink: Arc<dyn LogSink>) -> ConfigResult<Self> {
        config.validate()?;
        let safecall = Self::with_shared_sink(sink);
        *safecall.inner.retry_defaults.write() = config.retry.clone();
        for pattern in &config.ignore_patterns {
            safecall.add_error_ignore_pattern(pattern)?;
        }
        info!(
            attempts = config.retry.attempts,
            patterns = config.ignore_patterns.len(),
            "SafeCall created from configuration"
        );
        Ok(safecall)
    }

    /// Log through the configured sink
    pub fn log(&self, level: LogLevel, message: &str) {
        self.inner.funnel.log(level, message, None);
    }

    /// Replace the retry defaults used when `call_with_retry` gets no config
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` when `attempts` is zero or the
    /// multiplier is not positive; the previous defaults stay in place.
    pub fn set_retry_defaults(
        &self,
        attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
    ) -> ConfigResult<()> {
        let config = RetryConfig::new(attempts, initial_delay, backoff_multiplier)?;
        debug!(?config, "Updated retry defaults");
        *self.inner.retry_defaults.write() = config;
        Ok(())
    }

    /// Current retry defaults
    pub fn retry_defaults(&self) -> RetryConfig {
        self.inner.retry_defaults.read().clone()
    }

    /// Install the retry veto, replacing any previous one
    pub fn set_retry_veto<F>(&self, veto: F)
    where
        F: Fn(&CallError) -> bool + Send + Sync + 'static,
    {
        *self.inner.retry_veto.write() = Some(Arc::new(veto));
    }

    pub fn clear_retry_veto(&self) {
        *self.inner.retry_veto.write() = None;
    }

    pub(crate) fn retry_veto(&self) -> Option<RetryVeto> {
        self.inner.retry_veto.read().clone()
    }

    /// Suppress failures whose message matches `pattern` (a regular expression)
    pub fn add_error_ignore_pattern(&self, pattern: &str) -> ConfigResult<()> {
        self.inner.funnel.filters().add(pattern)
    }

    /// Register an observer for every unfiltered failure
    pub fn add_global_handler<H: FailureHandler + 'static>(&self, handler: H) -> HandlerId {
        self.inner.funnel.handlers().add(handler)
    }

    /// Unregister an observer; returns `false` when the id is unknown
    pub fn remove_global_handler(&self, id: HandlerId) -> bool {
        self.inner.funnel.handlers().remove(id)
    }

    /// Run a failure through the funnel.
    ///
    /// Only operation failures are reported; rejections and misconfiguration
    /// are returned without touching the sink. Returns whether the failure
    /// reached the sink.
    pub fn report_failure(&self, error: &CallError, context: Option<&str>) -> bool {
        if !error.is_failure() {
            return false;
        }
        self.inner.funnel.report(&error.message(), context)
    }

    fn settle<T>(&self, outcome: Result<T, Captured>, context: Option<&str>) -> CallResult<T> {
        outcome.map_err(|Captured { mut error, .. }| {
            if error.needs_report() {
                self.report_failure(&error, context);
                error.mark_reported();
            }
            error
        })
    }

    /// Invoke an async operation, capturing `Err` values and panics
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> CallResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxedError>,
    {
        let outcome = capture(operation).await;
        self.settle(outcome, None)
    }

    /// Like [`call`](Self::call), tagging reported failures with `context`
    pub async fn call_with_context<F, Fut, T, E>(&self, context: &str, operation: F) -> CallResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxedError>,
    {
        let outcome = capture(operation).await;
        self.settle(outcome, Some(context))
    }

    /// Invoke a synchronous operation, capturing `Err` values and panics
    pub fn call_sync<F, T, E>(&self, operation: F) -> CallResult<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Into<BoxedError>,
    {
        self.settle(capture_sync(operation), None)
    }

    pub fn call_sync_with_context<F, T, E>(&self, context: &str, operation: F) -> CallResult<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Into<BoxedError>,
    {
        self.settle(capture_sync(operation), Some(context))
    }

    /// Stop every scheduled loop
    pub fn shutdown(&self) {
        let stopped = self.inner.schedules.stop_all();
        info!(stopped, "SafeCall shut down");
    }
}
