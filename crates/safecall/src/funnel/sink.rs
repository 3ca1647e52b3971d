//! Pluggable log sink
//!
//! Every diagnostic a policy wants the host to see (captured failures, retry
//! notices, rejections, timeouts) goes through a [`LogSink`]. The default
//! [`TracingSink`] forwards to `tracing` events; hosts that manage their own
//! logging plug in a closure with [`sink_fn`].

use std::fmt;

/// Severity attached to a sink message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Destination for SafeCall diagnostics
pub trait LogSink: Send + Sync + fmt::Debug {
    /// Emit a single message
    fn log(&self, level: LogLevel, message: &str);
}

/// Sink that forwards messages to `tracing` under the `safecall` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "safecall", "{}", message),
            LogLevel::Info => tracing::info!(target: "safecall", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "safecall", "{}", message),
            LogLevel::Error => tracing::error!(target: "safecall", "{}", message),
        }
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

impl LogSink for NoOpSink {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Sink backed by a closure
pub struct FnSink<F> {
    f: F,
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink").finish_non_exhaustive()
    }
}

impl<F> LogSink for FnSink<F>
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    fn log(&self, level: LogLevel, message: &str) {
        (self.f)(level, message);
    }
}

/// Wrap a closure as a [`LogSink`]
///
/// ```
/// use safecall::funnel::sink_fn;
/// use safecall::SafeCall;
///
/// let safecall = SafeCall::with_sink(sink_fn(|level, message| {
///     eprintln!("{level}: {message}");
/// }));
/// # drop(safecall);
/// ```
pub fn sink_fn<F>(f: F) -> FnSink<F>
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    FnSink { f }
}
