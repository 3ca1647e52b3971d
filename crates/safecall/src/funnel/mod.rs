//! Failure funnel: ignore patterns, log sink, global handlers
//!
//! Every operation failure captured by a [`SafeCall`](crate::SafeCall) goes
//! through the same three stages, in order:
//!
//! 1. **[`filter`]**: a match against any ignore pattern suppresses the failure
//!    from observability (the caller still gets the failed result)
//! 2. **[`sink`]**: the failure is logged, prefixed with its context tag
//! 3. **[`handlers`]**: every global handler receives a [`FailureEvent`]

pub mod filter;
pub mod handlers;
pub mod sink;

use std::fmt;
use std::sync::Arc;

pub use filter::ErrorFilterChain;
pub use handlers::{FailureEvent, FailureHandler, GlobalHandlerRegistry, HandlerId};
pub use sink::{sink_fn, FnSink, LogLevel, LogSink, NoOpSink, TracingSink};

/// The three funnel stages bundled together
pub struct FailureFunnel {
    sink: Arc<dyn LogSink>,
    filters: ErrorFilterChain,
    handlers: GlobalHandlerRegistry,
}

impl fmt::Debug for FailureFunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureFunnel")
            .field("sink", &self.sink)
            .field("filters", &self.filters.len())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl FailureFunnel {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink, filters: ErrorFilterChain::new(), handlers: GlobalHandlerRegistry::new() }
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    pub fn filters(&self) -> &ErrorFilterChain {
        &self.filters
    }

    pub fn handlers(&self) -> &GlobalHandlerRegistry {
        &self.handlers
    }

    /// Log a message with an optional `[context]` prefix
    pub fn log(&self, level: LogLevel, message: &str, context: Option<&str>) {
        match context {
            Some(tag) => self.sink.log(level, &format!("[{tag}] {message}")),
            None => self.sink.log(level, message),
        }
    }

    /// Run a failure through the funnel.
    ///
    /// Returns `false` when an ignore pattern suppressed it.
    pub fn report(&self, message: &str, context: Option<&str>) -> bool {
        if self.filters.is_suppressed(message) {
            tracing::trace!(message, "Failure suppressed by ignore pattern");
            return false;
        }

        self.log(LogLevel::Error, message, context);

        if !self.handlers.is_empty() {
            let event = FailureEvent::capture(message, context);
            self.handlers.dispatch(&event, self.sink.as_ref());
        }
        true
    }
}
