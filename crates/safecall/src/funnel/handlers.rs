//! Global failure observers
//!
//! Handlers see every failure that survives the ignore patterns. A panicking
//! handler is isolated: the panic is caught, logged through the sink, and the
//! remaining handlers still run.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::warn;

use super::sink::{LogLevel, LogSink};
use crate::invoker::panic_message;

/// A failure as seen by global handlers
#[derive(Debug, Clone)]
pub struct FailureEvent {
    /// Failure message
    pub message: String,
    /// Backtrace of the reporting thread, taken when the failure enters the
    /// funnel rather than where it was raised.
    ///
    /// `None` unless backtraces are enabled (`RUST_BACKTRACE` or
    /// `RUST_LIB_BACKTRACE`); a panic's own location is in `message`.
    pub stack_trace: Option<String>,
    /// Caller-supplied context tag
    pub context: Option<String>,
    pub occurred_at: SystemTime,
}

impl FailureEvent {
    /// Build an event, capturing the current backtrace
    pub fn capture(message: impl Into<String>, context: Option<&str>) -> Self {
        Self {
            message: message.into(),
            stack_trace: captured_backtrace(),
            context: context.map(str::to_string),
            occurred_at: SystemTime::now(),
        }
    }
}

fn captured_backtrace() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

/// Observer notified on every unfiltered failure
pub trait FailureHandler: Send + Sync {
    fn on_failure(&self, event: &FailureEvent);
}

impl<F> FailureHandler for F
where
    F: Fn(&FailureEvent) + Send + Sync,
{
    fn on_failure(&self, event: &FailureEvent) {
        self(event);
    }
}

/// Identifier returned on registration, used for removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Read-mostly registry of failure handlers
#[derive(Default)]
pub struct GlobalHandlerRegistry {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(HandlerId, Arc<dyn FailureHandler>)>>,
}

impl fmt::Debug for GlobalHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalHandlerRegistry").field("handlers", &self.len()).finish()
    }
}

impl GlobalHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler
    pub fn add<H: FailureHandler + 'static>(&self, handler: H) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler; returns `false` when the id is unknown
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify every handler, returning how many of them panicked.
    ///
    /// Handlers run against a snapshot so they may register or remove
    /// handlers without deadlocking.
    pub fn dispatch(&self, event: &FailureEvent, sink: &dyn LogSink) -> usize {
        let snapshot: Vec<(HandlerId, Arc<dyn FailureHandler>)> = self.handlers.read().clone();

        let mut failed = 0;
        for (id, handler) in snapshot {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler.on_failure(event))) {
                failed += 1;
                let reason = panic_message(payload.as_ref());
                warn!(handler = %id, %reason, "Global failure handler panicked");
                sink.log(LogLevel::Error, &format!("Global error handler {id} failed: {reason}"));
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::funnel::sink::NoOpSink;

    #[test]
    fn test_add_remove_handlers() {
        let registry = GlobalHandlerRegistry::new();
        let first = registry.add(|_: &FailureEvent| {});
        let second = registry.add(|_: &FailureEvent| {});

        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
        assert!(registry.remove(first));
        assert!(!registry.remove(first));
        assert_eq!(registry.len(), 1);
    }

    /// Validates `stack_trace` holds a real backtrace or nothing, never the
    /// "disabled backtrace" placeholder.
    #[test]
    fn test_event_stack_trace_is_real_or_absent() {
        let event = FailureEvent::capture("disk full", Some("uploader"));

        assert_eq!(event.context.as_deref(), Some("uploader"));
        match &event.stack_trace {
            Some(trace) => {
                assert!(!trace.is_empty());
                assert!(!trace.contains("disabled backtrace"));
            }
            None => assert_ne!(Backtrace::capture().status(), BacktraceStatus::Captured),
        }
    }

    #[test]
    fn test_panicking_handler_does_not_stop_dispatch() {
        let registry = GlobalHandlerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        registry.add(|_: &FailureEvent| panic!("handler exploded"));
        let calls_clone = Arc::clone(&calls);
        registry.add(move |event: &FailureEvent| {
            assert_eq!(event.message, "boom");
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let event = FailureEvent::capture("boom", Some("checkout"));
        let failed = registry.dispatch(&event, &NoOpSink);

        assert_eq!(failed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_carries_context() {
        let event = FailureEvent::capture("boom", Some("payments"));
        assert_eq!(event.context.as_deref(), Some("payments"));
        assert_eq!(event.message, "boom");
    }
}
