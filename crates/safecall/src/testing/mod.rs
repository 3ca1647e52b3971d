//! Testing utilities
//!
//! - [`RecordingSink`]: a [`LogSink`] that keeps every message in memory
//! - [`FlakyOperation`]: an operation that fails a fixed number of times
//!   before succeeding
//!
//! ```
//! use safecall::testing::RecordingSink;
//! use safecall::SafeCall;
//!
//! let sink = RecordingSink::new();
//! let safecall = SafeCall::with_sink(sink.clone());
//! # drop(safecall);
//! assert!(sink.is_empty());
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::funnel::{LogLevel, LogSink};

/// In-memory sink; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded `(level, message)` pair
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.lock().clone()
    }

    /// Every recorded message, without levels
    pub fn messages(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(_, message)| message.clone()).collect()
    }

    /// Messages recorded at exactly `level`
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(entry_level, _)| *entry_level == level)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Whether any message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|(_, message)| message.contains(needle))
    }

    /// Number of messages containing `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.entries.lock().iter().filter(|(_, message)| message.contains(needle)).count()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl LogSink for RecordingSink {
    fn log(&self, level: LogLevel, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}

/// Operation that fails `failures` times, then succeeds with the attempt number
#[derive(Debug, Clone)]
pub struct FlakyOperation {
    failures: u32,
    attempts: Arc<AtomicU32>,
}

impl FlakyOperation {
    pub fn new(failures: u32) -> Self {
        Self { failures, attempts: Arc::new(AtomicU32::new(0)) }
    }

    /// An operation that never succeeds
    pub fn always_failing() -> Self {
        Self::new(u32::MAX)
    }

    /// How many times the operation has run
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn run(&self) -> Result<u32, String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            Err(format!("transient failure #{attempt}"))
        } else {
            Ok(attempt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_filters_by_level() {
        let sink = RecordingSink::new();
        sink.log(LogLevel::Warn, "retry 1/3");
        sink.log(LogLevel::Error, "boom");

        assert_eq!(sink.messages_at(LogLevel::Warn), vec!["retry 1/3".to_string()]);
        assert!(sink.contains("boom"));
        assert_eq!(sink.count_containing("retry"), 1);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_flaky_operation_recovers() {
        let flaky = FlakyOperation::new(2);

        assert!(flaky.run().await.is_err());
        assert!(flaky.run().await.is_err());
        assert_eq!(flaky.run().await, Ok(3));
        assert_eq!(flaky.attempts(), 3);
    }
}
