//! Call profiling
//!
//! A [`Profiler`] aggregates every call made through
//! [`SafeCall::call_with_profiler`]: call, error and slow-call counts, total
//! time, and a latency histogram for min/max/percentiles. Counters only grow
//! until [`Profiler::reset`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

use super::histogram::LatencyHistogram;
use crate::error::{BoxedError, CallResult};
use crate::funnel::LogLevel;
use crate::safecall::SafeCall;

/// Point-in-time view of a profiler
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSnapshot {
    pub call_count: u64,
    pub error_count: u64,
    pub slow_call_count: u64,
    pub total_time: Duration,
    /// `total_time / call_count`, zero when nothing was recorded
    pub avg_time: Duration,
    /// `error_count / call_count`, zero when nothing was recorded
    pub error_rate: f64,
    /// `slow_call_count / call_count`, zero when nothing was recorded
    pub slow_call_rate: f64,
    pub min_time: Option<Duration>,
    pub max_time: Option<Duration>,
    pub p50: Option<Duration>,
    pub p95: Option<Duration>,
    pub p99: Option<Duration>,
}

/// Aggregated timing statistics for a family of calls
#[derive(Debug)]
pub struct Profiler {
    name: Option<String>,
    slow_threshold: Duration,
    call_count: AtomicU64,
    error_count: AtomicU64,
    slow_call_count: AtomicU64,
    total_nanos: AtomicU64,
    histogram: LatencyHistogram,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Profiler {
    /// Create a profiler flagging calls slower than `slow_threshold`
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            name: None,
            slow_threshold,
            call_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            slow_call_count: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
            histogram: LatencyHistogram::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// Record one call; returns whether it counted as slow
    pub fn record(&self, duration: Duration, success: bool) -> bool {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }

        let slow = duration > self.slow_threshold;
        if slow {
            self.slow_call_count.fetch_add(1, Ordering::Relaxed);
        }

        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let _ = self.total_nanos.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |total| {
            Some(total.saturating_add(nanos))
        });
        self.histogram.record(duration);
        slow
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        let call_count = self.call_count.load(Ordering::Relaxed);
        let error_count = self.error_count.load(Ordering::Relaxed);
        let slow_call_count = self.slow_call_count.load(Ordering::Relaxed);
        let total_time = Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed));
        let latency = self.histogram.snapshot();

        let ratio = |count: u64| if call_count == 0 { 0.0 } else { count as f64 / call_count as f64 };
        let avg_time = if call_count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed) / call_count)
        };

        ProfileSnapshot {
            call_count,
            error_count,
            slow_call_count,
            total_time,
            avg_time,
            error_rate: ratio(error_count),
            slow_call_rate: ratio(slow_call_count),
            min_time: latency.min(),
            max_time: latency.max(),
            p50: latency.percentile(0.50),
            p95: latency.percentile(0.95),
            p99: latency.percentile(0.99),
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        self.slow_call_count.store(0, Ordering::Relaxed);
        self.total_nanos.store(0, Ordering::Relaxed);
        self.histogram.reset();
        debug!(profiler = self.name.as_deref().unwrap_or("unnamed"), "Profiler reset");
    }
}

impl SafeCall {
    /// Run `operation`, recording its duration and outcome in `profiler`
    pub async fn call_with_profiler<F, Fut, T, E>(&self, profiler: &Profiler, operation: F) -> CallResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxedError>,
    {
        let start = tokio::time::Instant::now();
        let result = self.call(operation).await;
        let elapsed = start.elapsed();

        if profiler.record(elapsed, result.is_ok()) {
            let label = profiler.name().map(|name| format!(" [{name}]")).unwrap_or_default();
            self.log(LogLevel::Warn, &format!("Slow call{label}: {}ms", elapsed.as_millis()));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    #[test]
    fn test_empty_profiler_has_zero_ratios() {
        let snapshot = Profiler::default().snapshot();

        assert_eq!(snapshot.call_count, 0);
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.slow_call_rate, 0.0);
        assert_eq!(snapshot.avg_time, Duration::ZERO);
        assert!(snapshot.p50.is_none());
    }

    /// Validates derived ratios.
    ///
    /// Assertions:
    /// - 1 error out of 4 calls gives an error rate of 0.25.
    /// - 2 calls over the threshold give a slow-call rate of 0.5.
    /// - The average is total time over call count.
    #[test]
    fn test_record_derives_ratios() {
        let profiler = Profiler::new(Duration::from_millis(100));
        profiler.record(Duration::from_millis(50), true);
        profiler.record(Duration::from_millis(150), true);
        profiler.record(Duration::from_millis(250), false);
        profiler.record(Duration::from_millis(100), true);

        let snapshot = profiler.snapshot();
        assert_eq!(snapshot.call_count, 4);
        assert_eq!(snapshot.error_rate, 0.25);
        assert_eq!(snapshot.slow_call_rate, 0.5);
        assert_eq!(snapshot.total_time, Duration::from_millis(550));
        assert_eq!(snapshot.avg_time, Duration::from_micros(137_500));
        assert_eq!(snapshot.min_time, Some(Duration::from_millis(50)));
        assert_eq!(snapshot.max_time, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let profiler = Profiler::new(Duration::from_millis(1));
        profiler.record(Duration::from_millis(5), false);
        profiler.reset();

        let snapshot = profiler.snapshot();
        assert_eq!(snapshot.call_count, 0);
        assert_eq!(snapshot.error_count, 0);
        assert!(snapshot.max_time.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_is_logged() {
        let sink = RecordingSink::new();
        let safecall = SafeCall::with_sink(sink.clone());
        let profiler = Profiler::new(Duration::from_millis(100)).with_name("report");

        let _ = safecall
            .call_with_profiler(&profiler, || async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok::<_, String>(())
            })
            .await;

        let snapshot = profiler.snapshot();
        assert_eq!(snapshot.slow_call_count, 1);
        assert!(snapshot.total_time >= Duration::from_millis(300));
        assert!(sink.contains("Slow call [report]"));
    }
}
