//! Latency distribution with logarithmic buckets
//!
//! Buckets span 1µs to one hour with a constant ratio between bucket
//! boundaries, so relative precision is the same for fast and slow calls.
//! Recording is lock-free.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

const NUM_BUCKETS: usize = 50;
const MIN_MICROS: u64 = 1;
const MAX_MICROS: u64 = 3_600_000_000;

/// Lock-free latency histogram
#[derive(Debug)]
pub struct LatencyHistogram {
    buckets: [AtomicU64; NUM_BUCKETS],
    count: AtomicU64,
    min_micros: AtomicU64,
    max_micros: AtomicU64,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            count: AtomicU64::new(0),
            min_micros: AtomicU64::new(u64::MAX),
            max_micros: AtomicU64::new(0),
        }
    }

    /// Record one measurement
    pub fn record(&self, duration: Duration) {
        let micros = duration.as_micros().min(u128::from(MAX_MICROS)) as u64;

        self.buckets[bucket_index(micros)].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.min_micros.fetch_min(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Copy the current counters
    pub fn snapshot(&self) -> LatencySnapshot {
        let buckets = std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed));
        LatencySnapshot {
            buckets,
            count: self.count.load(Ordering::Relaxed),
            min_micros: self.min_micros.load(Ordering::Relaxed),
            max_micros: self.max_micros.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for bucket in &self.buckets {
            bucket.store(0, Ordering::Relaxed);
        }
        self.count.store(0, Ordering::Relaxed);
        self.min_micros.store(u64::MAX, Ordering::Relaxed);
        self.max_micros.store(0, Ordering::Relaxed);
    }
}

fn bucket_ratio() -> (f64, f64) {
    static RATIO: OnceLock<(f64, f64)> = OnceLock::new();
    *RATIO.get_or_init(|| {
        let ratio = (MAX_MICROS as f64 / MIN_MICROS as f64).powf(1.0 / (NUM_BUCKETS as f64 - 1.0));
        (ratio, ratio.ln())
    })
}

fn bucket_index(micros: u64) -> usize {
    if micros <= MIN_MICROS {
        return 0;
    }
    let (_, ratio_ln) = bucket_ratio();
    let index = ((micros as f64 / MIN_MICROS as f64).ln() / ratio_ln).floor() as usize;
    index.min(NUM_BUCKETS - 1)
}

/// Representative value of a bucket (geometric midpoint)
fn bucket_midpoint(index: usize) -> u64 {
    if index == 0 {
        return MIN_MICROS;
    }
    let (ratio, _) = bucket_ratio();
    (MIN_MICROS as f64 * ratio.powf(index as f64 + 0.5)).round() as u64
}

/// Immutable copy of a histogram's counters
#[derive(Debug, Clone)]
pub struct LatencySnapshot {
    buckets: [u64; NUM_BUCKETS],
    count: u64,
    min_micros: u64,
    max_micros: u64,
}

impl LatencySnapshot {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> Option<Duration> {
        (self.count > 0).then(|| Duration::from_micros(self.min_micros))
    }

    pub fn max(&self) -> Option<Duration> {
        (self.count > 0).then(|| Duration::from_micros(self.max_micros))
    }

    /// Approximate latency below which a fraction `p` (0.0 to 1.0) of the
    /// measurements fall, clamped to the observed min and max
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        if self.count == 0 || !(0.0..=1.0).contains(&p) {
            return None;
        }

        let rank = ((self.count - 1) as f64 * p).ceil() as u64;
        if rank >= self.count - 1 {
            return self.max();
        }
        let mut seen = 0u64;
        for (index, &count) in self.buckets.iter().enumerate() {
            seen += count;
            if seen > rank {
                let micros = bucket_midpoint(index).clamp(self.min_micros, self.max_micros);
                return Some(Duration::from_micros(micros));
            }
        }
        self.max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = LatencyHistogram::new().snapshot();
        assert_eq!(snapshot.count(), 0);
        assert!(snapshot.min().is_none());
        assert!(snapshot.percentile(0.5).is_none());
    }

    #[test]
    fn test_min_max_are_exact() {
        let histogram = LatencyHistogram::new();
        histogram.record(Duration::from_millis(3));
        histogram.record(Duration::from_millis(40));
        histogram.record(Duration::from_millis(7));

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.min(), Some(Duration::from_millis(3)));
        assert_eq!(snapshot.max(), Some(Duration::from_millis(40)));
    }

    /// Validates percentiles land in the right order of magnitude.
    ///
    /// Assertions:
    /// - p50 of 99 fast calls and 1 slow call stays near the fast value.
    /// - p100 equals the slow call.
    #[test]
    fn test_percentiles_track_distribution() {
        let histogram = LatencyHistogram::new();
        for _ in 0..99 {
            histogram.record(Duration::from_millis(1));
        }
        histogram.record(Duration::from_secs(2));

        let snapshot = histogram.snapshot();
        let p50 = snapshot.percentile(0.5).unwrap();
        assert!(p50 >= Duration::from_micros(500) && p50 <= Duration::from_millis(2), "p50 was {p50:?}");
        assert_eq!(snapshot.percentile(1.0), Some(Duration::from_secs(2)));
        assert!(snapshot.percentile(1.5).is_none());
    }

    #[test]
    fn test_reset() {
        let histogram = LatencyHistogram::new();
        histogram.record(Duration::from_millis(5));
        histogram.reset();
        assert_eq!(histogram.count(), 0);
        assert!(histogram.snapshot().max().is_none());
    }
}
