//! Memoization with TTL expiry
//!
//! A [`Memoized`] function caches the full outcome of each invocation,
//! failures included, keyed by the argument value itself. Use a tuple when
//! the operation takes several arguments. Entries expire lazily: a read that
//! finds an entry whose age is at least the TTL evicts it and invokes the
//! operation again. Nothing sweeps the cache in the background.
//!
//! Concurrent misses on the same key may both invoke the operation; the last
//! one to finish wins the slot.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::clock::{Clock, SystemClock};
use crate::error::{BoxedError, CallResult};
use crate::safecall::SafeCall;

/// Statistics for memo cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoStats {
    /// Current number of cached outcomes
    pub entries: usize,
    /// Reads served from the cache
    pub hits: u64,
    /// Reads that invoked the operation
    pub misses: u64,
    /// Entries evicted because their TTL had passed
    pub expirations: u64,
}

impl MemoStats {
    /// Calculate hit rate (hits / total reads)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct MemoEntry<T> {
    outcome: CallResult<T>,
    cached_at: Instant,
}

/// A memoized operation created by [`SafeCall::memoize`]
pub struct Memoized<A, T, F, C: Clock = SystemClock> {
    safecall: SafeCall,
    operation: F,
    ttl: Option<Duration>,
    entries: Mutex<HashMap<A, MemoEntry<T>>>,
    clock: C,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl<A, T, F, C: Clock> fmt::Debug for Memoized<A, T, F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.lock().len())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl<A, T, F, Fut, E, C> Memoized<A, T, F, C>
where
    A: Hash + Eq + Clone,
    T: Clone,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxedError>,
    C: Clock,
{
    /// Return the cached outcome for `args`, invoking the operation when no
    /// fresh entry exists
    pub async fn call(&self, args: A) -> CallResult<T> {
        if let Some(outcome) = self.lookup(&args) {
            return outcome;
        }

        let outcome = self.safecall.call(|| (self.operation)(args.clone())).await;
        let entry = MemoEntry { outcome: outcome.clone(), cached_at: self.clock.now() };
        self.entries.lock().insert(args, entry);
        outcome
    }

    fn lookup(&self, args: &A) -> Option<CallResult<T>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        match entries.get(args) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) if self.is_fresh(entry.cached_at, now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.outcome.clone());
            }
            Some(_) => {}
        }

        entries.remove(args);
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.expirations.fetch_add(1, Ordering::Relaxed);
        trace!("Memo entry expired");
        None
    }
}

impl<A, T, F, C> Memoized<A, T, F, C>
where
    A: Hash + Eq,
    C: Clock,
{
    fn is_fresh(&self, cached_at: Instant, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.duration_since(cached_at) < ttl,
            None => true,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Drop the cached outcome for `args`; returns whether one existed
    pub fn invalidate(&self, args: &A) -> bool {
        self.entries.lock().remove(args).is_some()
    }

    /// Drop every cached outcome
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of cached outcomes, including ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

impl SafeCall {
    /// Wrap `operation` in a cache keyed by its argument.
    ///
    /// `ttl = None` keeps outcomes forever.
    pub fn memoize<A, T, F, Fut, E>(&self, operation: F, ttl: Option<Duration>) -> Memoized<A, T, F>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.memoize_with_clock(operation, ttl, SystemClock)
    }

    /// [`memoize`](Self::memoize) with a custom clock (useful for testing)
    pub fn memoize_with_clock<A, T, F, Fut, E, C>(
        &self,
        operation: F,
        ttl: Option<Duration>,
        clock: C,
    ) -> Memoized<A, T, F, C>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Clock,
    {
        Memoized {
            safecall: self.clone(),
            operation,
            ttl,
            entries: Mutex::new(HashMap::new()),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    use super::*;
    use crate::clock::MockClock;
    use crate::error::CallError;
    use crate::testing::RecordingSink;

    fn counted(
        counter: &Arc<AtomicU32>,
    ) -> impl Fn(u32) -> std::future::Ready<Result<u32, String>> {
        let counter = Arc::clone(counter);
        move |x| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(x * 2))
        }
    }

    /// Validates a fresh entry is served without invoking the operation.
    ///
    /// Assertions:
    /// - The operation runs once for two reads within the TTL.
    /// - Stats report one hit and one miss.
    #[tokio::test]
    async fn test_fresh_entry_is_cached() {
        let safecall = SafeCall::with_sink(RecordingSink::new());
        let counter = Arc::new(AtomicU32::new(0));
        let double = safecall.memoize(counted(&counter), Some(Duration::from_secs(60)));

        assert_eq!(double.call(21).await.unwrap(), 42);
        assert_eq!(double.call(21).await.unwrap(), 42);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let stats = double.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_entry_expires_when_age_reaches_ttl() {
        let safecall = SafeCall::with_sink(RecordingSink::new());
        let clock = MockClock::new();
        let counter = Arc::new(AtomicU32::new(0));
        let double =
            safecall.memoize_with_clock(counted(&counter), Some(Duration::from_millis(100)), clock.clone());

        double.call(1).await.unwrap();
        clock.advance_millis(99);
        double.call(1).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        clock.advance_millis(1);
        double.call(1).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(double.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_no_ttl_never_expires() {
        let safecall = SafeCall::with_sink(RecordingSink::new());
        let clock = MockClock::new();
        let counter = Arc::new(AtomicU32::new(0));
        let double = safecall.memoize_with_clock(counted(&counter), None, clock.clone());

        double.call(5).await.unwrap();
        clock.advance(Duration::from_secs(86_400 * 365));
        double.call(5).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_cached() {
        let sink = RecordingSink::new();
        let safecall = SafeCall::with_sink(sink.clone());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let lookup = safecall.memoize(
            move |user: String| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async move { Err::<u32, _>(format!("no such user: {user}")) }
            },
            None,
        );

        let first = lookup.call("ada".to_string()).await.unwrap_err();
        let second = lookup.call("ada".to_string()).await.unwrap_err();

        assert!(matches!(first, CallError::Failed { .. }));
        assert_eq!(first.message(), second.message());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.count_containing("no such user"), 1);
    }

    #[tokio::test]
    async fn test_tuple_keys_do_not_collide() {
        let safecall = SafeCall::with_sink(RecordingSink::new());
        let join = safecall.memoize(
            |(a, b): (String, String)| async move { Ok::<_, String>(format!("{a}|{b}")) },
            None,
        );

        let first = join.call(("a,b".to_string(), "c".to_string())).await.unwrap();
        let second = join.call(("a".to_string(), "b,c".to_string())).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(join.len(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let safecall = SafeCall::with_sink(RecordingSink::new());
        let counter = Arc::new(AtomicU32::new(0));
        let double = safecall.memoize(counted(&counter), None);

        double.call(1).await.unwrap();
        double.call(2).await.unwrap();
        assert!(double.invalidate(&1));
        assert!(!double.invalidate(&1));

        double.call(1).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        double.clear();
        assert!(double.is_empty());
    }
}
