//! Policy overhead benchmarks
//!
//! Measures the cost each policy adds around an operation that completes
//! immediately: plain capture, circuit breaker (closed and open), rate
//! limiter admission and memo hits.
//!
//! Run with: `cargo bench --bench policies_bench -p safecall`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use safecall::funnel::NoOpSink;
use safecall::resilience::{CircuitBreaker, CircuitBreakerConfig, RateLimiter, RetryConfig};
use safecall::{Profiler, SafeCall};
use tokio::runtime::Builder as RuntimeBuilder;

fn build_runtime() -> tokio::runtime::Runtime {
    RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime should build for benchmarks")
}

// ============================================================================
// Capture Benchmarks
// ============================================================================

fn bench_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("capture");
    let runtime = build_runtime();
    let safecall = SafeCall::with_sink(NoOpSink);

    group.bench_function("call_success", |b| {
        b.to_async(&runtime).iter(|| async {
            let result = safecall.call(|| async { Ok::<_, std::io::Error>(black_box(1u64)) }).await;
            black_box(result)
        });
    });

    group.bench_function("call_failure", |b| {
        b.to_async(&runtime).iter(|| async {
            let result =
                safecall.call(|| async { Err::<u64, _>(std::io::Error::other("bench failure")) }).await;
            black_box(result)
        });
    });

    group.bench_function("call_sync_success", |b| {
        b.iter(|| black_box(safecall.call_sync(|| Ok::<_, std::io::Error>(black_box(1u64)))));
    });

    group.finish();
}

// ============================================================================
// Policy Benchmarks
// ============================================================================

fn bench_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("policies");
    let runtime = build_runtime();
    let safecall = SafeCall::with_sink(NoOpSink);

    group.bench_function("circuit_breaker_closed", |b| {
        let breaker = CircuitBreaker::with_defaults();
        b.to_async(&runtime).iter(|| async {
            let result = safecall
                .call_with_circuit_breaker(&breaker, || async { Ok::<_, std::io::Error>(()) })
                .await;
            black_box(result)
        });
    });

    group.bench_function("circuit_breaker_open", |b| {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .reset_timeout(Duration::from_secs(3600))
            .build()
            .expect("valid circuit breaker config for benchmarks");
        let breaker = CircuitBreaker::new(config).expect("circuit breaker should build");
        breaker.record_failure();

        b.to_async(&runtime).iter(|| async {
            let result = safecall
                .call_with_circuit_breaker(&breaker, || async { Ok::<_, std::io::Error>(()) })
                .await;
            black_box(result)
        });
    });

    group.bench_function("rate_limiter_admit", |b| {
        let limiter = RateLimiter::per_window(usize::MAX >> 1, Duration::from_millis(1))
            .expect("rate limiter should build");
        b.to_async(&runtime).iter(|| async {
            let result =
                safecall.call_with_rate_limit(&limiter, || async { Ok::<_, std::io::Error>(()) }).await;
            black_box(result)
        });
    });

    group.bench_function("retry_first_attempt", |b| {
        let config = RetryConfig::new(3, Duration::ZERO, 1.0).expect("valid retry config");
        b.to_async(&runtime).iter(|| async {
            let result = safecall
                .call_with_retry(Some(config.clone()), || async { Ok::<_, std::io::Error>(()) })
                .await;
            black_box(result)
        });
    });

    group.bench_function("profiler_record", |b| {
        let profiler = Profiler::default();
        b.to_async(&runtime).iter(|| async {
            let result =
                safecall.call_with_profiler(&profiler, || async { Ok::<_, std::io::Error>(()) }).await;
            black_box(result)
        });
    });

    group.finish();
}

// ============================================================================
// Memoization Benchmarks
// ============================================================================

fn bench_memoize(c: &mut Criterion) {
    let mut group = c.benchmark_group("memoize");
    let runtime = build_runtime();
    let safecall = SafeCall::with_sink(NoOpSink);

    for keys in [1u64, 64, 1024] {
        let memo = safecall.memoize(
            |key: u64| async move { Ok::<_, std::io::Error>(key.wrapping_mul(31)) },
            Some(Duration::from_secs(3600)),
        );
        runtime.block_on(async {
            for key in 0..keys {
                let _ = memo.call(key).await;
            }
        });

        group.bench_with_input(BenchmarkId::new("hit", keys), &keys, |b, &keys| {
            let mut next = 0u64;
            b.to_async(&runtime).iter(|| {
                next = (next + 1) % keys;
                let key = next;
                let memo = &memo;
                async move { black_box(memo.call(key).await) }
            });
        });
    }

    group.finish();
}

criterion_group!(policies, bench_capture, bench_policies, bench_memoize);
criterion_main!(policies);
