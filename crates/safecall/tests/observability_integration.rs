//! Integration tests for the call profiler

use std::time::Duration;

use safecall::testing::RecordingSink;
use safecall::{LogLevel, Profiler, SafeCall};

/// Validates profiler ratios after `n` calls with `e` failures and `s` slow
/// calls.
///
/// # Test Steps
/// 1. Run 10 calls through the profiler with a 50ms slow threshold
/// 2. Make calls 0, 3 and 6 fail and calls 0 and 5 sleep 80ms
/// 3. Verify error rate 0.3, slow-call rate 0.2 and two slow-call warnings
#[tokio::test(start_paused = true)]
async fn test_profiler_ratios() {
    let sink = RecordingSink::new();
    let safecall = SafeCall::with_sink(sink.clone());
    let profiler = Profiler::new(Duration::from_millis(50));

    for i in 0..10u32 {
        let _ = safecall
            .call_with_profiler(&profiler, || async move {
                if i % 5 == 0 {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                }
                if i % 3 == 0 && i < 9 {
                    Err(format!("call {i} failed"))
                } else {
                    Ok(i)
                }
            })
            .await;
    }

    let snapshot = profiler.snapshot();
    assert_eq!(snapshot.call_count, 10);
    assert_eq!(snapshot.error_count, 3);
    assert_eq!(snapshot.slow_call_count, 2);
    assert!((snapshot.error_rate - 0.3).abs() < f64::EPSILON);
    assert!((snapshot.slow_call_rate - 0.2).abs() < f64::EPSILON);
    assert!(snapshot.max_time.expect("calls recorded") >= Duration::from_millis(80));
    assert!(snapshot.p50.expect("calls recorded") < Duration::from_millis(50));

    let slow_warnings = sink
        .messages_at(LogLevel::Warn)
        .into_iter()
        .filter(|message| message.starts_with("Slow call"))
        .count();
    assert_eq!(slow_warnings, 2);
}

#[test]
fn test_empty_profiler_reports_zero_rates() {
    let snapshot = Profiler::new(Duration::from_millis(10)).snapshot();

    assert_eq!(snapshot.error_rate, 0.0);
    assert_eq!(snapshot.slow_call_rate, 0.0);
    assert_eq!(snapshot.avg_time, Duration::ZERO);
}

#[tokio::test]
async fn test_profiler_reset_starts_fresh() {
    let safecall = SafeCall::with_sink(RecordingSink::new());
    let profiler = Profiler::default();

    let _ = safecall.call_with_profiler(&profiler, || async { Err::<(), _>("nope") }).await;
    assert_eq!(profiler.snapshot().error_count, 1);

    profiler.reset();
    let _ = safecall.call_with_profiler(&profiler, || async { Ok::<_, String>(()) }).await;

    let snapshot = profiler.snapshot();
    assert_eq!(snapshot.call_count, 1);
    assert_eq!(snapshot.error_rate, 0.0);
}
