//! Call observability
//!
//! - **[`profiler`]**: call/error/slow-call counters and timing statistics
//! - **[`histogram`]**: lock-free latency distribution backing the profiler

pub mod histogram;
pub mod profiler;

pub use histogram::{LatencyHistogram, LatencySnapshot};
pub use profiler::{ProfileSnapshot, Profiler};
