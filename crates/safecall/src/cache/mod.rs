//! Outcome caching
//!
//! - **[`memoize`]**: per-argument memoization with lazy TTL expiry

pub mod memoize;

pub use memoize::{MemoStats, Memoized};
