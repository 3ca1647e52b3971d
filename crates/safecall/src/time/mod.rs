//! Runtime access and periodic scheduling
//!
//! - **[`scheduler`]**: named periodic loops, deduplicated by name
//!
//! Every policy that suspends (retry backoff, timeout, scheduler) needs a
//! Tokio runtime with its timer driver enabled. [`runtime_handle`] turns a
//! missing runtime or a runtime without timers into a
//! `CallError::Misconfigured` instead of a panic.

pub mod scheduler;

use std::panic::catch_unwind;
use std::time::Duration;

use tokio::runtime::Handle;

pub use scheduler::ScheduleHandle;

use crate::error::{CallError, CallResult};

/// Handle to the Tokio runtime driving the current task
///
/// # Errors
/// Returns `CallError::Misconfigured` when called outside a runtime, or when
/// the runtime was built without `enable_time()`.
pub fn runtime_handle() -> CallResult<Handle> {
    let handle = Handle::try_current()
        .map_err(|e| CallError::misconfigured(format!("no Tokio runtime available: {e}")))?;

    // Creating a `Sleep` panics when the timer driver is missing
    if catch_unwind(|| drop(tokio::time::sleep(Duration::ZERO))).is_err() {
        return Err(CallError::misconfigured(
            "Tokio runtime has no timer driver; build it with enable_time()",
        ));
    }
    Ok(handle)
}
