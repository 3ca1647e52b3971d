//! Deadline guard
//!
//! The guarded call runs on its own Tokio task. If the deadline passes first,
//! the caller gets [`CallError::Timeout`] while the task keeps running to
//! completion in the background; its result is discarded.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{BoxedError, CallError, CallResult};
use crate::funnel::LogLevel;
use crate::safecall::SafeCall;
use crate::time::runtime_handle;

impl SafeCall {
    /// Run `operation` with a deadline.
    ///
    /// # Errors
    /// - `CallError::Timeout` when `timeout` elapses first
    /// - `CallError::Misconfigured` when no Tokio runtime is available
    pub async fn call_with_timeout<F, Fut, T, E>(&self, timeout: Duration, operation: F) -> CallResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxedError> + Send + 'static,
    {
        let runtime = runtime_handle()?;
        let safecall = self.clone();
        let mut task = runtime.spawn(async move { safecall.call(operation).await });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(CallError::failed(format!("guarded task failed: {join_error}"))),
            Err(_) => {
                debug!(?timeout, "Deadline passed, detaching guarded task");
                self.log(LogLevel::Warn, &format!("Timeout after {}ms", timeout.as_millis()));
                Err(CallError::Timeout)
            }
        }
    }
}
