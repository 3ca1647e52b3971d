//! Failure capture
//!
//! The invoker is the atomic unit every policy wraps. It runs an operation
//! and converts any failure into a [`CallError`] instead of letting it escape:
//!
//! - `Err(e)` becomes `CallError::Failed` carrying `e`'s message and `e`
//!   itself as the cause
//! - a panic becomes `CallError::Failed` carrying the panic payload
//! - a `CallError` returned by a nested policy is passed through untouched
//!
//! These functions do not report anything; [`SafeCall::call`](crate::SafeCall::call)
//! adds the failure funnel on top.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use futures::FutureExt;

use crate::error::{BoxedError, CallError, CallResult};

/// A captured failure and where it came from
#[derive(Debug, Clone)]
pub struct Captured {
    pub error: CallError,
    /// `true` when a nested policy already handled the error: a rejection,
    /// a misconfiguration, or a failure that went through a funnel
    pub nested: bool,
}

impl Captured {
    fn from_error<E: Into<BoxedError>>(error: E) -> Self {
        let error = CallError::from_boxed(error.into());
        let nested = !error.needs_report();
        Self { error, nested }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = panic_message(payload.as_ref());
        Self { error: CallError::failed(format!("panicked: {message}")), nested: false }
    }
}

/// Run an async operation, capturing errors and panics
pub async fn capture<F, Fut, T, E>(operation: F) -> Result<T, Captured>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxedError>,
{
    match AssertUnwindSafe(async move { operation().await }).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Captured::from_error(error)),
        Err(payload) => Err(Captured::from_panic(payload)),
    }
}

/// Run a synchronous operation, capturing errors and panics
pub fn capture_sync<F, T, E>(operation: F) -> Result<T, Captured>
where
    F: FnOnce() -> Result<T, E>,
    E: Into<BoxedError>,
{
    match catch_unwind(AssertUnwindSafe(operation)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Captured::from_error(error)),
        Err(payload) => Err(Captured::from_panic(payload)),
    }
}

/// Run an async operation and return its outcome as a [`CallResult`]
pub async fn invoke<F, Fut, T, E>(operation: F) -> CallResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxedError>,
{
    capture(operation).await.map_err(|captured| captured.error)
}

/// Synchronous counterpart of [`invoke`]
pub fn invoke_sync<F, T, E>(operation: F) -> CallResult<T>
where
    F: FnOnce() -> Result<T, E>,
    E: Into<BoxedError>,
{
    capture_sync(operation).map_err(|captured| captured.error)
}

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
