//! Named periodic tasks
//!
//! `schedule` spawns one loop per name. The loop invokes the operation
//! through the failure funnel (tagged with the task name), sleeps for the
//! interval, and repeats while its running flag is set. Stopping is deferred:
//! the flag is cleared immediately, and the loop notices on its next wake
//! without invoking the operation again.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{BoxedError, CallError, CallResult};
use crate::safecall::SafeCall;
use crate::time::runtime_handle;

/// Handle to a scheduled loop
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    running: Arc<AtomicBool>,
    interval: Duration,
}

impl ScheduleHandle {
    fn new(interval: Duration) -> Self {
        Self { running: Arc::new(AtomicBool::new(true)), interval }
    }

    /// Ask the loop to stop on its next wake
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn same_loop(&self, other: &ScheduleHandle) -> bool {
        Arc::ptr_eq(&self.running, &other.running)
    }
}

/// Name-keyed table of live loops
#[derive(Debug, Default)]
pub(crate) struct ScheduleRegistry {
    tasks: DashMap<String, ScheduleHandle>,
}

impl ScheduleRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `name` unless a loop with that name is already live
    pub(crate) fn try_register(&self, name: &str, interval: Duration) -> Option<ScheduleHandle> {
        match self.tasks.entry(name.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let handle = ScheduleHandle::new(interval);
                slot.insert(handle.clone());
                Some(handle)
            }
        }
    }

    pub(crate) fn handle(&self, name: &str) -> Option<ScheduleHandle> {
        self.tasks.get(name).map(|entry| entry.value().clone())
    }

    pub(crate) fn stop(&self, name: &str) -> bool {
        match self.tasks.remove(name) {
            Some((_, handle)) => {
                handle.stop();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_scheduled(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub(crate) fn stop_all(&self) -> usize {
        self.names().iter().filter(|name| self.stop(name)).count()
    }

    /// Drop the entry for a loop that exited, unless the name was reused
    fn finish(&self, name: &str, handle: &ScheduleHandle) {
        self.tasks.remove_if(name, |_, current| current.same_loop(handle));
    }
}

async fn run_loop<F, Fut, T, E>(safecall: SafeCall, name: String, handle: ScheduleHandle, mut operation: F)
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxedError>,
{
    while handle.is_running() {
        let _ = safecall.call_with_context(&name, || operation(name.clone())).await;
        tokio::time::sleep(handle.interval()).await;
    }
    safecall.inner.schedules.finish(&name, &handle);
    debug!(task = %name, "Scheduled loop exited");
}

impl SafeCall {
    /// Start a named periodic loop running `operation(name)` every `interval`.
    ///
    /// Returns `Ok(false)` without starting anything when a loop with this
    /// name is already running.
    ///
    /// # Errors
    /// Returns `CallError::Misconfigured` for a zero interval or when no Tokio
    /// runtime is available.
    pub fn schedule<F, Fut, T, E>(&self, name: &str, interval: Duration, operation: F) -> CallResult<bool>
    where
        F: FnMut(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxedError> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(CallError::misconfigured("schedule interval must be greater than zero"));
        }
        let runtime = runtime_handle()?;

        let Some(handle) = self.inner.schedules.try_register(name, interval) else {
            debug!(task = name, "Task already scheduled");
            return Ok(false);
        };

        runtime.spawn(run_loop(self.clone(), name.to_string(), handle, operation));
        info!(task = name, ?interval, "Scheduled periodic task");
        Ok(true)
    }

    /// Stop the loop named `name`; returns `false` when none is scheduled
    pub fn stop_schedule(&self, name: &str) -> bool {
        let stopped = self.inner.schedules.stop(name);
        if stopped {
            info!(task = name, "Stopped periodic task");
        }
        stopped
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.inner.schedules.is_scheduled(name)
    }

    /// Handle of the live loop named `name`
    pub fn schedule_handle(&self, name: &str) -> Option<ScheduleHandle> {
        self.inner.schedules.handle(name)
    }

    /// Names of live loops, sorted
    pub fn scheduled_names(&self) -> Vec<String> {
        self.inner.schedules.names()
    }

    /// Stop every loop, returning how many were running
    pub fn stop_all(&self) -> usize {
        self.inner.schedules.stop_all()
    }
}
