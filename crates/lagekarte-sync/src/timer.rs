//! Cancellable one-shot scheduled task.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Runs at most one delayed task at a time. Scheduling again cancels the
/// pending task first, which turns repeated scheduling into a trailing
/// debounce.
#[derive(Debug, Default)]
pub struct OneShot {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl OneShot {
    /// Create an idle timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, cancelling any task still pending.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        let previous = self.lock().replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Cancel the pending task. Returns `true` if one was still waiting or
    /// running.
    pub fn cancel(&self) -> bool {
        self.lock().take().is_some_and(|handle| {
            let pending = !handle.is_finished();
            handle.abort();
            pending
        })
    }

    /// Whether a task is scheduled and has not finished yet.
    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for OneShot {
    fn drop(&mut self) {
        if let Some(handle) = self.lock().take() {
            handle.abort();
        }
    }
}
