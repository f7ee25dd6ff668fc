//! Detached work that outlives the request that started it.
//!
//! Tasks are tracked so shutdown can wait for them, and a panic inside a task
//! is caught and logged instead of being lost with the task.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::task::TaskTracker;

#[derive(Clone, Default)]
pub struct Background {
    tracker: TaskTracker,
}

impl Background {
    pub fn new() -> Self {
        Self { tracker: TaskTracker::new() }
    }

    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            if let Err(payload) = AssertUnwindSafe(task).catch_unwind().await {
                tracing::error!(task = name, panic = %panic_message(payload.as_ref()), "background task panicked");
            }
        });
    }

    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Stops accepting the notion of "more work" and waits for running tasks.
    /// Tasks spawned after this call are still tracked and awaited.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
