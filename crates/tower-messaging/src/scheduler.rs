//! # Scheduler
//!
//! Where pending handler work goes when the publisher does not await it:
//! fire-and-forget publishes and publishes whose await was cancelled.

use futures::future::BoxFuture;
use std::fmt;
use tokio::runtime::Handle;

/// Spawns detached tasks.
pub trait Scheduler: Send + Sync {
    /// Spawn `task`. Returns `false` if it could not be scheduled, in which
    /// case it has been dropped.
    fn spawn(&self, task: BoxFuture<'static, ()>) -> bool;
}

/// Scheduler backed by a tokio runtime.
#[derive(Clone, Default)]
pub struct TokioScheduler {
    handle: Option<Handle>,
}

impl TokioScheduler {
    /// Bind to the runtime current at construction, if any. Without one,
    /// each spawn looks up the runtime current at that moment.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: Handle::try_current().ok(),
        }
    }

    #[must_use]
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn spawn(&self, task: BoxFuture<'static, ()>) -> bool {
        let handle = match &self.handle {
            Some(handle) => handle.clone(),
            None => match Handle::try_current() {
                Ok(handle) => handle,
                Err(_) => return false,
            },
        };
        drop(handle.spawn(task));
        true
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("bound", &self.handle.is_some())
            .finish()
    }
}
