//! # Cooperative Cancellation
//!
//! A source/token pair. The source cancels; tokens observe. Cancellation is
//! cooperative only: nothing is aborted, work that holds a token decides for
//! itself when to stop.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::watch;

type Callback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Callbacks {
    next_key: u64,
    pending: Vec<(u64, Callback)>,
}

struct Shared {
    state: watch::Sender<bool>,
    callbacks: Mutex<Callbacks>,
}

impl Shared {
    fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }
}

/// Owner side of a cancellation signal.
#[derive(Clone)]
pub struct CancellationSource {
    shared: Arc<Shared>,
}

impl CancellationSource {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state,
                callbacks: Mutex::new(Callbacks::default()),
            }),
        }
    }

    /// A token observing this source.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            shared: Some(Arc::clone(&self.shared)),
        }
    }

    /// Signal cancellation. Registered callbacks run once, on this thread.
    /// Calling again is a no-op.
    pub fn cancel(&self) {
        let already = self.shared.state.send_replace(true);
        if already {
            return;
        }
        let pending = std::mem::take(&mut self.shared.callbacks.lock().pending);
        for (_, callback) in pending {
            callback();
        }
    }

    /// Callbacks waiting for this source to be cancelled.
    #[must_use]
    pub fn registered_callbacks(&self) -> usize {
        self.shared.callbacks.lock().pending.len()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSource")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Observer side of a cancellation signal. Cheap to clone.
///
/// [`CancellationToken::none`] (also the `Default`) never fires.
#[derive(Clone, Default)]
pub struct CancellationToken {
    shared: Option<Arc<Shared>>,
}

impl CancellationToken {
    /// A token that is never cancelled.
    #[must_use]
    pub fn none() -> Self {
        Self { shared: None }
    }

    /// Whether this token can ever be cancelled.
    #[must_use]
    pub fn can_be_cancelled(&self) -> bool {
        self.shared.is_some()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.as_ref().is_some_and(|s| s.is_cancelled())
    }

    /// Resolves once the source is cancelled. Never resolves for
    /// [`CancellationToken::none`].
    pub async fn cancelled(&self) {
        let Some(shared) = &self.shared else {
            return std::future::pending().await;
        };
        let mut rx = shared.state.subscribe();
        // The sender lives in `shared`, which we hold: `wait_for` cannot see
        // a closed channel here.
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    /// Run `callback` when the source is cancelled, or right away if it
    /// already is. Dropped without running for tokens that cannot be
    /// cancelled, and when every source and token is dropped uncancelled.
    ///
    /// The returned registration can withdraw the callback before it runs.
    pub fn on_cancel<F>(&self, callback: F) -> CancellationRegistration
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(shared) = &self.shared else {
            return CancellationRegistration::empty();
        };
        {
            let mut callbacks = shared.callbacks.lock();
            if !shared.is_cancelled() {
                let key = callbacks.next_key;
                callbacks.next_key += 1;
                callbacks.pending.push((key, Box::new(callback)));
                return CancellationRegistration {
                    shared: Arc::downgrade(shared),
                    key: Some(key),
                };
            }
        }
        callback();
        CancellationRegistration::empty()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("can_be_cancelled", &self.can_be_cancelled())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A callback registered through [`CancellationToken::on_cancel`].
///
/// Dropping the registration leaves the callback in place; call
/// [`CancellationRegistration::unregister`] to withdraw it.
#[derive(Debug, Default)]
pub struct CancellationRegistration {
    shared: Weak<Shared>,
    key: Option<u64>,
}

impl CancellationRegistration {
    fn empty() -> Self {
        Self::default()
    }

    /// Withdraw the callback. Returns `true` if it was still pending, i.e.
    /// it has not run and now never will.
    pub fn unregister(self) -> bool {
        let (Some(key), Some(shared)) = (self.key, self.shared.upgrade()) else {
            return false;
        };
        let removed = {
            let mut callbacks = shared.callbacks.lock();
            callbacks
                .pending
                .iter()
                .position(|(k, _)| *k == key)
                .map(|position| callbacks.pending.remove(position))
        };
        // The withdrawn callback is dropped after the lock is released.
        removed.is_some()
    }
}
