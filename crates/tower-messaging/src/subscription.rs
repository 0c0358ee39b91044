//! # Subscription Handles
//!
//! A [`Subscription`] is the only way to remove a registered handler.
//!
//! ```text
//!   Active ──dispose() / drop / unsubscribe signal / scope teardown──→ Disposed
//! ```
//!
//! `Disposed` is absorbing: disposing again is a no-op, never an error.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use tracing::debug;

/// Broker-side removal, erased over the message type.
pub(crate) trait Unregister: Send + Sync {
    /// Remove entry `id`. Returns whether it was still registered.
    fn unregister(&self, id: u64) -> bool;
}

struct Registration {
    broker: Weak<dyn Unregister>,
    id: u64,
    message_type: &'static str,
}

/// Handle to one registered handler.
///
/// Dropping the handle disposes the subscription. Use [`Subscription::detach`]
/// to keep the handler registered for the broker's whole lifetime instead.
#[must_use = "dropping a Subscription unsubscribes its handler immediately"]
pub struct Subscription {
    registration: Option<Registration>,
    disposed: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(broker: Weak<dyn Unregister>, id: u64, message_type: &'static str) -> Self {
        Self {
            registration: Some(Registration {
                broker,
                id,
                message_type,
            }),
            disposed: AtomicBool::new(false),
        }
    }

    /// A handle that was never registered. Already disposed.
    pub fn empty() -> Self {
        Self {
            registration: None,
            disposed: AtomicBool::new(true),
        }
    }

    /// Remove the handler from its broker.
    ///
    /// Returns `true` only for the call that actually removed it; every
    /// later call, and any call after the broker was torn down, returns
    /// `false`.
    pub fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let Some(registration) = &self.registration else {
            return false;
        };
        let removed = registration
            .broker
            .upgrade()
            .is_some_and(|broker| broker.unregister(registration.id));
        debug!(
            message_type = registration.message_type,
            id = registration.id,
            removed,
            "Subscription disposed"
        );
        removed
    }

    /// Whether this handle has been disposed or detached.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Give up the handle without unregistering the handler.
    pub fn detach(self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Trade the handle for a [`Disposer`] that unregisters the handler
    /// when run and does nothing when dropped. `None` for a handle that is
    /// already disposed or was never registered.
    pub(crate) fn into_disposer(mut self) -> Option<Disposer> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.registration.take().map(|registration| Disposer { registration })
    }

    /// Hand ownership to `set`.
    pub fn add_to(self, set: &mut SubscriptionSet) {
        set.add(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Subscription");
        if let Some(registration) = &self.registration {
            s.field("message_type", &registration.message_type)
                .field("id", &registration.id);
        }
        s.field("disposed", &self.is_disposed()).finish()
    }
}

/// Non-owning removal of one handler.
pub(crate) struct Disposer {
    registration: Registration,
}

impl Disposer {
    pub(crate) fn id(&self) -> u64 {
        self.registration.id
    }

    /// Remove the handler if its broker and entry still exist.
    pub(crate) fn dispose(self) -> bool {
        let registration = self.registration;
        let removed = registration
            .broker
            .upgrade()
            .is_some_and(|broker| broker.unregister(registration.id));
        debug!(
            message_type = registration.message_type,
            id = registration.id,
            removed,
            "Subscription disposed by signal"
        );
        removed
    }
}

/// A group of subscriptions disposed together.
///
/// Typically owned by whatever object the handlers belong to; dropping the
/// set disposes every subscription in it.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Dispose and forget every subscription. Returns how many were still
    /// registered.
    pub fn dispose_all(&mut self) -> usize {
        self.subscriptions
            .drain(..)
            .filter(|subscription| subscription.dispose())
            .count()
    }
}

impl Extend<Subscription> for SubscriptionSet {
    fn extend<I: IntoIterator<Item = Subscription>>(&mut self, iter: I) {
        self.subscriptions.extend(iter);
    }
}
