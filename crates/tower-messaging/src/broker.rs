//! # Message Broker
//!
//! One broker per (scope, message type) pair. It owns the ordered
//! subscriber list and starts dispatches over snapshots of it.
//!
//! ## Invariants
//!
//! - Entries are kept sorted by ascending `order`; equal orders keep
//!   registration order (new entries go after every entry of equal order).
//! - An entry is removed at most once. Its `active` flag is cleared on
//!   removal so in-flight dispatches skip it if they have not reached it yet.
//! - A retired broker accepts no new entries; the flag is set and checked
//!   under the write lock.
//! - The list is mutated only by register/unregister/retire, under the write
//!   lock. Dispatch copies it under the read lock and never holds the lock
//!   while running handlers.

use crate::cancellation::{CancellationRegistration, CancellationToken};
use crate::config::MessengerConfig;
use crate::context::PublishingContext;
use crate::diagnostics::DiagnosticSink;
use crate::dispatch::Dispatch;
use crate::handler::Handler;
use crate::message::{Message, MessageKind};
use crate::metrics::MessagingMetrics;
use crate::scheduler::Scheduler;
use crate::subscription::{Subscription, Unregister};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Collaborators shared by every broker of one messenger.
pub(crate) struct Services {
    pub(crate) config: MessengerConfig,
    pub(crate) sink: Arc<dyn DiagnosticSink>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) metrics: Arc<MessagingMetrics>,
}

/// One registered handler.
pub(crate) struct Entry<M> {
    pub(crate) id: u64,
    pub(crate) order: i32,
    pub(crate) handler: Handler<M>,
    active: AtomicBool,
    unsubscribe: Mutex<Option<CancellationRegistration>>,
}

impl<M> Entry<M> {
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Must not be called with the entries lock held.
    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        let registration = self.unsubscribe.lock().take();
        if let Some(registration) = registration {
            registration.unregister();
        }
    }
}

/// The subscriber list and dispatch entry point for one message type
/// within one scope.
pub struct MessageBroker<M> {
    entries: RwLock<Vec<Arc<Entry<M>>>>,
    next_id: AtomicU64,
    retired: AtomicBool,
    services: Arc<Services>,
}

impl<M: Message> MessageBroker<M> {
    pub(crate) fn new(services: Arc<Services>) -> Self {
        let capacity = services.config.initial_subscriber_capacity;
        MessagingMetrics::incr(&services.metrics.brokers_created);
        Self {
            entries: RwLock::new(Vec::with_capacity(capacity)),
            next_id: AtomicU64::new(1),
            retired: AtomicBool::new(false),
            services,
        }
    }

    /// Add `handler` at `order` and return its handle. A retired broker
    /// hands the handler back.
    pub(crate) fn try_register(
        self: &Arc<Self>,
        handler: Handler<M>,
        order: i32,
    ) -> Result<Subscription, Handler<M>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut entries = self.entries.write();
            if self.retired.load(Ordering::Acquire) {
                return Err(handler);
            }
            let position = entries.partition_point(|e| e.order <= order);
            entries.insert(
                position,
                Arc::new(Entry {
                    id,
                    order,
                    handler,
                    active: AtomicBool::new(true),
                    unsubscribe: Mutex::new(None),
                }),
            );
        }

        MessagingMetrics::incr(&self.services.metrics.subscriptions_created);
        debug!(
            message_type = MessageKind::of::<M>().name(),
            id,
            order,
            "Handler registered"
        );

        let weak: Weak<dyn Unregister> = Arc::downgrade(self) as Weak<dyn Unregister>;
        Ok(Subscription::new(weak, id, MessageKind::of::<M>().name()))
    }

    #[cfg(test)]
    pub(crate) fn register(self: &Arc<Self>, handler: Handler<M>, order: i32) -> Subscription {
        self.try_register(handler, order)
            .unwrap_or_else(|_| Subscription::empty())
    }

    /// Tie entry `id` to an unsubscribe callback so the callback is
    /// withdrawn once the entry is gone. Withdrawn at once if the entry is
    /// already gone.
    pub(crate) fn bind_unsubscribe(&self, id: u64, registration: CancellationRegistration) {
        let entry = self.entries.read().iter().find(|e| e.id == id).cloned();
        let Some(entry) = entry else {
            registration.unregister();
            return;
        };
        *entry.unsubscribe.lock() = Some(registration);
        // Removed while binding: deactivate may have run before the slot
        // was filled.
        if !entry.is_active() {
            let registration = entry.unsubscribe.lock().take();
            if let Some(registration) = registration {
                registration.unregister();
            }
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Registered orders, in dispatch order.
    #[must_use]
    pub fn orders(&self) -> Vec<i32> {
        self.entries.read().iter().map(|e| e.order).collect()
    }

    /// Whether this broker was torn down by its vault.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Snapshot the subscriber list and prepare a dispatch of `message`.
    pub(crate) fn begin_dispatch(
        &self,
        message: M,
        context: PublishingContext,
        token: CancellationToken,
    ) -> Dispatch<M> {
        let snapshot: Vec<Arc<Entry<M>>> = self.entries.read().clone();
        MessagingMetrics::incr(&self.services.metrics.messages_published);
        Dispatch::new(snapshot, message, context, token, Arc::clone(&self.services))
    }

    pub(crate) fn services(&self) -> &Arc<Services> {
        &self.services
    }
}

impl<M: Message> Unregister for MessageBroker<M> {
    fn unregister(&self, id: u64) -> bool {
        let removed = {
            let mut entries = self.entries.write();
            entries
                .iter()
                .position(|e| e.id == id)
                .map(|position| entries.remove(position))
        };
        match removed {
            Some(entry) => {
                entry.deactivate();
                MessagingMetrics::incr(&self.services.metrics.subscriptions_disposed);
                true
            }
            None => false,
        }
    }
}

impl<M> fmt::Debug for MessageBroker<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBroker")
            .field("message_type", &std::any::type_name::<M>())
            .field("subscribers", &self.entries.read().len())
            .field("retired", &self.retired.load(Ordering::Relaxed))
            .finish()
    }
}

/// Type-erased view of a broker, as stored in the vault.
pub(crate) trait ErasedBroker: Send + Sync {
    fn subscriber_count(&self) -> usize;

    /// Tear down: dispose every entry and refuse further use through caches.
    /// Returns the number of entries removed.
    fn retire(&self) -> usize;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<M: Message> ErasedBroker for MessageBroker<M> {
    fn subscriber_count(&self) -> usize {
        MessageBroker::subscriber_count(self)
    }

    fn retire(&self) -> usize {
        let drained: Vec<Arc<Entry<M>>> = {
            let mut entries = self.entries.write();
            self.retired.store(true, Ordering::Release);
            std::mem::take(&mut *entries)
        };
        for entry in &drained {
            entry.deactivate();
        }
        let count = drained.len();
        MessagingMetrics::add(&self.services.metrics.subscriptions_disposed, count as u64);
        count
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
