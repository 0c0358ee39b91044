//! Counters for broker activity.
//!
//! One [`MessagingMetrics`] is shared by every broker of a messenger.
//!
//! ## Usage
//!
//! ```ignore
//! let messenger = Messenger::new();
//! // ... publish and subscribe ...
//! let snapshot = messenger.metrics().snapshot();
//! println!("{}", serde_json::to_string(&snapshot)?);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters.
#[derive(Debug, Default)]
pub struct MessagingMetrics {
    /// Publishes that reached a broker
    pub messages_published: AtomicU64,
    /// Handler invocations started
    pub handlers_invoked: AtomicU64,
    /// Handlers that returned an error or panicked
    pub handler_faults: AtomicU64,
    /// State-bound handlers skipped because the state was dropped
    pub handlers_state_dropped: AtomicU64,
    /// `publish_async` calls that stopped awaiting on cancellation
    pub publishes_cancelled: AtomicU64,
    pub subscriptions_created: AtomicU64,
    pub subscriptions_disposed: AtomicU64,
    pub brokers_created: AtomicU64,
}

/// Point-in-time copy of [`MessagingMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_published: u64,
    pub handlers_invoked: u64,
    pub handler_faults: u64,
    pub handlers_state_dropped: u64,
    pub publishes_cancelled: u64,
    pub subscriptions_created: u64,
    pub subscriptions_disposed: u64,
    pub brokers_created: u64,
}

impl MetricsSnapshot {
    /// Subscriptions created but not yet disposed.
    #[must_use]
    pub fn active_subscriptions(&self) -> u64 {
        self.subscriptions_created
            .saturating_sub(self.subscriptions_disposed)
    }
}

impl MessagingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_published: self.messages_published.load(Ordering::Relaxed),
            handlers_invoked: self.handlers_invoked.load(Ordering::Relaxed),
            handler_faults: self.handler_faults.load(Ordering::Relaxed),
            handlers_state_dropped: self.handlers_state_dropped.load(Ordering::Relaxed),
            publishes_cancelled: self.publishes_cancelled.load(Ordering::Relaxed),
            subscriptions_created: self.subscriptions_created.load(Ordering::Relaxed),
            subscriptions_disposed: self.subscriptions_disposed.load(Ordering::Relaxed),
            brokers_created: self.brokers_created.load(Ordering::Relaxed),
        }
    }
}
