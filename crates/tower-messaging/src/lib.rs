//! # Tower Messaging - Scoped In-Process Publish/Subscribe
//!
//! Typed messages travel from publishers to ordered handlers through one
//! broker per (scope, message type) pair.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   publish()   ┌──────────────────────────────┐
//! │   Publisher   │ ────────────→ │         BrokerVault          │
//! └───────────────┘               │  (scope, TypeId) → Broker    │
//!                                 └──────────────┬───────────────┘
//! ┌───────────────┐  subscribe()                 │ snapshot
//! │  Subscriber   │ ──────────────→ ┌────────────▼─────────────┐
//! └───────────────┘                 │ MessageBroker<M>         │
//!                                   │ order -1 → 0 → 0 → 5 ... │
//!                                   └──────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Ordering:** handlers run in ascending `order`, ties in registration
//!   order.
//! - **Snapshot isolation:** a publish reaches exactly the handlers
//!   registered when it started.
//! - **Fail-soft:** invalid endpoints, dropped handler state and handler
//!   faults are logged through a [`DiagnosticSink`] and never surface as
//!   errors at the publish call site.
//! - **Idempotent disposal:** disposing a [`Subscription`] twice is a no-op.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod message;
pub mod messenger;
pub mod metrics;
pub mod publisher;
pub mod scheduler;
pub mod scope;
pub mod subscriber;
pub mod subscription;
pub mod vault;

// Re-export main types
pub use broker::MessageBroker;
pub use cancellation::{CancellationRegistration, CancellationSource, CancellationToken};
pub use config::{MessengerConfig, MAX_SUBSCRIBER_CAPACITY};
pub use context::{CallerInfo, PublishingContext};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, TracingSink};
pub use dispatch::PublishReport;
pub use error::{ConfigError, HandlerFault, HandlerResult};
pub use handler::{Handler, IntoHandlerResult};
pub use message::{AnonMessage, Message, MessageKind};
pub use messenger::{Messenger, MessengerBuilder};
pub use metrics::{MessagingMetrics, MetricsSnapshot};
pub use publisher::{CachedPublisher, MessagePublisher, Publish, Publisher};
pub use scheduler::{Scheduler, TokioScheduler};
pub use scope::{GlobalScope, InstanceId, ScopeKey};
pub use subscriber::{MessageSubscriber, Subscriber};
pub use subscription::{Subscription, SubscriptionSet};
pub use vault::BrokerVault;

/// Order used by `subscribe` when none is given.
pub const DEFAULT_ORDER: i32 = 0;

/// Subscriber slots pre-allocated per broker.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 8;
