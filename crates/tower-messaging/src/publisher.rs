//! # Message Publisher
//!
//! The publishing side of the messenger.
//!
//! - [`MessagePublisher`] is the entry point handed out by a
//!   [`Messenger`](crate::Messenger); it selects a scope.
//! - [`Publisher`] publishes any message type under that scope.
//! - [`CachedPublisher`] publishes one message type to a broker resolved
//!   once, skipping the vault lookup on every call.
//!
//! A publisher that is not bound to a messenger (`Default`) is *invalid*:
//! publishing through it logs an `InvalidPublisher` warning and does
//! nothing. Nothing on this side ever returns an error.

use crate::broker::MessageBroker;
use crate::cancellation::CancellationToken;
use crate::context::PublishingContext;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, TracingSink};
use crate::dispatch::PublishReport;
use crate::message::{AnonMessage, Message, MessageKind};
use crate::scope::{GlobalScope, ScopeKey};
use crate::vault::BrokerVault;
use futures::future::{BoxFuture, Either};
use futures::FutureExt;
use std::fmt;
use std::future::{ready, Future};
use std::sync::{Arc, Weak};

/// Publishing seam shared by [`Publisher`] and [`CachedPublisher`].
pub trait Publish<M: Message>: Send + Sync {
    /// Fire-and-forget publish.
    fn publish_with(&self, message: M, context: PublishingContext, token: CancellationToken);

    /// Publish and await every handler, or `token`.
    fn publish_async(
        &self,
        message: M,
        context: PublishingContext,
        token: CancellationToken,
    ) -> BoxFuture<'static, PublishReport>;
}

/// Entry point for publishing; picks the scope.
pub struct MessagePublisher<S: ScopeKey = GlobalScope> {
    vault: Option<Arc<BrokerVault<S>>>,
}

impl<S: ScopeKey> MessagePublisher<S> {
    pub(crate) fn new(vault: Arc<BrokerVault<S>>) -> Self {
        Self { vault: Some(vault) }
    }

    /// Whether this publisher is bound to a messenger.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.vault.is_some()
    }

    /// Publisher for `scope`.
    #[must_use]
    pub fn scope(&self, scope: S) -> Publisher<S> {
        Publisher {
            vault: self.vault.clone(),
            scope,
        }
    }
}

impl MessagePublisher<GlobalScope> {
    /// Publisher for the process-wide scope.
    #[must_use]
    pub fn global(&self) -> Publisher<GlobalScope> {
        self.scope(GlobalScope)
    }
}

impl<S: ScopeKey> Default for MessagePublisher<S> {
    fn default() -> Self {
        Self { vault: None }
    }
}

impl<S: ScopeKey> Clone for MessagePublisher<S> {
    fn clone(&self) -> Self {
        Self {
            vault: self.vault.clone(),
        }
    }
}

impl<S: ScopeKey> fmt::Debug for MessagePublisher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePublisher")
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Publishes under one scope.
pub struct Publisher<S: ScopeKey = GlobalScope> {
    vault: Option<Arc<BrokerVault<S>>>,
    scope: S,
}

impl<S: ScopeKey> Publisher<S> {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.vault.is_some()
    }

    #[must_use]
    pub fn scope(&self) -> &S {
        &self.scope
    }

    /// Fire-and-forget publish.
    ///
    /// Handlers are started in order before this returns; synchronous
    /// handlers have finished by then. Asynchronous handlers that suspend
    /// keep running on the messenger's scheduler.
    pub fn publish<M: Message>(&self, message: M, context: PublishingContext) {
        self.publish_with(message, context, CancellationToken::none());
    }

    /// Fire-and-forget publish with a token handed to cancellable handlers.
    pub fn publish_with<M: Message>(
        &self,
        message: M,
        context: PublishingContext,
        token: CancellationToken,
    ) {
        let Some(vault) = self.validate::<M>(&context) else {
            return;
        };
        match vault.try_get::<M>(&self.scope) {
            Some(broker) => {
                broker.begin_dispatch(message, context, token).run_detached();
            }
            None => warn_unsubscribed::<M, S>(vault, &self.scope, &context),
        }
    }

    /// Publish and wait for every handler to finish.
    ///
    /// The subscriber snapshot is taken now. Handlers start on first poll.
    /// If `token` fires first, the future resolves early and handlers that
    /// are still running are left to finish on the scheduler.
    pub fn publish_async<M: Message>(
        &self,
        message: M,
        context: PublishingContext,
        token: CancellationToken,
    ) -> impl Future<Output = PublishReport> + Send + 'static {
        let broker = self
            .validate::<M>(&context)
            .and_then(|vault| match vault.try_get::<M>(&self.scope) {
                Some(broker) => Some(broker),
                None => {
                    warn_unsubscribed::<M, S>(vault, &self.scope, &context);
                    None
                }
            });
        match broker {
            Some(broker) => Either::Left(broker.begin_dispatch(message, context, token).run()),
            None => Either::Right(ready(PublishReport::default())),
        }
    }

    /// Publish on the anonymous channel.
    pub fn publish_anonymous(&self, context: PublishingContext) {
        self.publish(AnonMessage, context);
    }

    /// Publish on the anonymous channel and wait for every handler.
    pub fn publish_anonymous_async(
        &self,
        context: PublishingContext,
        token: CancellationToken,
    ) -> impl Future<Output = PublishReport> + Send + 'static {
        self.publish_async(AnonMessage, context, token)
    }

    /// Resolve the broker for `M` once and publish through it from now on.
    ///
    /// Creates the broker if needed. On an invalid publisher the cache is
    /// invalid too.
    #[must_use]
    pub fn cache<M: Message>(&self) -> CachedPublisher<M> {
        match &self.vault {
            Some(vault) => CachedPublisher {
                broker: Some(Arc::downgrade(&vault.get_or_create::<M>(&self.scope))),
                sink: Arc::clone(&vault.services().sink),
            },
            None => CachedPublisher::default(),
        }
    }

    fn validate<M: Message>(&self, context: &PublishingContext) -> Option<&Arc<BrokerVault<S>>> {
        if self.vault.is_none() {
            let sink: Arc<dyn DiagnosticSink> = context
                .logger()
                .cloned()
                .unwrap_or_else(|| Arc::new(TracingSink));
            sink.log_warning(&Diagnostic::new(
                DiagnosticKind::InvalidPublisher,
                MessageKind::of::<M>().name(),
                Some(context.caller()),
                format!(
                    "Publisher for scope {:?} is not bound to a messenger; message dropped",
                    self.scope
                ),
            ));
        }
        self.vault.as_ref()
    }
}

impl<S: ScopeKey> Clone for Publisher<S> {
    fn clone(&self) -> Self {
        Self {
            vault: self.vault.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<S: ScopeKey> fmt::Debug for Publisher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("scope", &self.scope)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl<S: ScopeKey, M: Message> Publish<M> for Publisher<S> {
    fn publish_with(&self, message: M, context: PublishingContext, token: CancellationToken) {
        Publisher::publish_with(self, message, context, token);
    }

    fn publish_async(
        &self,
        message: M,
        context: PublishingContext,
        token: CancellationToken,
    ) -> BoxFuture<'static, PublishReport> {
        Publisher::publish_async(self, message, context, token).boxed()
    }
}

fn warn_unsubscribed<M: Message, S: ScopeKey>(
    vault: &BrokerVault<S>,
    scope: &S,
    context: &PublishingContext,
) {
    let services = vault.services();
    if services.config.warn_on_unsubscribed_publish {
        context.sink_or(&services.sink).log_warning(&Diagnostic::new(
            DiagnosticKind::NoSubscribers,
            MessageKind::of::<M>().name(),
            Some(context.caller()),
            format!("Published under scope {scope:?} with no subscribers"),
        ));
    }
}

/// Publisher bound to one pre-resolved broker.
///
/// Holds the broker weakly: once the broker's scope is torn down, publishing
/// logs a `BrokerUnavailable` warning to the messenger's sink and does
/// nothing.
pub struct CachedPublisher<M> {
    broker: Option<Weak<MessageBroker<M>>>,
    sink: Arc<dyn DiagnosticSink>,
}

impl<M: Message> CachedPublisher<M> {
    /// Whether the cached broker is still alive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.resolve().is_some()
    }

    pub fn publish(&self, message: M, context: PublishingContext) {
        self.publish_with(message, context, CancellationToken::none());
    }

    pub fn publish_with(&self, message: M, context: PublishingContext, token: CancellationToken) {
        if let Some(broker) = self.resolve_or_warn(&context) {
            broker.begin_dispatch(message, context, token).run_detached();
        }
    }

    pub fn publish_async(
        &self,
        message: M,
        context: PublishingContext,
        token: CancellationToken,
    ) -> impl Future<Output = PublishReport> + Send + 'static {
        match self.resolve_or_warn(&context) {
            Some(broker) => Either::Left(broker.begin_dispatch(message, context, token).run()),
            None => Either::Right(ready(PublishReport::default())),
        }
    }

    fn resolve(&self) -> Option<Arc<MessageBroker<M>>> {
        self.broker
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(|broker| !broker.is_retired())
    }

    fn resolve_or_warn(&self, context: &PublishingContext) -> Option<Arc<MessageBroker<M>>> {
        let resolved = self.resolve();
        if resolved.is_none() {
            let (kind, detail) = match self.broker {
                None => (
                    DiagnosticKind::InvalidPublisher,
                    "Cached publisher is not bound to a messenger; message dropped",
                ),
                Some(_) => (
                    DiagnosticKind::BrokerUnavailable,
                    "Cached publisher outlived its broker; message dropped",
                ),
            };
            context.sink_or(&self.sink).log_warning(&Diagnostic::new(
                kind,
                MessageKind::of::<M>().name(),
                Some(context.caller()),
                detail,
            ));
        }
        resolved
    }
}

impl<M: Message> Publish<M> for CachedPublisher<M> {
    fn publish_with(&self, message: M, context: PublishingContext, token: CancellationToken) {
        CachedPublisher::publish_with(self, message, context, token);
    }

    fn publish_async(
        &self,
        message: M,
        context: PublishingContext,
        token: CancellationToken,
    ) -> BoxFuture<'static, PublishReport> {
        CachedPublisher::publish_async(self, message, context, token).boxed()
    }
}

impl<M> Default for CachedPublisher<M> {
    fn default() -> Self {
        Self {
            broker: None,
            sink: Arc::new(TracingSink),
        }
    }
}

impl<M> Clone for CachedPublisher<M> {
    fn clone(&self) -> Self {
        Self {
            broker: self.broker.clone(),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<M> fmt::Debug for CachedPublisher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedPublisher")
            .field("message_type", &std::any::type_name::<M>())
            .field("bound", &self.broker.is_some())
            .finish()
    }
}
