//! # Message Subscriber
//!
//! The subscribing side of the messenger. [`MessageSubscriber`] selects a
//! scope; [`Subscriber`] registers [`Handler`]s under it.
//!
//! Lower `order` runs first. Handlers sharing an order run in registration
//! order.

use crate::cancellation::CancellationToken;
use crate::context::CallerInfo;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, TracingSink};
use crate::handler::Handler;
use crate::message::{AnonMessage, Message, MessageKind};
use crate::scope::{GlobalScope, ScopeKey};
use crate::subscription::Subscription;
use crate::vault::BrokerVault;
use crate::DEFAULT_ORDER;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Entry point for subscribing; picks the scope.
pub struct MessageSubscriber<S: ScopeKey = GlobalScope> {
    vault: Option<Arc<BrokerVault<S>>>,
}

impl<S: ScopeKey> MessageSubscriber<S> {
    pub(crate) fn new(vault: Arc<BrokerVault<S>>) -> Self {
        Self { vault: Some(vault) }
    }

    /// Whether this subscriber is bound to a messenger.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.vault.is_some()
    }

    /// Subscriber for `scope`.
    #[must_use]
    pub fn scope(&self, scope: S) -> Subscriber<S> {
        Subscriber {
            vault: self.vault.clone(),
            scope,
        }
    }
}

impl MessageSubscriber<GlobalScope> {
    /// Subscriber for the process-wide scope.
    #[must_use]
    pub fn global(&self) -> Subscriber<GlobalScope> {
        self.scope(GlobalScope)
    }
}

impl<S: ScopeKey> Default for MessageSubscriber<S> {
    fn default() -> Self {
        Self { vault: None }
    }
}

impl<S: ScopeKey> Clone for MessageSubscriber<S> {
    fn clone(&self) -> Self {
        Self {
            vault: self.vault.clone(),
        }
    }
}

impl<S: ScopeKey> fmt::Debug for MessageSubscriber<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSubscriber")
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Registers handlers under one scope.
pub struct Subscriber<S: ScopeKey = GlobalScope> {
    vault: Option<Arc<BrokerVault<S>>>,
    scope: S,
}

impl<S: ScopeKey> Subscriber<S> {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.vault.is_some()
    }

    #[must_use]
    pub fn scope(&self) -> &S {
        &self.scope
    }

    /// Register `handler` at the default order.
    #[track_caller]
    pub fn subscribe<M: Message>(&self, handler: Handler<M>) -> Subscription {
        self.subscribe_with_order(handler, DEFAULT_ORDER)
    }

    /// Register `handler` at `order`.
    #[track_caller]
    pub fn subscribe_with_order<M: Message>(&self, handler: Handler<M>, order: i32) -> Subscription {
        let Some(vault) = &self.vault else {
            self.warn_invalid::<M>(CallerInfo::here());
            return Subscription::empty();
        };
        vault.register(&self.scope, handler, order).1
    }

    /// Register `handler` until `unsubscribe` fires.
    ///
    /// If the token is already cancelled nothing is registered. Otherwise the
    /// handler stays registered until the token fires or the scope is torn
    /// down; a token whose source is dropped uncancelled never fires.
    #[track_caller]
    pub fn subscribe_until<M: Message>(
        &self,
        handler: Handler<M>,
        unsubscribe: &CancellationToken,
        order: i32,
    ) {
        if unsubscribe.is_cancelled() {
            debug!(
                message_type = MessageKind::of::<M>().name(),
                scope = ?self.scope,
                "Unsubscribe token already cancelled; handler not registered"
            );
            return;
        }
        let Some(vault) = &self.vault else {
            self.warn_invalid::<M>(CallerInfo::here());
            return;
        };

        let (broker, subscription) = vault.register(&self.scope, handler, order);
        if !unsubscribe.can_be_cancelled() {
            subscription.detach();
            return;
        }
        let Some(disposer) = subscription.into_disposer() else {
            return;
        };
        let id = disposer.id();
        let registration = unsubscribe.on_cancel(move || {
            disposer.dispose();
        });
        broker.bind_unsubscribe(id, registration);
    }

    /// Register a handler on the anonymous channel.
    #[track_caller]
    pub fn subscribe_anonymous(&self, handler: Handler<AnonMessage>) -> Subscription {
        self.subscribe_with_order(handler, DEFAULT_ORDER)
    }

    #[track_caller]
    pub fn subscribe_anonymous_with_order(
        &self,
        handler: Handler<AnonMessage>,
        order: i32,
    ) -> Subscription {
        self.subscribe_with_order(handler, order)
    }

    /// Handlers currently registered for `M` under this scope.
    #[must_use]
    pub fn subscriber_count<M: Message>(&self) -> usize {
        self.vault
            .as_ref()
            .and_then(|vault| vault.try_get::<M>(&self.scope))
            .map_or(0, |broker| broker.subscriber_count())
    }

    fn warn_invalid<M: Message>(&self, caller: CallerInfo) {
        TracingSink.log_warning(&Diagnostic::new(
            DiagnosticKind::InvalidSubscriber,
            MessageKind::of::<M>().name(),
            Some(caller),
            format!(
                "Subscriber for scope {:?} is not bound to a messenger; handler ignored",
                self.scope
            ),
        ));
    }
}

impl<S: ScopeKey> Clone for Subscriber<S> {
    fn clone(&self) -> Self {
        Self {
            vault: self.vault.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<S: ScopeKey> fmt::Debug for Subscriber<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("scope", &self.scope)
            .field("valid", &self.is_valid())
            .finish()
    }
}
