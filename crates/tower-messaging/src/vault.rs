//! # Broker Vault
//!
//! Maps (scope, message type) to the broker that serves it, creating brokers
//! on demand. One mutex guards the map; every operation is a short,
//! non-suspending critical section, typically one per subscribe or publish
//! call rather than one per message.

use crate::broker::{ErasedBroker, MessageBroker, Services};
use crate::handler::Handler;
use crate::message::{Message, MessageKind};
use crate::scope::{GlobalScope, ScopeKey};
use crate::subscription::Subscription;
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type BrokerMap<S> = HashMap<(S, TypeId), Arc<dyn ErasedBroker>>;

/// Registry of brokers for one scope type.
pub struct BrokerVault<S: ScopeKey = GlobalScope> {
    brokers: Mutex<BrokerMap<S>>,
    services: Arc<Services>,
}

impl<S: ScopeKey> BrokerVault<S> {
    pub(crate) fn new(services: Arc<Services>) -> Self {
        Self {
            brokers: Mutex::new(HashMap::new()),
            services,
        }
    }

    /// The broker for `M` under `scope`, created if this is the first use.
    pub fn get_or_create<M: Message>(&self, scope: &S) -> Arc<MessageBroker<M>> {
        let key = (scope.clone(), TypeId::of::<M>());
        let mut brokers = self.brokers.lock();

        if let Some(broker) = brokers.get(&key).and_then(downcast::<M>) {
            return broker;
        }

        let broker = Arc::new(MessageBroker::<M>::new(Arc::clone(&self.services)));
        brokers.insert(key, Arc::clone(&broker) as Arc<dyn ErasedBroker>);
        debug!(
            message_type = MessageKind::of::<M>().name(),
            scope = ?scope,
            "Broker created"
        );
        broker
    }

    /// Register `handler` with the broker for `M` under `scope`. A broker
    /// retired by a concurrent teardown is replaced by a fresh one.
    pub(crate) fn register<M: Message>(
        &self,
        scope: &S,
        handler: Handler<M>,
        order: i32,
    ) -> (Arc<MessageBroker<M>>, Subscription) {
        let mut handler = handler;
        loop {
            let broker = self.get_or_create::<M>(scope);
            match broker.try_register(handler, order) {
                Ok(subscription) => return (broker, subscription),
                Err(returned) => {
                    debug!(
                        message_type = MessageKind::of::<M>().name(),
                        scope = ?scope,
                        "Broker retired during subscribe; resolving again"
                    );
                    handler = returned;
                }
            }
        }
    }

    /// The broker for `M` under `scope`, if one exists. Never allocates a
    /// broker.
    pub fn try_get<M: Message>(&self, scope: &S) -> Option<Arc<MessageBroker<M>>> {
        let key = (scope.clone(), TypeId::of::<M>());
        self.brokers.lock().get(&key).and_then(downcast::<M>)
    }

    pub fn contains<M: Message>(&self, scope: &S) -> bool {
        let key = (scope.clone(), TypeId::of::<M>());
        self.brokers.lock().contains_key(&key)
    }

    /// Number of live brokers across all scopes.
    pub fn len(&self) -> usize {
        self.brokers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.brokers.lock().is_empty()
    }

    /// Tear down every broker of `scope`. Their subscriptions become
    /// disposed and cached publishers pointing at them stop delivering.
    /// Returns how many brokers were removed.
    pub fn remove_scope(&self, scope: &S) -> usize {
        let removed: Vec<Arc<dyn ErasedBroker>> = {
            let mut brokers = self.brokers.lock();
            let keys: Vec<(S, TypeId)> = brokers
                .keys()
                .filter(|(s, _)| s == scope)
                .cloned()
                .collect();
            keys.iter().filter_map(|k| brokers.remove(k)).collect()
        };
        let subscriptions: usize = removed.iter().map(|b| b.retire()).sum();
        debug!(
            scope = ?scope,
            brokers = removed.len(),
            subscriptions,
            "Scope torn down"
        );
        removed.len()
    }

    /// Drop brokers nobody uses: no subscriber, and no subscription handle,
    /// cached publisher or in-flight dispatch referring to them.
    /// Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut brokers = self.brokers.lock();
        let before = brokers.len();
        brokers.retain(|_, broker| {
            broker.subscriber_count() > 0
                || Arc::strong_count(broker) > 1
                || Arc::weak_count(broker) > 0
        });
        let pruned = before - brokers.len();
        if pruned > 0 {
            debug!(pruned, remaining = brokers.len(), "Idle brokers pruned");
        }
        pruned
    }

    /// Tear down every broker.
    pub fn clear(&self) {
        let removed: Vec<Arc<dyn ErasedBroker>> =
            self.brokers.lock().drain().map(|(_, broker)| broker).collect();
        for broker in &removed {
            broker.retire();
        }
    }

    pub(crate) fn services(&self) -> &Arc<Services> {
        &self.services
    }
}

impl<S: ScopeKey> fmt::Debug for BrokerVault<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerVault")
            .field("scope_type", &std::any::type_name::<S>())
            .field("brokers", &self.len())
            .finish()
    }
}

fn downcast<M: Message>(broker: &Arc<dyn ErasedBroker>) -> Option<Arc<MessageBroker<M>>> {
    Arc::clone(broker).into_any().downcast::<MessageBroker<M>>().ok()
}
