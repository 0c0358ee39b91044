//! # Messenger
//!
//! Bundles one vault with its configuration, diagnostic sink, scheduler and
//! metrics. Publishers and subscribers handed out by the same messenger see
//! the same brokers; separate messengers are fully isolated.
//!
//! ```ignore
//! let messenger = Messenger::new();
//! let _sub = messenger
//!     .subscriber()
//!     .global()
//!     .subscribe(Handler::sync(|m: Score| println!("{}", m.0)));
//! messenger.publisher().global().publish(Score(3), PublishingContext::get());
//! ```

use crate::broker::Services;
use crate::config::MessengerConfig;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::ConfigError;
use crate::metrics::MessagingMetrics;
use crate::publisher::MessagePublisher;
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::scope::{GlobalScope, ScopeKey};
use crate::subscriber::MessageSubscriber;
use crate::vault::BrokerVault;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::info;

/// Handle to one isolated pub/sub context. Cheap to clone.
pub struct Messenger<S: ScopeKey = GlobalScope> {
    vault: Arc<BrokerVault<S>>,
}

impl<S: ScopeKey> Messenger<S> {
    /// Messenger with default configuration, logging through `tracing` and
    /// scheduling onto the ambient tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::from_services(Services {
            config: MessengerConfig::default(),
            sink: Arc::new(TracingSink),
            scheduler: Arc::new(TokioScheduler::new()),
            metrics: Arc::new(MessagingMetrics::new()),
        })
    }

    #[must_use]
    pub fn builder() -> MessengerBuilder<S> {
        MessengerBuilder::default()
    }

    fn from_services(services: Services) -> Self {
        Self {
            vault: Arc::new(BrokerVault::new(Arc::new(services))),
        }
    }

    #[must_use]
    pub fn publisher(&self) -> MessagePublisher<S> {
        MessagePublisher::new(Arc::clone(&self.vault))
    }

    #[must_use]
    pub fn subscriber(&self) -> MessageSubscriber<S> {
        MessageSubscriber::new(Arc::clone(&self.vault))
    }

    /// The broker registry, for scope teardown and pruning.
    #[must_use]
    pub fn vault(&self) -> &Arc<BrokerVault<S>> {
        &self.vault
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<MessagingMetrics> {
        &self.vault.services().metrics
    }

    #[must_use]
    pub fn config(&self) -> &MessengerConfig {
        &self.vault.services().config
    }
}

impl<S: ScopeKey> Default for Messenger<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ScopeKey> Clone for Messenger<S> {
    fn clone(&self) -> Self {
        Self {
            vault: Arc::clone(&self.vault),
        }
    }
}

impl<S: ScopeKey> fmt::Debug for Messenger<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("vault", &self.vault)
            .field("config", self.config())
            .finish()
    }
}

/// Builder for [`Messenger`].
pub struct MessengerBuilder<S: ScopeKey = GlobalScope> {
    config: MessengerConfig,
    sink: Option<Arc<dyn DiagnosticSink>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    _scope: PhantomData<fn() -> S>,
}

impl<S: ScopeKey> MessengerBuilder<S> {
    #[must_use]
    pub fn config(mut self, config: MessengerConfig) -> Self {
        self.config = config;
        self
    }

    /// Where fail-soft diagnostics go. Defaults to [`TracingSink`].
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Where detached handler work runs. Defaults to [`TokioScheduler`].
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn build(self) -> Result<Messenger<S>, ConfigError> {
        self.config.validate()?;
        info!(
            scope_type = std::any::type_name::<S>(),
            warn_on_unsubscribed_publish = self.config.warn_on_unsubscribed_publish,
            initial_subscriber_capacity = self.config.initial_subscriber_capacity,
            "Messenger created"
        );
        Ok(Messenger::from_services(Services {
            config: self.config,
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            scheduler: self
                .scheduler
                .unwrap_or_else(|| Arc::new(TokioScheduler::new())),
            metrics: Arc::new(MessagingMetrics::new()),
        }))
    }
}

impl<S: ScopeKey> Default for MessengerBuilder<S> {
    fn default() -> Self {
        Self {
            config: MessengerConfig::default(),
            sink: None,
            scheduler: None,
            _scope: PhantomData,
        }
    }
}
