//! # Subscription Lifecycle
//!
//! Disposal is idempotent: the first dispose removes the handler, every
//! later one is a no-op.

#[cfg(test)]
mod tests {
    use crate::fixtures::{recording_messenger, Ping};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tower_messaging::{
        CancellationSource, GlobalScope, Handler, MessagePublisher, MessageSubscriber,
        PublishingContext, Subscription, SubscriptionSet,
    };

    fn counting(hits: &Arc<AtomicU32>) -> Handler<Ping> {
        let hits = Arc::clone(hits);
        Handler::sync(move |_: Ping| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_double_dispose_is_noop() {
        let (messenger, sink) = recording_messenger::<GlobalScope>();
        let subscriber = messenger.subscriber().global();
        let hits = Arc::new(AtomicU32::new(0));
        let other_hits = Arc::new(AtomicU32::new(0));

        let sub = subscriber.subscribe(counting(&hits));
        let _other = subscriber.subscribe(counting(&other_hits));

        assert!(sub.dispose());
        assert!(!sub.dispose());
        assert!(sub.is_disposed());
        assert_eq!(subscriber.subscriber_count::<Ping>(), 1);

        messenger.publisher().global().publish(Ping(1), PublishingContext::get());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(other_hits.load(Ordering::SeqCst), 1);
        assert!(sink.warnings().is_empty());
        assert!(sink.errors().is_empty());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let subscriber = messenger.subscriber().global();
        let hits = Arc::new(AtomicU32::new(0));

        drop(subscriber.subscribe(counting(&hits)));
        messenger.publisher().global().publish(Ping(1), PublishingContext::get());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_detach_keeps_handler() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let hits = Arc::new(AtomicU32::new(0));

        messenger.subscriber().global().subscribe(counting(&hits)).detach();
        messenger.publisher().global().publish(Ping(1), PublishingContext::get());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_token() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let hits = Arc::new(AtomicU32::new(0));
        let source = CancellationSource::new();

        messenger
            .subscriber()
            .global()
            .subscribe_until(counting(&hits), &source.token(), 0);

        let publisher = messenger.publisher().global();
        publisher.publish(Ping(1), PublishingContext::get());
        source.cancel();
        source.cancel();
        publisher.publish(Ping(2), PublishingContext::get());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_until_outlives_dropped_source() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let hits = Arc::new(AtomicU32::new(0));
        let source = CancellationSource::new();
        messenger
            .subscriber()
            .global()
            .subscribe_until(counting(&hits), &source.token(), 0);

        drop(source);
        messenger.publisher().global().publish(Ping(1), PublishingContext::get());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(messenger.subscriber().global().subscriber_count::<Ping>(), 1);
    }

    #[test]
    fn test_subscription_set() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let subscriber = messenger.subscriber().global();
        let hits = Arc::new(AtomicU32::new(0));

        let mut set = SubscriptionSet::new();
        for _ in 0..3 {
            subscriber.subscribe(counting(&hits)).add_to(&mut set);
        }
        messenger.publisher().global().publish(Ping(1), PublishingContext::get());
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        assert_eq!(set.dispose_all(), 3);
        assert_eq!(set.dispose_all(), 0);
        assert_eq!(subscriber.subscriber_count::<Ping>(), 0);
    }

    #[test]
    fn test_invalid_endpoints_are_noops() {
        let subscriber = MessageSubscriber::<GlobalScope>::default().global();
        let publisher = MessagePublisher::<GlobalScope>::default().global();
        let hits = Arc::new(AtomicU32::new(0));

        let sub: Subscription = subscriber.subscribe(counting(&hits));
        assert!(sub.is_disposed());
        assert!(!sub.dispose());

        publisher.publish(Ping(1), PublishingContext::get());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_metrics_balance() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let subscriber = messenger.subscriber().global();
        let hits = Arc::new(AtomicU32::new(0));

        let a = subscriber.subscribe(counting(&hits));
        let _b = subscriber.subscribe(counting(&hits));
        a.dispose();
        a.dispose();

        let snapshot = messenger.metrics().snapshot();
        assert_eq!(snapshot.subscriptions_created, 2);
        assert_eq!(snapshot.subscriptions_disposed, 1);
        assert_eq!(snapshot.active_subscriptions(), 1);
    }
}
