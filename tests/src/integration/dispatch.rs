//! # Dispatch Semantics
//!
//! - Each publish works on a snapshot of the subscriber list taken when it
//!   starts.
//! - Publishing with no subscribers completes without error or invocation.
//! - A failing handler affects only itself.

#[cfg(test)]
mod tests {
    use crate::fixtures::{recording_messenger, recording_messenger_with, Ping, Pong};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tower_messaging::{
        CancellationToken, DiagnosticKind, GlobalScope, Handler, MessengerConfig,
        PublishReport, PublishingContext, Subscription,
    };

    #[test]
    fn test_subscription_added_during_dispatch_waits() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let subscriber = messenger.subscriber().global();
        let late_hits = Arc::new(AtomicU32::new(0));
        let late: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

        let inner = subscriber.clone();
        let late_hits_h = Arc::clone(&late_hits);
        let late_h = Arc::clone(&late);
        let adder = subscriber.subscribe(Handler::sync(move |_: Ping| {
            let hits = Arc::clone(&late_hits_h);
            let sub = inner.subscribe_with_order(
                Handler::sync(move |_: Ping| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
                // Would run right after the adder if it were in the snapshot.
                1,
            );
            late_h.lock().push(sub);
        }));

        let publisher = messenger.publisher().global();
        publisher.publish(Ping(1), PublishingContext::get());
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);
        assert_eq!(subscriber.subscriber_count::<Ping>(), 2);

        adder.dispose();
        publisher.publish(Ping(2), PublishingContext::get());
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
        late.lock().clear();
    }

    #[test]
    fn test_disposed_during_dispatch_is_skipped() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let subscriber = messenger.subscriber().global();
        let victim_hits = Arc::new(AtomicU32::new(0));
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let victim_h = Arc::clone(&victim);
        let _killer = subscriber.subscribe_with_order(
            Handler::sync(move |_: Ping| {
                if let Some(sub) = victim_h.lock().take() {
                    sub.dispose();
                }
            }),
            0,
        );
        let hits = Arc::clone(&victim_hits);
        *victim.lock() = Some(subscriber.subscribe_with_order(
            Handler::sync(move |_: Ping| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
            1,
        ));

        messenger.publisher().global().publish(Ping(1), PublishingContext::get());
        assert_eq!(victim_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_subscribers() {
        let (messenger, sink) = recording_messenger::<GlobalScope>();
        let publisher = messenger.publisher().global();

        publisher.publish(Ping(1), PublishingContext::get());
        let report = publisher
            .publish_async(Ping(2), PublishingContext::get(), CancellationToken::none())
            .await;

        assert_eq!(report, PublishReport::default());
        assert!(sink.warnings().is_empty());
        assert!(sink.errors().is_empty());
        assert_eq!(messenger.metrics().snapshot().handlers_invoked, 0);
    }

    #[tokio::test]
    async fn test_zero_subscribers_after_dispose() {
        let (messenger, sink) = recording_messenger::<GlobalScope>();
        let sub = messenger
            .subscriber()
            .global()
            .subscribe(Handler::sync(|_: Ping| {}));
        sub.dispose();

        let report = messenger
            .publisher()
            .global()
            .publish_async(Ping(1), PublishingContext::get(), CancellationToken::none())
            .await;
        assert_eq!(report.snapshot, 0);
        assert_eq!(report.invoked, 0);
        assert!(sink.errors().is_empty());
    }

    #[test]
    fn test_zero_subscribers_warning_when_enabled() {
        let (messenger, sink) = recording_messenger_with::<GlobalScope>(
            MessengerConfig::default().with_warn_on_unsubscribed_publish(true),
        );
        messenger.publisher().global().publish(Ping(1), PublishingContext::get());
        assert_eq!(sink.count(DiagnosticKind::NoSubscribers), 1);
    }

    #[tokio::test]
    async fn test_faulting_handlers_are_isolated() {
        let (messenger, sink) = recording_messenger::<GlobalScope>();
        let subscriber = messenger.subscriber().global();
        let reached = Arc::new(AtomicU32::new(0));

        let _err = subscriber.subscribe_with_order(
            Handler::sync(|m: Ping| {
                if m.0 > 0 {
                    anyhow::bail!("rejecting {}", m.0);
                }
                Ok(())
            }),
            0,
        );
        let _panics = subscriber.subscribe_with_order(
            Handler::future::<_, _, ()>(|_: Ping| async {
                tokio::task::yield_now().await;
                panic!("async handler blew up");
            }),
            1,
        );
        let reached_h = Arc::clone(&reached);
        let _ok = subscriber.subscribe_with_order(
            Handler::sync(move |_: Ping| {
                reached_h.fetch_add(1, Ordering::SeqCst);
            }),
            2,
        );

        let report = messenger
            .publisher()
            .global()
            .publish_async(Ping(7), PublishingContext::get(), CancellationToken::none())
            .await;

        assert_eq!(reached.load(Ordering::SeqCst), 1);
        assert_eq!(report.invoked, 3);
        assert_eq!(report.faulted, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(sink.count(DiagnosticKind::HandlerFault), 2);
        assert!(sink
            .errors()
            .iter()
            .any(|d| d.detail.contains("rejecting 7")));
    }

    #[test]
    fn test_message_types_are_separate() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let subscriber = messenger.subscriber().global();
        let pings = Arc::new(AtomicU32::new(0));
        let pings_h = Arc::clone(&pings);
        let _sub = subscriber.subscribe(Handler::sync(move |m: Ping| {
            pings_h.fetch_add(m.0, Ordering::SeqCst);
        }));

        let publisher = messenger.publisher().global();
        publisher.publish(Pong(100), PublishingContext::get());
        publisher.publish(Ping(1), PublishingContext::get());
        assert_eq!(pings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_context_reaches_handler() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let seen = Arc::new(Mutex::new(None));
        let seen_h = Arc::clone(&seen);
        let _sub = messenger.subscriber().global().subscribe(Handler::sync_with_context(
            move |_: Ping, ctx: &PublishingContext| {
                *seen_h.lock() = Some(ctx.caller());
            },
        ));

        messenger.publisher().global().publish(Ping(1), PublishingContext::get());
        let caller = seen.lock().take().expect("handler ran");
        assert!(caller.file().ends_with("dispatch.rs"));
    }
}
