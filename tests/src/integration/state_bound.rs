//! # State-Bound Handlers
//!
//! A handler bound to state holds it weakly. Once the state is gone the
//! handler is skipped and each publish that would have reached it logs
//! exactly one `StateDropped` error; nothing is raised to the publisher.

#[cfg(test)]
mod tests {
    use crate::fixtures::{recording_messenger, Ping};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tower_messaging::{
        CancellationToken, DiagnosticKind, GlobalScope, Handler, PublishingContext,
    };

    #[derive(Default)]
    struct Counter {
        hits: AtomicU32,
    }

    #[test]
    fn test_dropped_state_skipped_with_one_diagnostic() {
        let (messenger, sink) = recording_messenger::<GlobalScope>();
        let subscriber = messenger.subscriber().global();
        let state = Arc::new(Counter::default());
        let others = Arc::new(AtomicU32::new(0));

        let _bound = subscriber.subscribe(Handler::with_state(&state, |c: &Counter, _: Ping| {
            c.hits.fetch_add(1, Ordering::SeqCst);
        }));
        let others_h = Arc::clone(&others);
        let _plain = subscriber.subscribe_with_order(
            Handler::sync(move |_: Ping| {
                others_h.fetch_add(1, Ordering::SeqCst);
            }),
            1,
        );

        let publisher = messenger.publisher().global();
        publisher.publish(Ping(1), PublishingContext::get());
        assert_eq!(state.hits.load(Ordering::SeqCst), 1);

        drop(state);
        publisher.publish(Ping(2), PublishingContext::get());

        assert_eq!(others.load(Ordering::SeqCst), 2);
        assert_eq!(sink.count(DiagnosticKind::StateDropped), 1);
        assert_eq!(sink.errors().len(), 1);
        assert!(sink.errors()[0].message_type.ends_with("Ping"));
    }

    #[test]
    fn test_one_diagnostic_per_publish() {
        let (messenger, sink) = recording_messenger::<GlobalScope>();
        let state = Arc::new(Counter::default());
        let _bound = messenger
            .subscriber()
            .global()
            .subscribe(Handler::with_state(&state, |c: &Counter, _: Ping| {
                c.hits.fetch_add(1, Ordering::SeqCst);
            }));
        drop(state);

        let publisher = messenger.publisher().global();
        for n in 0..3 {
            publisher.publish(Ping(n), PublishingContext::get());
        }
        assert_eq!(sink.count(DiagnosticKind::StateDropped), 3);
        assert_eq!(messenger.metrics().snapshot().handlers_state_dropped, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_state_kept_alive_for_invocation() {
        let (messenger, sink) = recording_messenger::<GlobalScope>();
        let state = Arc::new(Counter::default());
        let _bound = messenger.subscriber().global().subscribe(Handler::future_with_state(
            &state,
            |c: Arc<Counter>, _: Ping, _token| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                c.hits.fetch_add(1, Ordering::SeqCst);
            },
        ));

        let publisher = messenger.publisher().global();
        let weak = Arc::downgrade(&state);
        let mut pending = Box::pin(publisher.publish_async(
            Ping(1),
            PublishingContext::get(),
            CancellationToken::none(),
        ));
        assert!(futures::poll!(&mut pending).is_pending());

        // The running invocation holds the state; dropping ours is safe.
        drop(state);
        let report = pending.await;
        assert_eq!(report.completed, 1);
        assert!(weak.upgrade().is_none());

        let report = publisher
            .publish_async(Ping(2), PublishingContext::get(), CancellationToken::none())
            .await;
        assert_eq!(report.state_dropped, 1);
        assert_eq!(sink.count(DiagnosticKind::StateDropped), 1);
    }
}
