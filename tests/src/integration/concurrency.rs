//! # Fan-Out / Fan-In and Cancellation
//!
//! `publish_async` resolves after the slowest handler, or as soon as its
//! token is cancelled. Handlers still running at cancellation keep running
//! to completion.

#[cfg(test)]
mod tests {
    use crate::fixtures::{recording_messenger, Ping};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;
    use tower_messaging::{
        CancellationSource, CancellationToken, DiagnosticKind, GlobalScope, Handler, Messenger,
        PublishingContext, Subscription,
    };

    fn sleepers(
        messenger: &Messenger<GlobalScope>,
        done: &Arc<AtomicU32>,
        delays_ms: &[u64],
    ) -> Vec<Subscription> {
        let subscriber = messenger.subscriber().global();
        delays_ms
            .iter()
            .map(|&ms| {
                let done = Arc::clone(done);
                subscriber.subscribe(Handler::future(move |_: Ping| {
                    let done = Arc::clone(&done);
                    async move {
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        done.fetch_add(1, Ordering::SeqCst);
                    }
                }))
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_async_waits_for_slowest() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let done = Arc::new(AtomicU32::new(0));
        let _subs = sleepers(&messenger, &done, &[10, 20, 30]);

        let start = Instant::now();
        let report = messenger
            .publisher()
            .global()
            .publish_async(Ping(1), PublishingContext::get(), CancellationToken::none())
            .await;

        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(report.completed, 3);
        assert!(report.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handlers_run_concurrently() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let done = Arc::new(AtomicU32::new(0));
        let _subs = sleepers(&messenger, &done, &[30, 30, 30]);

        let start = Instant::now();
        messenger
            .publisher()
            .global()
            .publish_async(Ping(1), PublishingContext::get(), CancellationToken::none())
            .await;

        // Joined, not chained.
        assert!(start.elapsed() < Duration::from_millis(60));
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_early_handlers_finish() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let done = Arc::new(AtomicU32::new(0));
        let _subs = sleepers(&messenger, &done, &[10, 20, 30]);

        let source = CancellationSource::new();
        let canceller = {
            let source = source.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(15)).await;
                source.cancel();
            })
        };

        let start = Instant::now();
        let report = messenger
            .publisher()
            .global()
            .publish_async(Ping(1), PublishingContext::get(), source.token())
            .await;
        canceller.await.expect("canceller task");

        assert!(start.elapsed() < Duration::from_millis(30));
        assert!(report.cancelled);
        assert_eq!(report.completed, 1);
        assert_eq!(report.detached, 2);
        assert!(done.load(Ordering::SeqCst) < 3);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(messenger.metrics().snapshot().publishes_cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_observes_token() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let stopped_early = Arc::new(AtomicU32::new(0));
        let stopped = Arc::clone(&stopped_early);
        let _sub = messenger.subscriber().global().subscribe(Handler::future_with_context(
            move |_: Ping, _ctx, token: CancellationToken| {
                let stopped = Arc::clone(&stopped);
                async move {
                    tokio::select! {
                        () = tokio::time::sleep(Duration::from_secs(10)) => {}
                        () = token.cancelled() => {
                            stopped.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            },
        ));

        let source = CancellationSource::new();
        let publish = messenger.publisher().global().publish_async(
            Ping(1),
            PublishingContext::get(),
            source.token(),
        );
        let handle = tokio::spawn(publish);
        tokio::time::sleep(Duration::from_millis(5)).await;
        source.cancel();
        handle.await.expect("publish task");
        // The handler may have finished inside the publish or been detached.
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(stopped_early.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_and_forget_completes_in_background() {
        let (messenger, sink) = recording_messenger::<GlobalScope>();
        let done = Arc::new(AtomicU32::new(0));
        let _subs = sleepers(&messenger, &done, &[10, 20]);
        let _failing = messenger.subscriber().global().subscribe(Handler::future(|_: Ping| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err::<(), _>(anyhow::anyhow!("late failure"))
        }));

        messenger.publisher().global().publish(Ping(1), PublishingContext::get());
        assert_eq!(done.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(sink.count(DiagnosticKind::HandlerFault), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishers() {
        let (messenger, _sink) = recording_messenger::<GlobalScope>();
        let total = Arc::new(AtomicU32::new(0));
        let total_h = Arc::clone(&total);
        let _sub = messenger.subscriber().global().subscribe(Handler::sync(move |m: Ping| {
            total_h.fetch_add(m.0, Ordering::SeqCst);
        }));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let publisher = messenger.publisher().global();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        publisher.publish(Ping(1), PublishingContext::get());
                    }
                })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.expect("publisher task");
        }

        assert_eq!(total.load(Ordering::SeqCst), 800);
        assert_eq!(messenger.metrics().snapshot().messages_published, 800);
    }
}
