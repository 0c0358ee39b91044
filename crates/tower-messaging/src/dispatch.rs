//! # Dispatch
//!
//! One publish of one message over one snapshot of a broker's subscriber
//! list.
//!
//! ## Phases
//!
//! 1. **Snapshot** (in [`MessageBroker::begin_dispatch`](crate::MessageBroker)):
//!    entries registered later are never reached.
//! 2. **Invoke**: handlers are started in snapshot order on the calling task.
//!    Entries disposed since the snapshot are skipped. Asynchronous handlers
//!    are polled once so each runs up to its first suspension point before
//!    the next handler starts.
//! 3. **Join** (`publish_async`) or **detach** (`publish`): the remaining
//!    futures are awaited together, or handed to the scheduler.
//!
//! Faults never cross this boundary: each is logged and counted.

use crate::broker::{Entry, Services};
use crate::cancellation::CancellationToken;
use crate::context::{CallerInfo, PublishingContext};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::error::HandlerResult;
use crate::handler::Invocation;
use crate::message::{Message, MessageKind};
use crate::metrics::MessagingMetrics;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::future::{poll_fn, Future};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

/// Outcome of one publish.
///
/// Reports are informational: faults are already logged by the time a
/// report is returned, and nothing in it is an error for the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Handlers in the snapshot
    pub snapshot: usize,
    /// Handlers started
    pub invoked: usize,
    /// Handlers that finished successfully before the report was produced
    pub completed: usize,
    /// Handlers that returned an error or panicked
    pub faulted: usize,
    /// State-bound handlers skipped because the state was dropped
    pub state_dropped: usize,
    /// Snapshot entries disposed before they were reached
    pub skipped_disposed: usize,
    /// Handlers still running when the publish stopped awaiting
    pub detached: usize,
    /// The publish's token was cancelled before every handler finished
    pub cancelled: bool,
}

impl PublishReport {
    /// No faults, no dropped state, not cancelled.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.faulted == 0 && self.state_dropped == 0 && !self.cancelled
    }
}

/// Logs and counts handler outcomes. Cloned into detached tasks.
#[derive(Clone)]
struct FaultReporter {
    sink: Arc<dyn DiagnosticSink>,
    metrics: Arc<MessagingMetrics>,
    message_type: &'static str,
    caller: CallerInfo,
    log_faults: bool,
}

impl FaultReporter {
    fn record(&self, report: &mut PublishReport, result: HandlerResult) {
        match result {
            Ok(()) => report.completed += 1,
            Err(fault) => {
                report.faulted += 1;
                MessagingMetrics::incr(&self.metrics.handler_faults);
                if self.log_faults {
                    self.sink.log_error(&Diagnostic::new(
                        DiagnosticKind::HandlerFault,
                        self.message_type,
                        Some(self.caller),
                        fault.to_string(),
                    ));
                }
            }
        }
    }

    fn warn(&self, kind: DiagnosticKind, detail: impl Into<String>) {
        self.sink.log_warning(&Diagnostic::new(
            kind,
            self.message_type,
            Some(self.caller),
            detail,
        ));
    }
}

pub(crate) struct Dispatch<M> {
    snapshot: Vec<Arc<Entry<M>>>,
    message: M,
    context: PublishingContext,
    token: CancellationToken,
    services: Arc<Services>,
    reporter: FaultReporter,
    pending: Vec<BoxFuture<'static, HandlerResult>>,
    report: PublishReport,
}

impl<M: Message> Dispatch<M> {
    pub(crate) fn new(
        snapshot: Vec<Arc<Entry<M>>>,
        message: M,
        context: PublishingContext,
        token: CancellationToken,
        services: Arc<Services>,
    ) -> Self {
        let reporter = FaultReporter {
            sink: context.sink_or(&services.sink),
            metrics: Arc::clone(&services.metrics),
            message_type: MessageKind::of::<M>().name(),
            caller: context.caller(),
            log_faults: services.config.log_handler_faults,
        };
        let report = PublishReport {
            snapshot: snapshot.len(),
            ..PublishReport::default()
        };
        Self {
            snapshot,
            message,
            context,
            token,
            services,
            reporter,
            pending: Vec::new(),
            report,
        }
    }

    /// Start every snapshot handler in order. Never suspends.
    fn invoke_all(&mut self, cx: &mut Context<'_>) {
        if self.snapshot.is_empty() {
            if self.services.config.warn_on_unsubscribed_publish {
                self.reporter
                    .warn(DiagnosticKind::NoSubscribers, "Published with no subscribers");
            }
            return;
        }

        if self.token.is_cancelled() {
            self.report.cancelled = true;
            MessagingMetrics::incr(&self.services.metrics.publishes_cancelled);
            debug!(
                message_type = self.reporter.message_type,
                "Publish cancelled before dispatch"
            );
            return;
        }

        for entry in std::mem::take(&mut self.snapshot) {
            if !entry.is_active() {
                self.report.skipped_disposed += 1;
                continue;
            }

            let invocation = entry
                .handler
                .invoke(self.message.clone(), &self.context, &self.token);

            match invocation {
                Invocation::StateDropped => {
                    self.report.state_dropped += 1;
                    MessagingMetrics::incr(&self.services.metrics.handlers_state_dropped);
                    self.reporter.sink.log_error(&Diagnostic::new(
                        DiagnosticKind::StateDropped,
                        self.reporter.message_type,
                        Some(self.reporter.caller),
                        format!(
                            "Handler (order {}) skipped: its state no longer exists",
                            entry.order
                        ),
                    ));
                }
                Invocation::Completed(result) => {
                    self.report.invoked += 1;
                    MessagingMetrics::incr(&self.services.metrics.handlers_invoked);
                    self.reporter.record(&mut self.report, result);
                }
                Invocation::Pending(mut future) => {
                    self.report.invoked += 1;
                    MessagingMetrics::incr(&self.services.metrics.handlers_invoked);
                    match future.poll_unpin(cx) {
                        Poll::Ready(result) => self.reporter.record(&mut self.report, result),
                        Poll::Pending => self.pending.push(future),
                    }
                }
            }
        }
    }

    /// Fire-and-forget: invoke now, hand whatever is still running to the
    /// scheduler.
    pub(crate) fn run_detached(mut self) -> PublishReport {
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        self.invoke_all(&mut cx);
        let pending: FuturesUnordered<_> = self.pending.drain(..).collect();
        self.detach(pending);
        self.report
    }

    /// Invoke on first poll, then await every pending handler or the token,
    /// whichever comes first.
    pub(crate) fn run(mut self) -> impl Future<Output = PublishReport> + Send + 'static {
        async move {
            poll_fn(|cx| {
                self.invoke_all(cx);
                Poll::Ready(())
            })
            .await;

            let mut pending: FuturesUnordered<_> = self.pending.drain(..).collect();
            while !pending.is_empty() {
                let step = tokio::select! {
                    biased;
                    next = pending.next() => Step::Finished(next),
                    () = self.token.cancelled() => Step::Cancelled,
                };
                match step {
                    Step::Finished(Some(result)) => self.reporter.record(&mut self.report, result),
                    Step::Finished(None) => break,
                    Step::Cancelled => {
                        self.report.cancelled = true;
                        MessagingMetrics::incr(&self.services.metrics.publishes_cancelled);
                        self.detach(pending);
                        break;
                    }
                }
            }
            self.report
        }
    }

    /// Keep `pending` running on the scheduler; their faults are still
    /// logged when they finish.
    fn detach(&mut self, mut pending: FuturesUnordered<BoxFuture<'static, HandlerResult>>) {
        if pending.is_empty() {
            return;
        }
        let count = pending.len();
        self.report.detached += count;

        let reporter = self.reporter.clone();
        let task = async move {
            let mut background = PublishReport::default();
            while let Some(result) = pending.next().await {
                reporter.record(&mut background, result);
            }
        }
        .boxed();

        if !self.services.scheduler.spawn(task) {
            self.reporter.warn(
                DiagnosticKind::NoRuntime,
                format!("{count} pending handler(s) dropped: no runtime to run them on"),
            );
        } else {
            debug!(
                message_type = self.reporter.message_type,
                detached = count,
                "Pending handlers detached"
            );
        }
    }
}

enum Step {
    Finished(Option<HandlerResult>),
    Cancelled,
}
