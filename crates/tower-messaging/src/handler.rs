//! # Handlers
//!
//! Every handler shape (synchronous, asynchronous, with or without the
//! publishing context, with or without a cancellation token, bound to weakly
//! held state) is normalised into one [`Handler`] value. The broker only ever
//! sees the normalised form, so dispatch logic is uniform.
//!
//! Handler bodies return either `()` or `Result<(), E>` with
//! `E: Into<anyhow::Error>`. An `Err` or a panic is a
//! [`HandlerFault`]: it is isolated to that handler and reported, never
//! propagated to the publisher.

use crate::cancellation::CancellationToken;
use crate::context::PublishingContext;
use crate::error::{HandlerFault, HandlerResult};
use crate::message::{AnonMessage, Message};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// Return types accepted from handler bodies.
pub trait IntoHandlerResult {
    fn into_handler_result(self) -> anyhow::Result<()>;
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> IntoHandlerResult for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_handler_result(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

/// Outcome of starting one handler.
pub(crate) enum Invocation {
    /// Ran to completion during the call.
    Completed(HandlerResult),
    /// Started; the rest runs when the future is polled.
    Pending(BoxFuture<'static, HandlerResult>),
    /// The handler's state no longer exists; nothing ran.
    StateDropped,
}

type InvokeFn<M> =
    dyn Fn(M, &PublishingContext, &CancellationToken) -> Invocation + Send + Sync + 'static;

/// A normalised message handler.
pub struct Handler<M> {
    invoke: Box<InvokeFn<M>>,
    state_bound: bool,
}

impl<M: Message> Handler<M> {
    fn from_fn<F>(state_bound: bool, invoke: F) -> Self
    where
        F: Fn(M, &PublishingContext, &CancellationToken) -> Invocation + Send + Sync + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            state_bound,
        }
    }

    /// Synchronous handler.
    pub fn sync<F, R>(handler: F) -> Self
    where
        F: Fn(M) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        Self::from_fn(false, move |message, _, _| run_sync(|| handler(message)))
    }

    /// Synchronous handler receiving the publishing context.
    pub fn sync_with_context<F, R>(handler: F) -> Self
    where
        F: Fn(M, &PublishingContext) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        Self::from_fn(false, move |message, context, _| {
            run_sync(|| handler(message, context))
        })
    }

    /// Asynchronous handler.
    pub fn future<F, Fut, R>(handler: F) -> Self
    where
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult + 'static,
    {
        Self::from_fn(false, move |message, _, _| start_future(|| handler(message)))
    }

    /// Asynchronous handler receiving the publishing context and the
    /// publish's cancellation token.
    pub fn future_with_context<F, Fut, R>(handler: F) -> Self
    where
        F: Fn(M, PublishingContext, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult + 'static,
    {
        Self::from_fn(false, move |message, context, token| {
            start_future(|| handler(message, context.clone(), token.clone()))
        })
    }

    /// Synchronous handler bound to `state`, which is held weakly.
    ///
    /// Once the last strong reference to `state` is gone the handler is
    /// skipped and a `StateDropped` diagnostic is logged for every dispatch
    /// that would have reached it.
    pub fn with_state<T, F, R>(state: &Arc<T>, handler: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, M) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let weak: Weak<T> = Arc::downgrade(state);
        Self::from_fn(true, move |message, _, _| match weak.upgrade() {
            Some(state) => run_sync(|| handler(&state, message)),
            None => Invocation::StateDropped,
        })
    }

    /// Asynchronous handler bound to weakly held `state`.
    ///
    /// The state is upgraded at dispatch and kept alive for the duration of
    /// that one invocation.
    pub fn future_with_state<T, F, Fut, R>(state: &Arc<T>, handler: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>, M, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult + 'static,
    {
        let weak: Weak<T> = Arc::downgrade(state);
        Self::from_fn(true, move |message, _, token| match weak.upgrade() {
            Some(state) => start_future(|| handler(state, message, token.clone())),
            None => Invocation::StateDropped,
        })
    }

    /// Whether this handler holds its state weakly.
    #[must_use]
    pub fn is_state_bound(&self) -> bool {
        self.state_bound
    }

    pub(crate) fn invoke(
        &self,
        message: M,
        context: &PublishingContext,
        token: &CancellationToken,
    ) -> Invocation {
        (self.invoke)(message, context, token)
    }
}

impl Handler<AnonMessage> {
    /// Handler for the anonymous channel.
    pub fn signal<F, R>(handler: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        Self::sync(move |_| handler())
    }
}

impl<M> fmt::Debug for Handler<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("message_type", &std::any::type_name::<M>())
            .field("state_bound", &self.state_bound)
            .finish()
    }
}

fn run_sync<R: IntoHandlerResult>(body: impl FnOnce() -> R) -> Invocation {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => {
            Invocation::Completed(result.into_handler_result().map_err(HandlerFault::Failed))
        }
        Err(payload) => Invocation::Completed(Err(HandlerFault::from_panic(payload))),
    }
}

fn start_future<Fut, R>(make: impl FnOnce() -> Fut) -> Invocation
where
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + 'static,
{
    match catch_unwind(AssertUnwindSafe(make)) {
        Ok(future) => Invocation::Pending(guard(future)),
        Err(payload) => Invocation::Completed(Err(HandlerFault::from_panic(payload))),
    }
}

fn guard<Fut, R>(future: Fut) -> BoxFuture<'static, HandlerResult>
where
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + 'static,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .map(|outcome| match outcome {
            Ok(result) => result.into_handler_result().map_err(HandlerFault::Failed),
            Err(payload) => Err(HandlerFault::from_panic(payload)),
        })
        .boxed()
}
