use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::{Cancelled, broadcast::ListenerGuard, cancel::Cancellation};

type Outcome<R> = Result<R, Cancelled>;

/// The future returned by [`wait`](crate::ReadonlyStore::wait) and [`wait_map`](crate::ReadonlyStore::wait_map).
///
/// Waits are eager: the cancellation check, the condition check and the listener registration
/// all happen when the wait is created, so a future that is ready at creation completes on
/// its first poll without suspending.
///
/// Dropping a pending `WaitFuture` removes its store listener and its cancellation callback.
#[must_use = "a pending wait is abandoned when dropped"]
pub struct WaitFuture<R> {
    state: State<R>,
}

enum State<R> {
    Ready(Outcome<R>),
    Pending { receiver: oneshot::Receiver<Outcome<R>>, pending: Arc<dyn Abandon> },
    Done,
}

// R is moved out, never pinned
impl<R> Unpin for WaitFuture<R> {}

impl<R> WaitFuture<R> {
    pub(crate) fn ready(outcome: Outcome<R>) -> Self { Self { state: State::Ready(outcome) } }

    /// True if the wait completed synchronously, without registering anything
    pub fn is_immediate(&self) -> bool { matches!(self.state, State::Ready(_)) }
}

impl<R> Future for WaitFuture<R> {
    type Output = Outcome<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let State::Pending { receiver, .. } = &mut this.state {
            let outcome = match Pin::new(receiver).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(outcome)) => outcome,
                // the resolver is only dropped unsent by abandon(), which only runs from our own Drop
                Poll::Ready(Err(_)) => unreachable!("pending wait dropped its resolver without settling"),
            };
            this.state = State::Done;
            return Poll::Ready(outcome);
        }

        match std::mem::replace(&mut this.state, State::Done) {
            State::Ready(outcome) => Poll::Ready(outcome),
            _ => panic!("WaitFuture polled after completion"),
        }
    }
}

impl<R> Drop for WaitFuture<R> {
    fn drop(&mut self) {
        if let State::Pending { pending, .. } = &self.state {
            pending.abandon();
        }
    }
}

impl<R> std::fmt::Debug for WaitFuture<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Ready(Ok(_)) => "ready",
            State::Ready(Err(_)) => "cancelled",
            State::Pending { .. } => "pending",
            State::Done => "done",
        };
        f.debug_struct("WaitFuture").field("state", &state).finish()
    }
}

trait Abandon: Send + Sync {
    fn abandon(&self);
}

/// One outstanding wait: the condition, the resolver for its future, and the two registrations
/// (store listener, cancellation callback) that must be released when it settles.
///
/// A pending wait settles exactly once, by satisfaction, cancellation or abandonment.
pub(crate) struct PendingWait<T, R, F, C: Cancellation> {
    condition: F,
    token: C,
    slots: Mutex<Slots<T, R, C>>,
}

struct Slots<T, R, C: Cancellation> {
    resolver: Option<oneshot::Sender<Outcome<R>>>,
    listener: Option<ListenerGuard<T>>,
    registration: Option<C::Registration>,
}

impl<T, R, F, C> PendingWait<T, R, F, C>
where
    T: 'static,
    R: Send + 'static,
    F: Fn(&T) -> Option<R> + Send + Sync + 'static,
    C: Cancellation,
{
    pub(crate) fn new(token: C, condition: F) -> (Arc<Self>, WaitFuture<R>) {
        let (resolver, receiver) = oneshot::channel();
        let pending = Arc::new(Self { condition, token, slots: Mutex::new(Slots { resolver: Some(resolver), listener: None, registration: None }) });
        let future = WaitFuture { state: State::Pending { receiver, pending: pending.clone() } };
        (pending, future)
    }

    fn slots(&self) -> MutexGuard<'_, Slots<T, R, C>> { self.slots.lock().unwrap_or_else(PoisonError::into_inner) }

    fn is_settled(&self) -> bool { self.slots().resolver.is_none() }

    /// Evaluate the condition against a new value, resolving the wait if it holds
    pub(crate) fn check(&self, value: &T) {
        if self.is_settled() {
            return;
        }
        // the condition runs without any lock held
        if let Some(output) = (self.condition)(value) {
            self.settle(Some(Ok(output)), "satisfied");
        }
    }

    pub(crate) fn cancel(&self) { self.settle(Some(Err(Cancelled)), "cancelled"); }

    pub(crate) fn attach_listener(&self, listener: ListenerGuard<T>) {
        let mut slots = self.slots();
        if slots.resolver.is_some() {
            slots.listener = Some(listener);
            return;
        }
        drop(slots);
        drop(listener);
    }

    pub(crate) fn attach_registration(&self, registration: C::Registration) {
        let mut slots = self.slots();
        if slots.resolver.is_some() {
            slots.registration = Some(registration);
            return;
        }
        drop(slots);
        self.token.off_cancel(registration);
    }

    fn settle(&self, outcome: Option<Outcome<R>>, reason: &'static str) {
        let (resolver, listener, registration) = {
            let mut slots = self.slots();
            let Some(resolver) = slots.resolver.take() else { return };
            (resolver, slots.listener.take(), slots.registration.take())
        };
        tracing::debug!(reason, "wait settled");

        drop(listener);
        if let Some(registration) = registration {
            self.token.off_cancel(registration);
        }
        if let Some(outcome) = outcome {
            // the receiver may already be gone if the future is being dropped concurrently
            let _ = resolver.send(outcome);
        }
    }
}

impl<T, R, F, C> Abandon for PendingWait<T, R, F, C>
where
    T: 'static,
    R: Send + 'static,
    F: Fn(&T) -> Option<R> + Send + Sync + 'static,
    C: Cancellation,
{
    fn abandon(&self) { self.settle(None, "abandoned"); }
}
