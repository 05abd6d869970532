use std::sync::Arc;

use crate::{
    Cancellation, Cancelled, ReadonlyStore, WaitFuture,
    broadcast::Broadcast,
    value::ValueCell,
    wait::PendingWait,
};

/// Mutable observable cell.
///
/// Holds a value, notifies listeners synchronously when it changes, and lets callers wait for
/// a value matching a condition. Clones share the same cell. Use [`Store::read`] to hand out
/// access without the ability to write.
pub struct Store<T>(Arc<Inner<T>>);

/// Read-only handle to a [`Store`]. It observes the same value but has no setter.
pub struct ReadStore<T>(Arc<Inner<T>>);

struct Inner<T> {
    value: ValueCell<T>,
    listeners: Broadcast<T>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> Clone for ReadStore<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> Store<T>
where T: Clone + PartialEq + Send + Sync + 'static
{
    pub fn new(value: T) -> Self { Self(Arc::new(Inner { value: ValueCell::new(value), listeners: Broadcast::new() })) }

    /// Replace the value.
    ///
    /// Writing a value equal to the present one does nothing. Otherwise every registered listener
    /// is called, in registration order, before `set` returns. Each listener receives the store's
    /// value at the moment it is called. Listeners may write to the store again: the nested
    /// notification runs to completion first, and the listeners the outer pass had not reached
    /// yet then see the newer value, never the one it replaced.
    ///
    /// A condition that panics unwinds out of `set` after the value has been replaced, and the
    /// listeners after it are not notified of this change.
    pub fn set(&self, value: T) {
        if !self.0.value.replace_if_changed(value) {
            tracing::trace!(store = %self.0.listeners.id(), "ignoring write of an equal value");
            return;
        }
        self.0.listeners.send_current(|| self.0.value.value());
    }

    /// Compute the next value from the present one and [`set`](Self::set) it
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.0.value.value());
        self.set(next);
    }

    /// Read-only handle sharing this store
    pub fn read(&self) -> ReadStore<T> { ReadStore(self.0.clone()) }

    /// Number of waits currently registered on this store
    pub fn listener_count(&self) -> usize { self.0.listeners.len() }
}

impl<T> ReadStore<T>
where T: Clone + PartialEq + Send + Sync + 'static
{
    /// Number of waits currently registered on the underlying store
    pub fn listener_count(&self) -> usize { self.0.listeners.len() }
}

impl<T> Inner<T>
where T: Clone + PartialEq + Send + Sync + 'static
{
    fn wait_map<R, F, C>(&self, token: &C, condition: F) -> WaitFuture<R>
    where
        R: Send + 'static,
        F: Fn(&T) -> Option<R> + Send + Sync + 'static,
        C: Cancellation,
    {
        if token.is_cancelled() {
            tracing::debug!(store = %self.listeners.id(), "wait requested with a cancelled token");
            return WaitFuture::ready(Err(Cancelled));
        }

        let (value, version) = self.value.snapshot();
        if let Some(output) = condition(&value) {
            return WaitFuture::ready(Ok(output));
        }

        let (pending, future) = PendingWait::new(token.clone(), condition);
        pending.attach_listener({
            let pending = pending.clone();
            self.listeners.listen(move |value: &T| pending.check(value))
        });
        pending.attach_registration({
            let pending = pending.clone();
            token.on_cancel(Box::new(move || pending.cancel()))
        });
        tracing::trace!(store = %self.listeners.id(), "wait registered");

        // a write from another thread may have landed between the snapshot and registration
        if self.value.version() != version {
            pending.check(&self.value.value());
        }

        future
    }
}

impl<T> ReadonlyStore<T> for Store<T>
where T: Clone + PartialEq + Send + Sync + 'static
{
    fn value(&self) -> T { self.0.value.value() }

    fn wait_map<R, F, C>(&self, token: &C, condition: F) -> WaitFuture<R>
    where
        R: Send + 'static,
        F: Fn(&T) -> Option<R> + Send + Sync + 'static,
        C: Cancellation,
    {
        self.0.wait_map(token, condition)
    }
}

impl<T> ReadonlyStore<T> for ReadStore<T>
where T: Clone + PartialEq + Send + Sync + 'static
{
    fn value(&self) -> T { self.0.value.value() }

    fn wait_map<R, F, C>(&self, token: &C, condition: F) -> WaitFuture<R>
    where
        R: Send + 'static,
        F: Fn(&T) -> Option<R> + Send + Sync + 'static,
        C: Cancellation,
    {
        self.0.wait_map(token, condition)
    }
}

impl<T: std::fmt::Debug + Clone> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("value", &self.0.value.value()).field("listeners", &self.0.listeners.len()).finish()
    }
}

impl<T: std::fmt::Debug + Clone> std::fmt::Debug for ReadStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStore").field("value", &self.0.value.value()).field("listeners", &self.0.listeners.len()).finish()
    }
}

impl<T: std::fmt::Display + Clone> std::fmt::Display for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0.value.value()) }
}

impl<T: std::fmt::Display + Clone> std::fmt::Display for ReadStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0.value.value()) }
}
