use crate::{Cancellation, Derived, WaitFuture};

/// Read and wait access shared by every cell: [`Store`](crate::Store), [`ReadStore`](crate::ReadStore)
/// and [`Derived`].
pub trait ReadonlyStore<T>: Send + Sync {
    /// The present value
    fn value(&self) -> T;

    /// Wait until `condition` returns `Some`, resolving with what it returned.
    ///
    /// This is the narrowing form of [`wait`](Self::wait): the condition can both decide
    /// whether to stop and extract a more specific value (for example the payload of an enum
    /// variant). Semantics are otherwise identical:
    ///
    /// - an already cancelled token yields `Err(Cancelled)` right away and registers nothing
    /// - if the condition holds for the present value the future is ready right away and
    ///   registers nothing
    /// - otherwise the condition is re-evaluated synchronously on every change until it holds
    ///   or the token is cancelled, whichever comes first
    fn wait_map<R, F, C>(&self, token: &C, condition: F) -> WaitFuture<R>
    where
        R: Send + 'static,
        F: Fn(&T) -> Option<R> + Send + Sync + 'static,
        C: Cancellation;

    /// Wait until `predicate` holds, resolving with the value it held for.
    fn wait<F, C>(&self, token: &C, predicate: F) -> WaitFuture<T>
    where
        T: Clone + Send + 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
        C: Cancellation,
    {
        self.wait_map(token, move |value: &T| predicate(value).then(|| value.clone()))
    }

    /// A read-only, memoized view of this cell through `transform`. See [`derive`](crate::derive).
    fn derive<R, F>(self, transform: F) -> Derived<Self, T, R, F>
    where
        Self: Sized,
        T: Clone + PartialEq + Send + Sync + 'static,
        R: Clone + Send + Sync + 'static,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        Derived::new(self, transform)
    }
}
