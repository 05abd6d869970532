use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{Cancellation, ReadonlyStore, WaitFuture};

/// Read-only, memoized view of another cell through a pure transform.
///
/// The last source value and the result computed from it are cached in a single slot. Reads
/// and waits share that slot (as do clones of the derived cell), so the transform runs at most
/// once per distinct source value as long as the source does not flip back and forth and reads
/// are not racing each other. Parallel first reads of a new source value may each run the
/// transform, but they all return the single result that lands in the cache first.
/// Source values are compared with `PartialEq`.
///
/// A derived cell has no listeners of its own and never writes to its source.
pub struct Derived<S, T, R, F> {
    source: S,
    memo: Arc<Memo<T, R, F>>,
}

struct Memo<T, R, F> {
    transform: F,
    cache: Mutex<Option<(T, R)>>,
}

/// Create a [`Derived`] cell over `source`.
///
/// `transform` must be a pure function of its input; an impure transform makes the derived
/// value depend on when it happens to be read.
pub fn derive<S, T, R, F>(source: S, transform: F) -> Derived<S, T, R, F>
where
    S: ReadonlyStore<T>,
    T: Clone + PartialEq + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    F: Fn(&T) -> R + Send + Sync + 'static,
{
    Derived::new(source, transform)
}

impl<T, R, F> Memo<T, R, F>
where
    T: Clone + PartialEq,
    R: Clone,
    F: Fn(&T) -> R,
{
    fn cache(&self) -> MutexGuard<'_, Option<(T, R)>> { self.cache.lock().unwrap_or_else(PoisonError::into_inner) }

    fn apply(&self, input: &T) -> R {
        if let Some((last, result)) = self.cache().as_ref() {
            if last == input {
                return result.clone();
            }
        }

        // not under the lock: the transform may itself read this cell
        let result = (self.transform)(input);
        tracing::trace!("derived value recomputed");

        // double-check: a parallel reader may have filled the slot for this input meanwhile
        let mut cache = self.cache();
        if let Some((last, cached)) = cache.as_ref() {
            if last == input {
                return cached.clone();
            }
        }
        *cache = Some((input.clone(), result.clone()));
        result
    }
}

impl<S, T, R, F> Derived<S, T, R, F>
where
    S: ReadonlyStore<T>,
    T: Clone + PartialEq + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    F: Fn(&T) -> R + Send + Sync + 'static,
{
    pub fn new(source: S, transform: F) -> Self { Self { source, memo: Arc::new(Memo { transform, cache: Mutex::new(None) }) } }

    /// The cell this one is derived from
    pub fn source(&self) -> &S { &self.source }
}

impl<S: Clone, T, R, F> Clone for Derived<S, T, R, F> {
    fn clone(&self) -> Self { Self { source: self.source.clone(), memo: self.memo.clone() } }
}

impl<S, T, R, F> ReadonlyStore<R> for Derived<S, T, R, F>
where
    S: ReadonlyStore<T>,
    T: Clone + PartialEq + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    F: Fn(&T) -> R + Send + Sync + 'static,
{
    fn value(&self) -> R { self.memo.apply(&self.source.value()) }

    /// Waits on the source with the condition applied to the memoized transform, so the
    /// resolved value is the one [`value`](ReadonlyStore::value) reports right after resolution.
    fn wait_map<U, G, C>(&self, token: &C, condition: G) -> WaitFuture<U>
    where
        U: Send + 'static,
        G: Fn(&R) -> Option<U> + Send + Sync + 'static,
        C: Cancellation,
    {
        let memo = self.memo.clone();
        self.source.wait_map(token, move |input: &T| condition(&memo.apply(input)))
    }
}

impl<S, T, R, F> std::fmt::Debug for Derived<S, T, R, F>
where
    S: ReadonlyStore<T>,
    T: Clone + PartialEq + Send + Sync + 'static,
    R: Clone + Send + Sync + std::fmt::Debug + 'static,
    F: Fn(&T) -> R + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("Derived").field("value", &self.value()).finish() }
}
