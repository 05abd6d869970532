use futures::Stream;

use crate::{Cancellation, Cancelled, ReadonlyStore};

struct Watcher<S, T, C> {
    store: S,
    token: C,
    last: T,
}

enum WatchState<S, T, C> {
    Initial(Watcher<S, T, C>),
    Watching(Watcher<S, T, C>),
}

/// Stream the distinct values of a cell.
///
/// The present value is captured when `watch` is called and is the first item. Every later item
/// is the first value observed after the previous item that differs from it, so the stream
/// never repeats a value back to back. It may skip values that were overwritten before it got
/// to look at them.
///
/// The stream never ends on its own. When `token` is cancelled while waiting for the next
/// change it yields `Err(Cancelled)` and ends.
///
/// The returned stream is not `Unpin`; pin it (`Box::pin`, `std::pin::pin!`) before calling
/// `next()`.
pub fn watch<S, T, C>(token: C, store: S) -> impl Stream<Item = Result<T, Cancelled>> + Send + 'static
where
    S: ReadonlyStore<T> + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
    C: Cancellation,
{
    let last = store.value();
    futures::stream::unfold(Some(WatchState::Initial(Watcher { store, token, last })), |state| async move {
        let state = state?;

        match state {
            WatchState::Initial(watcher) => Some((Ok(watcher.last.clone()), Some(WatchState::Watching(watcher)))),
            WatchState::Watching(watcher) => {
                let last = watcher.last.clone();
                match watcher.store.wait(&watcher.token, move |value: &T| *value != last).await {
                    Ok(value) => Some((Ok(value.clone()), Some(WatchState::Watching(Watcher { last: value, ..watcher })))),
                    Err(Cancelled) => {
                        tracing::debug!("watch cancelled");
                        Some((Err(Cancelled), None))
                    }
                }
            }
        }
    })
}
