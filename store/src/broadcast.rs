use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// A unique identifier for a broadcast, used to correlate log lines.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BroadcastId(usize);

impl std::fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{:#x}", self.0) }
}

/// A listener receives a borrow of the broadcast value.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

/// An ordered set of synchronous listeners.
///
/// Listeners are called in registration order. Each `send` dispatches over a snapshot of the
/// registry taken before the first callback runs, and no lock is held while callbacks execute,
/// so a listener may register or drop listeners (or trigger another `send`) without deadlocking.
/// Removals made during a pass only affect later passes.
pub struct Broadcast<T>(Arc<Inner<T>>);

struct Inner<T> {
    listeners: Mutex<BTreeMap<usize, Listener<T>>>,
    next_id: AtomicUsize,
}

impl<T> Inner<T> {
    // Nothing runs user code under this lock, so a poisoned registry is still consistent.
    fn listeners(&self) -> MutexGuard<'_, BTreeMap<usize, Listener<T>>> { self.listeners.lock().unwrap_or_else(PoisonError::into_inner) }
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> std::fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcast").field("id", &self.id()).field("listeners", &self.len()).finish()
    }
}

impl<T> Default for Broadcast<T> {
    fn default() -> Self { Self::new() }
}

/// Removes its listener from the broadcast when dropped.
///
/// The guard does not keep the broadcast alive.
#[must_use = "dropping a ListenerGuard immediately removes the listener"]
pub struct ListenerGuard<T> {
    inner: Weak<Inner<T>>,
    id: usize,
}

impl<T> Broadcast<T> {
    pub fn new() -> Self { Self(Arc::new(Inner { listeners: Mutex::new(BTreeMap::new()), next_id: AtomicUsize::new(0) })) }

    pub fn id(&self) -> BroadcastId { BroadcastId(Arc::as_ptr(&self.0) as *const () as usize) }

    /// Number of currently registered listeners
    pub fn len(&self) -> usize { self.0.listeners().len() }

    /// Register a listener. It stays registered until the returned guard is dropped.
    pub fn listen<F>(&self, listener: F) -> ListenerGuard<T>
    where F: Fn(&T) + Send + Sync + 'static {
        // ids only grow, so BTreeMap order is registration order
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        self.0.listeners().insert(id, Arc::new(listener));
        tracing::trace!(broadcast = %self.id(), listener = id, "listener registered");
        ListenerGuard { inner: Arc::downgrade(&self.0), id }
    }

    /// Calls every listener registered at the time of the call, in registration order.
    pub fn send(&self, value: &T) {
        let snapshot: Vec<(usize, Listener<T>)> = self.0.listeners().iter().map(|(id, l)| (*id, l.clone())).collect();
        tracing::trace!(broadcast = %self.id(), listeners = snapshot.len(), "dispatching");

        for (id, listener) in snapshot {
            tracing::trace!(broadcast = %self.id(), listener = id, "notifying");
            listener(value);
        }
    }

    /// Like [`send`](Self::send), but each listener gets the value `current` returns at the moment
    /// it is called, so a listener reached after a nested `send` never sees a superseded value.
    pub fn send_current(&self, current: impl Fn() -> T) {
        let snapshot: Vec<(usize, Listener<T>)> = self.0.listeners().iter().map(|(id, l)| (*id, l.clone())).collect();
        tracing::trace!(broadcast = %self.id(), listeners = snapshot.len(), "dispatching");

        for (id, listener) in snapshot {
            tracing::trace!(broadcast = %self.id(), listener = id, "notifying");
            listener(&current());
        }
    }

    /// Drop every registered listener. Outstanding guards become no-ops.
    pub fn clear(&self) { self.0.listeners().clear(); }
}

impl<T> ListenerGuard<T> {
    /// The broadcast this guard's listener is registered with
    pub fn broadcast_id(&self) -> BroadcastId { BroadcastId(self.inner.as_ptr() as *const () as usize) }
}

impl<T> Drop for ListenerGuard<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            if inner.listeners().remove(&self.id).is_some() {
                tracing::trace!(broadcast = %self.broadcast_id(), listener = self.id, "listener removed");
            }
        }
    }
}
