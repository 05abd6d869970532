use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::broadcast::{Broadcast, ListenerGuard};

/// Callback run once when a token becomes cancelled
pub type CancelCallback = Box<dyn FnOnce() + Send + 'static>;

/// The cancellation capability consumed by [`wait`](crate::ReadonlyStore::wait) and [`watch`](crate::watch).
///
/// Anything that can answer "already cancelled?", register a callback for "becomes cancelled",
/// and deregister that callback can drive the store's waits: manual triggers, timeouts,
/// parent scopes and so on.
///
/// Implementations must run a callback at most once. A callback registered on a token that is
/// already cancelled must run before `on_cancel` returns.
pub trait Cancellation: Clone + Send + Sync + 'static {
    /// Handle identifying a registered callback
    type Registration: Send + 'static;

    fn is_cancelled(&self) -> bool;

    fn on_cancel(&self, callback: CancelCallback) -> Self::Registration;

    fn off_cancel(&self, registration: Self::Registration);
}

/// A manually triggered cancellation token.
///
/// Clones share state. Cancelling is permanent and idempotent.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<Inner>);

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    callbacks: Broadcast<()>,
    // keeps a child token linked to its parent; dropping it unlinks
    parent: Mutex<Option<CancelRegistration>>,
}

/// Registration of a [`CancelToken`] callback. Dropping it deregisters the callback.
#[must_use = "dropping a CancelRegistration deregisters its callback"]
pub struct CancelRegistration(Option<ListenerGuard<()>>);

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken").field("cancelled", &self.is_cancelled()).finish()
    }
}

fn run_once(slot: &Mutex<Option<CancelCallback>>) {
    let callback = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(callback) = callback {
        callback();
    }
}

impl CancelToken {
    pub fn new() -> Self { Self::default() }

    pub fn is_cancelled(&self) -> bool { self.0.cancelled.load(Ordering::SeqCst) }

    /// Cancel the token, running every registered callback in registration order.
    /// Subsequent calls do nothing.
    pub fn cancel(&self) {
        if self.0.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(callbacks = self.0.callbacks.len(), "cancelling token");
        self.0.callbacks.send(&());
        self.0.callbacks.clear();
        self.0.parent.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Create a token that is cancelled whenever this one is. Cancelling the child does not
    /// affect the parent, and dropping every handle to the child unlinks it from the parent.
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        let weak: Weak<Inner> = Arc::downgrade(&child.0);
        let registration = self.register(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                CancelToken(inner).cancel();
            }
        }));
        if !child.is_cancelled() {
            *child.0.parent.lock().unwrap_or_else(PoisonError::into_inner) = Some(registration);
        }
        child
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let _registration = self.register(Box::new(move || {
            let _ = tx.send(());
        }));
        // the sender is only dropped after it has been used
        let _ = rx.await;
    }

    fn register(&self, callback: CancelCallback) -> CancelRegistration {
        let slot = Arc::new(Mutex::new(Some(callback)));
        if self.is_cancelled() {
            run_once(&slot);
            return CancelRegistration(None);
        }

        let guard = {
            let slot = slot.clone();
            self.0.callbacks.listen(move |_| run_once(&slot))
        };
        // lost a race with cancel() after the snapshot was taken
        if self.is_cancelled() {
            run_once(&slot);
        }
        CancelRegistration(Some(guard))
    }
}

impl Cancellation for CancelToken {
    type Registration = CancelRegistration;

    fn is_cancelled(&self) -> bool { CancelToken::is_cancelled(self) }

    fn on_cancel(&self, callback: CancelCallback) -> CancelRegistration { self.register(callback) }

    fn off_cancel(&self, registration: CancelRegistration) { drop(registration) }
}
