use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Storage for a store's present value, with a version that counts accepted writes
pub(crate) struct ValueCell<T>(RwLock<Versioned<T>>);

struct Versioned<T> {
    value: T,
    version: u64,
}

impl<T> ValueCell<T> {
    pub fn new(value: T) -> Self { Self(RwLock::new(Versioned { value, version: 0 })) }

    // No user code runs while these guards are held, so poisoning never leaves a torn value.
    fn read(&self) -> RwLockReadGuard<'_, Versioned<T>> { self.0.read().unwrap_or_else(|e| e.into_inner()) }
    fn write(&self) -> RwLockWriteGuard<'_, Versioned<T>> { self.0.write().unwrap_or_else(|e| e.into_inner()) }

    pub fn version(&self) -> u64 { self.read().version }
}

impl<T: Clone> ValueCell<T> {
    pub fn value(&self) -> T { self.read().value.clone() }

    /// The present value together with the version it was read at
    pub fn snapshot(&self) -> (T, u64) {
        let current = self.read();
        (current.value.clone(), current.version)
    }
}

impl<T: Clone + PartialEq> ValueCell<T> {
    /// Replace the value unless `next` equals it. Returns whether it changed.
    pub fn replace_if_changed(&self, next: T) -> bool {
        let mut current = self.write();
        if current.value == next {
            return false;
        }
        current.value = next;
        current.version += 1;
        true
    }
}
