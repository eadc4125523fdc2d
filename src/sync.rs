//! Synchronisation primitives shared by the flow controller.
//!
//! Under `cfg(loom)` the primitives come from `loom::sync` so the model
//! checker can explore interleavings of producers, drainers, and detaches.
//!
//! Reference counting (`Arc`/`Weak`) always comes from `std`: sinks are held
//! as `Weak<dyn Sink<M>>`, which needs unsized coercion.

use std::sync::{PoisonError, TryLockError};
#[cfg(not(loom))]
pub(crate) use std::sync::{
    Mutex,
    MutexGuard,
    atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering},
};

#[cfg(loom)]
pub(crate) use loom::sync::{
    Mutex,
    MutexGuard,
    atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering},
};

/// Lock `mutex`, recovering the guard if a previous holder panicked.
///
/// A panicking `Sink::accept` must not wedge the decoder thread, so poisoning
/// is ignored and the protected state is used as-is.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Try to lock `mutex` without blocking.
///
/// Returns `None` only when another holder currently owns the lock.
pub(crate) fn try_lock<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}
