//! Session-wide shared store handle.
//!
//! The [`MessageStore`] is wrapped in `Arc<Mutex<>>` so the reconciler loop,
//! the pagination controller and UI actions can reach it. The lock is never
//! held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use courier_store::MessageStore;

pub type SharedStore = Arc<Mutex<MessageStore>>;

pub fn new_shared_store(monotonic_status: bool) -> SharedStore {
    Arc::new(Mutex::new(MessageStore::with_monotonic_status(monotonic_status)))
}

/// Lock the store. A poisoned lock is recovered: store operations are total
/// and leave it consistent even if a holder panicked.
pub fn lock(store: &SharedStore) -> MutexGuard<'_, MessageStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}
