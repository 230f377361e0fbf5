//! Extension trait to ignore mutex poisoning.
//!
//! The mutexes in this workspace guard plain value stores (in-memory volume tables, tag
//! caches) where a panic in another thread doesn't invalidate the data.

use std::sync::{Mutex, MutexGuard};

pub trait IgnorePoison<T> {
    /// Locks the mutex, ignoring poison.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;
}

impl<T> IgnorePoison<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|e| e.into_inner())
    }
}
