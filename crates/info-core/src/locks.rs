//! Per-key mutual exclusion.
//!
//! Every read-modify-write against a document runs inside
//! [`KeyLocks::with_key`]. Operations on the same key are serialized; different
//! keys never contend beyond the brief lookup in the lock table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Table of one mutex per document key, created on first use.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// Poisoning is ignored: a panic inside a critical section cannot leave a
    /// half-written document behind, because store writes are atomic.
    pub fn with_key<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Number of keys that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(table.entry(key.to_string()).or_default())
    }
}
