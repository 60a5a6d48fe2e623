//! At most one build per cache key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::OwnedMutexGuard;

/// Registry of per-key build locks.
///
/// Callers hold the guard for a key while they check the cache and build.
/// A second caller for the same key waits, then finds the first caller's
/// result in the cache. Locks are dropped from the registry once nobody
/// holds or waits on them.
#[derive(Debug, Default)]
pub struct InflightBuilds {
    locks: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl InflightBuilds {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive build rights on `digest`.
    pub async fn acquire(&self, digest: &str) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(digest);
        lock.lock_owned().await
    }

    fn lock_for(&self, digest: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(digest).and_then(Weak::upgrade) {
            return lock;
        }

        locks.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(digest.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Keys with a live lock.
    #[must_use]
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
