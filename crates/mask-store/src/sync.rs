//! Keyed mutual exclusion.
//!
//! A map of id → async mutex, created on demand. Used to serialize
//! operations per profile id (start/stop/ping) and per proxy id
//! (connectivity checks) while letting distinct ids proceed in parallel.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key exclusive locks. Never two concurrent holders for the same key;
/// independent keys do not contend.
pub struct KeyedLocks<K> {
    inner: StdMutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    /// Acquire the exclusive lock for `key`, waiting if another holder is
    /// active. The guard releases on drop.
    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("keyed lock map poisoned");
            map.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        lock.lock_owned().await
    }

    /// Try to acquire without waiting; `None` if a holder is active.
    pub fn try_acquire(&self, key: K) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut map = self.inner.lock().expect("keyed lock map poisoned");
            map.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        lock.try_lock_owned().ok()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_serializes() {
        let locks = Arc::new(KeyedLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("key").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_independent() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire(1u32).await;
        // A different key must not block.
        let b = locks.try_acquire(2u32);
        assert!(b.is_some());
        // The held key must.
        assert!(locks.try_acquire(1u32).is_none());
    }
}
