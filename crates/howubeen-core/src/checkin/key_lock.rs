//! Per-key async mutual exclusion.
//!
//! Entries are created on first use and removed once the last holder or
//! waiter is gone, so the map only ever holds keys with work in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Registry = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Default, Clone)]
pub struct KeyLocks {
    registry: Registry,
}

/// Held for the duration of one critical section on a key.
pub struct KeyLockGuard {
    key: String,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Registry,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder owns `key`, then own it.
    pub async fn acquire(&self, key: &str) -> KeyLockGuard {
        let lock = {
            let mut map = self.registry.lock().unwrap_or_else(|err| err.into_inner());
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        KeyLockGuard {
            key: key.to_string(),
            lock,
            guard: Some(guard),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.registry.lock().unwrap_or_else(|err| err.into_inner());
        // Clones are only handed out under the registry lock: two references
        // (map + this guard) mean nobody else is waiting.
        if let Some(existing) = map.get(&self.key) {
            if Arc::ptr_eq(existing, &self.lock) && Arc::strong_count(&self.lock) == 2 {
                map.remove(&self.key);
            }
        }
    }
}
