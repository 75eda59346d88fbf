//! Async mutual exclusion keyed by string.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
struct Slot {
    mutex: Arc<tokio::sync::Mutex<()>>,
    /// Callers holding or waiting for `mutex`.
    users: usize,
}

type LockMap = Arc<Mutex<HashMap<String, Slot>>>;

/// A registry of async locks, one per key, created on demand.
///
/// Entries are dropped again once nobody holds or waits for them, so the
/// map only grows with the number of keys in flight.
#[derive(Debug, Default, Clone)]
pub struct KeyedLocks {
    map: LockMap,
}

/// Registration of one caller against a key. Evicts the key's slot when the
/// last registration goes away, whether the caller got the lock or not.
#[derive(Debug)]
struct Ticket {
    key: String,
    map: LockMap,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = map.get_mut(&self.key) {
            slot.users -= 1;
            if slot.users == 0 {
                map.remove(&self.key);
            }
        }
    }
}

/// Held lock for one key. Releases (and possibly evicts) on drop.
#[derive(Debug)]
pub struct KeyedGuard {
    // Field order matters: the mutex is released before the ticket evicts.
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket,
}

impl KeyedLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let mutex = {
            let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = map.entry(key.to_string()).or_default();
            slot.users += 1;
            Arc::clone(&slot.mutex)
        };
        let ticket = Ticket {
            key: key.to_string(),
            map: Arc::clone(&self.map),
        };

        let guard = mutex.lock_owned().await;

        KeyedGuard {
            _guard: guard,
            _ticket: ticket,
        }
    }

    /// Number of keys currently locked or awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_evicted_after_release() {
        let locks = KeyedLocks::new();

        let guard = locks.lock("s1").await;
        assert_eq!(locks.len(), 1);

        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let guard = locks.lock("s1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("s1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("a").await;

        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_abandoned_waiter_is_evicted() {
        let locks = KeyedLocks::new();
        let holder = locks.lock("s1").await;

        // Poll the waiter once so it queues behind the holder.
        let mut waiter = Box::pin(locks.lock("s1"));
        assert!(
            tokio::time::timeout(Duration::from_millis(10), &mut waiter)
                .await
                .is_err()
        );

        // The release hands the lock to the waiter, which is then dropped
        // without ever running again.
        drop(holder);
        assert_eq!(locks.len(), 1);
        drop(waiter);

        assert!(locks.is_empty());
    }
}
