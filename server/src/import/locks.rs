use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use itertools::Itertools;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async locks keyed by user id, scoped to one import run. Holding the
/// guard for a login serializes every read-modify-write of that user's
/// document across concurrently running hour workers.
///
/// Entries only live while someone holds or waits for them.
#[derive(Debug, Default)]
pub struct IdentityLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Releases its logins on drop and forgets the ones nobody else wants.
pub struct IdentityGuard<'a> {
    locks: &'a IdentityLocks,
    guards: Vec<(String, OwnedMutexGuard<()>)>,
}

impl IdentityLocks {
    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        self.map().entry(key.to_string()).or_default().clone()
    }

    /// Acquires every key once, in sorted order, so two events touching the
    /// same pair of users can never deadlock.
    pub async fn lock_all<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> IdentityGuard<'_> {
        let mut guard = IdentityGuard {
            locks: self,
            guards: Vec::new(),
        };
        for key in keys.into_iter().sorted().dedup() {
            let lock = self.lock_for(key).lock_owned().await;
            guard.guards.push((key.to_string(), lock));
        }
        guard
    }

    // Only the map holds an entry with a strong count of 1. New handles are
    // cloned under the same mutex, so the check cannot race.
    fn prune(&self, keys: &[String]) {
        let mut locks = self.map();
        for key in keys {
            if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        let released: Vec<String> = std::mem::take(&mut self.guards)
            .into_iter()
            .map(|(key, guard)| {
                drop(guard);
                key
            })
            .collect();
        self.locks.prune(&released);
    }
}
