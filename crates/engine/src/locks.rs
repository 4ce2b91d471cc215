//! Per-record exclusive locks.
//!
//! Read-modify-write cycles on SKUs and orders are serialized per record:
//! a service acquires the record's lock, loads, mutates, persists, and drops
//! the guard. One registry instance exists per record family (products,
//! orders) and is shared by every service touching that family.
//!
//! Waiting is bounded. A caller that cannot get its keys within the
//! configured wait gets [`DomainError::Busy`] with no state changed, which
//! callers may retry with backoff. Multi-key acquisition takes keys in
//! ascending order, so two multi-key callers can never hold pieces of each
//! other's sets in opposite orders.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use depot_core::{DomainError, DomainResult};

/// Registry of exclusive locks keyed by record identifier.
#[derive(Debug, Default)]
pub struct KeyLocks<K> {
    held: Mutex<HashSet<K>>,
    released: Condvar,
}

impl<K: Copy + Eq + Hash + Ord> KeyLocks<K> {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Acquire one key, waiting at most `wait`.
    pub fn acquire(&self, key: K, wait: Duration) -> DomainResult<KeyGuard<'_, K>> {
        self.acquire_many(&[key], wait)
    }

    /// Acquire a set of keys, waiting at most `wait` for the whole set.
    ///
    /// Keys are deduplicated and taken in ascending order. Either every key
    /// ends up held by the returned guard or, on timeout, none are and the
    /// call fails `Busy`.
    pub fn acquire_many(&self, keys: &[K], wait: Duration) -> DomainResult<KeyGuard<'_, K>> {
        let mut wanted: Vec<K> = keys.to_vec();
        wanted.sort();
        wanted.dedup();

        let deadline = Instant::now() + wait;
        let mut held = self
            .held
            .lock()
            .map_err(|_| DomainError::inconsistent("lock registry poisoned"))?;
        let mut taken: Vec<K> = Vec::with_capacity(wanted.len());

        for key in wanted {
            loop {
                if !held.contains(&key) {
                    held.insert(key);
                    taken.push(key);
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    for key in &taken {
                        held.remove(key);
                    }
                    self.released.notify_all();
                    return Err(DomainError::busy(format!(
                        "lock wait exceeded {}ms",
                        wait.as_millis()
                    )));
                }
                let (guard, _timed_out) = self
                    .released
                    .wait_timeout(held, deadline - now)
                    .map_err(|_| DomainError::inconsistent("lock registry poisoned"))?;
                held = guard;
                // Loop re-checks availability and the deadline; spurious
                // wakeups and just-in-time releases both land correctly.
            }
        }

        Ok(KeyGuard {
            registry: self,
            keys: taken,
        })
    }
}

/// Exclusive hold on one or more keys, released on drop.
#[must_use = "dropping the guard releases the locks"]
#[derive(Debug)]
pub struct KeyGuard<'a, K: Copy + Eq + Hash + Ord> {
    registry: &'a KeyLocks<K>,
    keys: Vec<K>,
}

impl<K: Copy + Eq + Hash + Ord> KeyGuard<'_, K> {
    /// The keys this guard holds, ascending.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }
}

impl<K: Copy + Eq + Hash + Ord> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        if let Ok(mut held) = self.registry.held.lock() {
            for key in &self.keys {
                held.remove(key);
            }
        }
        self.registry.released.notify_all();
    }
}
