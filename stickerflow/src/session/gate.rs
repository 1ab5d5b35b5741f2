//! Session gate and its RAII guard.
//!
//! A [`SessionGate`] admits at most one active run per key. A second attempt
//! for a busy key is rejected, never queued. Distinct keys never block each
//! other.

use crate::core::UserId;
use dashmap::DashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

/// Tracks which keys currently have an active run.
///
/// Cloning shares the underlying state, so one gate can be handed to every
/// pipeline in the process.
#[derive(Clone)]
pub struct SessionGate<K = UserId>
where
    K: Eq + Hash,
{
    active: Arc<DashSet<K>>,
}

impl<K> Default for SessionGate<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            active: Arc::new(DashSet::new()),
        }
    }
}

impl<K> fmt::Debug for SessionGate<K>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGate")
            .field("active", &self.active.len())
            .finish()
    }
}

impl<K> SessionGate<K>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    /// Creates an empty gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` busy and returns true iff it was idle.
    pub fn try_acquire(&self, key: K) -> bool {
        let acquired = self.active.insert(key.clone());
        debug!(key = %key, acquired, "Session acquire");
        acquired
    }

    /// Clears the busy flag for `key` unconditionally.
    pub fn release(&self, key: &K) {
        if self.active.remove(key).is_some() {
            debug!(key = %key, "Session released");
        }
    }

    /// Returns true if `key` has an active run.
    #[must_use]
    pub fn is_active(&self, key: &K) -> bool {
        self.active.contains(key)
    }

    /// Number of keys with an active run.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Acquires `key` and returns a guard that releases it exactly once.
    ///
    /// Returns `None` when a run is already active for `key`.
    #[must_use]
    pub fn lock(&self, key: K) -> Option<SessionGuard<K>> {
        if self.try_acquire(key.clone()) {
            Some(SessionGuard {
                gate: self.clone(),
                key,
                released: false,
            })
        } else {
            None
        }
    }
}

/// Holds a key busy until dropped or explicitly released.
pub struct SessionGuard<K = UserId>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    gate: SessionGate<K>,
    key: K,
    released: bool,
}

impl<K> SessionGuard<K>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    /// The guarded key.
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Releases the key now. Dropping afterwards is a no-op.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.gate.release(&self.key);
        }
    }
}

impl<K> Drop for SessionGuard<K>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    fn drop(&mut self) {
        self.release_once();
    }
}

impl<K> fmt::Debug for SessionGuard<K>
where
    K: Eq + Hash + Clone + fmt::Display + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("key", &self.key)
            .field("released", &self.released)
            .finish()
    }
}
