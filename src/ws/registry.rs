//! Connection registry: the process-wide mapping from user identity to
//! live connection handle.
//!
//! Reads (lookup, snapshot, iteration) vastly outnumber writes, which only
//! happen at connect/disconnect/eviction, so the registry is backed by a
//! sharded concurrent map (DashMap) rather than a single exclusive lock.
//! Entries are never mutated in place — a reconnect replaces the whole entry.

use dashmap::DashMap;
use std::sync::Arc;

use crate::ws::{ConnectionHandle, UserId};

/// Thread-safe user → connection-handle map.
/// At most one handle is registered per user; last-registered wins.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: DashMap<UserId, Arc<dyn ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Insert or replace the entry for `user_id`.
    /// A superseded handle is dropped from the map but not closed here; its
    /// writer task dies with its own socket.
    pub fn register(&self, user_id: UserId, handle: Arc<dyn ConnectionHandle>) {
        self.inner.insert(user_id, handle);
        tracing::debug!(user_id, connections = self.inner.len(), "Connection registered");
    }

    /// Look up the live handle for a user, if connected.
    pub fn lookup(&self, user_id: UserId) -> Option<Arc<dyn ConnectionHandle>> {
        self.inner.get(&user_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove the entry for a user. Removing an absent user is a no-op.
    pub fn remove(&self, user_id: UserId) {
        if self.inner.remove(&user_id).is_some() {
            tracing::debug!(user_id, "Connection unregistered");
        }
    }

    /// Remove the entry for a user only if it still holds `handle`.
    ///
    /// Used by a lifecycle task on disconnect so that a reconnect which
    /// already replaced the entry is not clobbered by the old task's cleanup.
    /// Returns whether an entry was removed.
    pub fn remove_if_same(&self, user_id: UserId, handle: &Arc<dyn ConnectionHandle>) -> bool {
        let removed = self
            .inner
            .remove_if(&user_id, |_, registered| Arc::ptr_eq(registered, handle))
            .is_some();
        if removed {
            tracing::debug!(user_id, "Connection unregistered");
        }
        removed
    }

    /// Point-in-time copy of all registered user identities.
    /// Safe to iterate after the call returns without holding any lock.
    pub fn snapshot_users(&self) -> Vec<UserId> {
        self.inner.iter().map(|entry| *entry.key()).collect()
    }

    /// Point-in-time copy of all (user, handle) pairs.
    pub fn handles(&self) -> Vec<(UserId, Arc<dyn ConnectionHandle>)> {
        self.inner
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    /// Apply `f` to every (user, handle) pair as of call time.
    ///
    /// Iterates over a point-in-time copy, so `f` may call `remove` on any
    /// user — including the one being visited — without deadlocking a shard
    /// or corrupting iteration.
    pub fn for_each_handle<F>(&self, mut f: F)
    where
        F: FnMut(UserId, &Arc<dyn ConnectionHandle>),
    {
        for (user_id, handle) in self.handles() {
            f(user_id, &handle);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
