// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Change notifications emitted by backing stores.
//!
//! Stores notify subscribers synchronously, while still holding no internal
//! locks, after each committed mutation. Subscribers see the old and new
//! stored values plus the [`WriteKind`] of the mutation, which lets
//! bookkeeping writes (access-time refreshes, lazy expiry deletions) be told
//! apart from mutations a user actually performed.

use crate::StoredValue;

/// Distinguishes user-visible mutations from internal bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    /// A mutation performed on behalf of a user operation.
    Natural,
    /// An internal bookkeeping mutation, invisible to cache listeners.
    Synthetic,
}

/// The shape of a committed store mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreEventKind {
    /// A value was stored under a previously absent key.
    Inserted,
    /// An existing value was replaced.
    Updated,
    /// A value was removed.
    Removed,
}

/// A committed mutation, as seen by store subscribers.
#[derive(Clone, Debug)]
pub struct StoreEvent<K, V> {
    /// What happened.
    pub kind: StoreEventKind,
    /// The key that was mutated.
    pub key: K,
    /// The stored value before the mutation, if any.
    pub old: Option<StoredValue<V>>,
    /// The stored value after the mutation, if any.
    pub new: Option<StoredValue<V>>,
    /// Whether this was a user mutation or internal bookkeeping.
    pub write: WriteKind,
}

/// Receives committed mutations from a backing store.
///
/// Notification is synchronous: the store invokes `on_event` on the task that
/// performed the mutation, after the mutation has been committed and after
/// all internal locks have been released. Implementations must not block.
pub trait StoreSubscriber<K, V>: Send + Sync {
    /// Called once per committed mutation.
    fn on_event(&self, event: &StoreEvent<K, V>);
}

/// Identifies an active store subscription.
///
/// Returned by [`BackingStore::subscribe`](crate::BackingStore::subscribe)
/// and used to cancel the subscription later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Creates a subscription identifier from a store-assigned token.
    #[must_use]
    pub fn new(token: u64) -> Self {
        Self(token)
    }

    /// Returns the store-assigned token.
    #[must_use]
    pub fn token(&self) -> u64 {
        self.0
    }
}
