// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for cache backing stores.
//!
//! [`BackingStore`] defines the interface the cache adapter drives. A store
//! is a keyed map of [`StoredValue`]s with an atomic read-modify-write
//! primitive and synchronous change notification. Partitioning, replication,
//! and durability are entirely the store's concern; the adapter only relies
//! on the contract spelled out here.

use std::sync::Arc;

use crate::{
    Error, StoredValue,
    event::{StoreSubscriber, SubscriptionId, WriteKind},
};

/// The outcome of an atomic [`BackingStore::update`] closure.
#[derive(Clone, Debug)]
pub enum Mutation<V> {
    /// Leave the entry as it is.
    Keep,
    /// Store this value under the key.
    Put(StoredValue<V>, WriteKind),
    /// Remove the entry, if present.
    Remove(WriteKind),
}

/// Trait for cache backing store implementations.
///
/// Implement this trait to plug a storage engine into the cache adapter.
/// All mutating operations take a [`WriteKind`] so that subscribers can
/// distinguish user mutations from the adapter's internal bookkeeping.
///
/// Stores must notify subscribers synchronously after each committed
/// mutation, including mutations committed through [`update`](Self::update).
/// `clear` is the one exception: it wipes the store without notification.
pub trait BackingStore<K, V>: Send + Sync {
    /// Gets the stored value for a key, if present.
    fn get(&self, key: &K) -> impl Future<Output = Result<Option<StoredValue<V>>, Error>> + Send;

    /// Stores a value under a key, replacing any existing value.
    fn put(&self, key: &K, value: StoredValue<V>, write: WriteKind) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes the value for a key, returning it if one was present.
    fn remove(&self, key: &K, write: WriteKind) -> impl Future<Output = Result<Option<StoredValue<V>>, Error>> + Send;

    /// Atomically inspects the current value for a key and applies the
    /// mutation the closure chooses.
    ///
    /// The closure runs while the store guarantees no concurrent mutation of
    /// the key, so check-and-act sequences (conditional removes and replaces,
    /// entry processors) are linearizable per key. The closure's second
    /// return value is passed back to the caller.
    fn update<R, F>(&self, key: &K, f: F) -> impl Future<Output = Result<R, Error>> + Send
    where
        R: Send,
        F: FnOnce(Option<&StoredValue<V>>) -> (Mutation<V>, R) + Send;

    /// Returns a snapshot of the keys currently present.
    ///
    /// The snapshot may include keys whose values are already expired;
    /// expiry filtering is the caller's responsibility.
    fn keys(&self) -> impl Future<Output = Result<Vec<K>, Error>> + Send;

    /// Removes all entries without notifying subscribers.
    fn clear(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Returns the number of entries, if the store tracks size.
    fn len(&self) -> Option<u64> {
        None
    }

    /// Returns `true` if the store contains no entries.
    ///
    /// Returns `None` for implementations that don't track size.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }

    /// Registers a subscriber for committed mutations.
    fn subscribe(&self, subscriber: Arc<dyn StoreSubscriber<K, V>>) -> SubscriptionId;

    /// Cancels a subscription. Unknown identifiers are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}
