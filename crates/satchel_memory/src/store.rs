// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-process backing store implementation.
//!
//! This module provides a concurrent in-memory [`BackingStore`] backed by a
//! hash map. Mutations are committed under a write lock; subscribers are
//! notified after the lock is released, on the task that performed the
//! mutation.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;
use satchel_store::{
    BackingStore, Error, Mutation, StoreEvent, StoreEventKind, StoreSubscriber, StoredValue, SubscriptionId, WriteKind,
};

type Map<K, V> = HashMap<K, StoredValue<V>, foldhash::fast::RandomState>;

struct Inner<K, V> {
    map: RwLock<Map<K, V>>,
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn StoreSubscriber<K, V>>)>>,
    next_subscription: AtomicU64,
}

/// A concurrent in-process backing store.
///
/// Cloning is cheap and every clone shares the same underlying map and
/// subscriber set.
///
/// # Examples
///
/// ```
/// use satchel_memory::MemoryStore;
/// use satchel_store::{BackingStore, ExpiryPolicy, StoredValue, WriteKind};
/// use std::time::SystemTime;
/// # futures::executor::block_on(async {
///
/// let store = MemoryStore::<String, i32>::new();
/// let value = StoredValue::new(42, SystemTime::now(), &ExpiryPolicy::Eternal);
///
/// store.put(&"key".to_string(), value, WriteKind::Natural).await?;
/// let read = store.get(&"key".to_string()).await?;
/// assert_eq!(*read.unwrap().value(), 42);
/// # Ok::<(), satchel_store::Error>(())
/// # });
/// ```
pub struct MemoryStore<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> std::fmt::Debug for MemoryStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.inner.map.read().len())
            .field("subscribers", &self.inner.subscribers.read().len())
            .finish()
    }
}

impl<K, V> Clone for MemoryStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MemoryStore<K, V> {
    /// Creates a new empty store.
    ///
    /// # Examples
    ///
    /// ```
    /// use satchel_memory::MemoryStore;
    ///
    /// let store = MemoryStore::<String, i32>::new();
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                map: RwLock::new(Map::default()),
                subscribers: RwLock::new(Vec::new()),
                next_subscription: AtomicU64::new(0),
            }),
        }
    }

    fn notify(&self, event: &StoreEvent<K, V>) {
        let subscribers: Vec<_> = self.inner.subscribers.read().iter().map(|(_, s)| Arc::clone(s)).collect();
        for subscriber in subscribers {
            subscriber.on_event(event);
        }
    }
}

impl<K, V> BackingStore<K, V> for MemoryStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Result<Option<StoredValue<V>>, Error> {
        Ok(self.inner.map.read().get(key).cloned())
    }

    async fn put(&self, key: &K, value: StoredValue<V>, write: WriteKind) -> Result<(), Error> {
        let old = self.inner.map.write().insert(key.clone(), value.clone());
        let kind = if old.is_some() {
            StoreEventKind::Updated
        } else {
            StoreEventKind::Inserted
        };
        self.notify(&StoreEvent {
            kind,
            key: key.clone(),
            old,
            new: Some(value),
            write,
        });
        Ok(())
    }

    async fn remove(&self, key: &K, write: WriteKind) -> Result<Option<StoredValue<V>>, Error> {
        let old = self.inner.map.write().remove(key);
        if old.is_some() {
            self.notify(&StoreEvent {
                kind: StoreEventKind::Removed,
                key: key.clone(),
                old: old.clone(),
                new: None,
                write,
            });
        }
        Ok(old)
    }

    async fn update<R, F>(&self, key: &K, f: F) -> Result<R, Error>
    where
        R: Send,
        F: FnOnce(Option<&StoredValue<V>>) -> (Mutation<V>, R) + Send,
    {
        let (event, result) = {
            let mut map = self.inner.map.write();
            let (mutation, result) = f(map.get(key));
            let event = match mutation {
                Mutation::Keep => None,
                Mutation::Put(value, write) => {
                    let old = map.insert(key.clone(), value.clone());
                    let kind = if old.is_some() {
                        StoreEventKind::Updated
                    } else {
                        StoreEventKind::Inserted
                    };
                    Some(StoreEvent {
                        kind,
                        key: key.clone(),
                        old,
                        new: Some(value),
                        write,
                    })
                }
                Mutation::Remove(write) => map.remove(key).map(|old| StoreEvent {
                    kind: StoreEventKind::Removed,
                    key: key.clone(),
                    old: Some(old),
                    new: None,
                    write,
                }),
            };
            (event, result)
        };
        if let Some(event) = event {
            self.notify(&event);
        }
        Ok(result)
    }

    async fn keys(&self) -> Result<Vec<K>, Error> {
        Ok(self.inner.map.read().keys().cloned().collect())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.inner.map.write().clear();
        Ok(())
    }

    fn len(&self) -> Option<u64> {
        Some(u64::try_from(self.inner.map.read().len()).unwrap_or(u64::MAX))
    }

    fn subscribe(&self, subscriber: Arc<dyn StoreSubscriber<K, V>>) -> SubscriptionId {
        let id = SubscriptionId::new(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.write().push((id, subscriber));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.subscribers.write().retain(|(sub_id, _)| *sub_id != id);
    }
}
