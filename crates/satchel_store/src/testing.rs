// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock backing store for testing.
//!
//! This module provides `MockStore`, a configurable in-memory store that
//! records all operations and supports failure injection for testing error paths.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;

use crate::{
    BackingStore, Error, Mutation, StoredValue,
    event::{StoreEvent, StoreEventKind, StoreSubscriber, SubscriptionId, WriteKind},
};

/// Recorded store operation with full context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp<K, V> {
    /// A get operation was performed with the given key.
    Get(K),
    /// A put operation was performed with the given key and value.
    Put {
        /// The key that was written.
        key: K,
        /// The stored value that was written.
        value: StoredValue<V>,
        /// The kind of write.
        write: WriteKind,
    },
    /// A remove operation was performed with the given key.
    Remove {
        /// The key that was removed.
        key: K,
        /// The kind of write.
        write: WriteKind,
    },
    /// An atomic update was performed with the given key.
    Update(K),
    /// A keys snapshot was taken.
    Keys,
    /// A clear operation was performed.
    Clear,
}

type FailPredicate<K, V> = Box<dyn Fn(&StoreOp<K, V>) -> bool + Send + Sync>;

/// A configurable mock backing store for testing.
///
/// This store keeps values in memory and can be configured to fail
/// operations on demand, making it useful for testing error handling paths.
/// All operations are recorded for later verification, and subscribers are
/// notified of committed mutations just like a production store.
///
/// # Examples
///
/// ```no_run
/// use satchel_store::{testing::{MockStore, StoreOp}, BackingStore, ExpiryPolicy, StoredValue, WriteKind};
/// use std::time::SystemTime;
///
/// # async fn example() {
/// let store = MockStore::<String, i32>::new();
/// let value = StoredValue::new(42, SystemTime::UNIX_EPOCH, &ExpiryPolicy::Eternal);
///
/// store.put(&"key".to_string(), value, WriteKind::Natural).await.unwrap();
/// let read = store.get(&"key".to_string()).await.unwrap();
/// assert_eq!(*read.unwrap().value(), 42);
/// # }
/// ```
///
/// # Failure Injection
///
/// ```no_run
/// use satchel_store::{testing::{MockStore, StoreOp}, BackingStore};
///
/// # async fn example() {
/// let store: MockStore<String, i32> = MockStore::new();
///
/// // Fail all get operations
/// store.fail_when(|op| matches!(op, StoreOp::Get(_)));
/// assert!(store.get(&"key".to_string()).await.is_err());
/// # }
/// ```
pub struct MockStore<K, V> {
    data: Arc<Mutex<HashMap<K, StoredValue<V>>>>,
    operations: Arc<Mutex<Vec<StoreOp<K, V>>>>,
    fail_when: Arc<Mutex<Option<FailPredicate<K, V>>>>,
    subscribers: Arc<Mutex<Vec<(SubscriptionId, Arc<dyn StoreSubscriber<K, V>>)>>>,
    next_subscription: Arc<AtomicU64>,
}

impl<K, V> std::fmt::Debug for MockStore<K, V>
where
    K: std::fmt::Debug,
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl<K, V> Clone for MockStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
            subscribers: Arc::clone(&self.subscribers),
            next_subscription: Arc::clone(&self.next_subscription),
        }
    }
}

impl<K, V> Default for MockStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MockStore<K, V> {
    /// Creates a new empty mock store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscription: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<K, V> MockStore<K, V>
where
    K: Eq + Hash,
{
    /// Returns the number of entries in the store.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns true if the store contains the given key.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.data.lock().contains_key(key)
    }
}

impl<K, V> MockStore<K, V>
where
    K: Clone,
    V: Clone,
{
    /// Sets a predicate that determines when operations should fail.
    ///
    /// The predicate receives the operation and returns `true` if it should fail.
    ///
    /// # Examples
    ///
    /// ```
    /// use satchel_store::testing::{MockStore, StoreOp};
    ///
    /// let store: MockStore<String, i32> = MockStore::new();
    ///
    /// // Fail all operations
    /// store.fail_when(|_| true);
    ///
    /// // Fail only gets for a specific key
    /// store.fail_when(|op| matches!(op, StoreOp::Get(k) if k == "bad_key"));
    /// ```
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp<K, V>) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp<K, V>> {
        self.operations.lock().clone()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn record(&self, op: StoreOp<K, V>) {
        self.operations.lock().push(op);
    }

    fn should_fail(&self, op: &StoreOp<K, V>) -> bool {
        self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(op))
    }

    fn notify(&self, event: &StoreEvent<K, V>) {
        let subscribers: Vec<_> = self.subscribers.lock().iter().map(|(_, s)| Arc::clone(s)).collect();
        for subscriber in subscribers {
            subscriber.on_event(event);
        }
    }
}

impl<K, V> BackingStore<K, V> for MockStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Result<Option<StoredValue<V>>, Error> {
        let op = StoreOp::Get(key.clone());
        if self.should_fail(&op) {
            self.record(op);
            return Err(Error::caused_by("mock: get failed"));
        }
        self.record(op);
        Ok(self.data.lock().get(key).cloned())
    }

    async fn put(&self, key: &K, value: StoredValue<V>, write: WriteKind) -> Result<(), Error> {
        let op = StoreOp::Put {
            key: key.clone(),
            value: value.clone(),
            write,
        };
        if self.should_fail(&op) {
            self.record(op);
            return Err(Error::caused_by("mock: put failed"));
        }
        self.record(op);
        let old = self.data.lock().insert(key.clone(), value.clone());
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
        let op = StoreOp::Remove { key: key.clone(), write };
        if self.should_fail(&op) {
            self.record(op);
            return Err(Error::caused_by("mock: remove failed"));
        }
        self.record(op);
        let old = self.data.lock().remove(key);
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
        let op = StoreOp::Update(key.clone());
        if self.should_fail(&op) {
            self.record(op);
            return Err(Error::caused_by("mock: update failed"));
        }
        self.record(op);

        let (event, result) = {
            let mut data = self.data.lock();
            let (mutation, result) = f(data.get(key));
            let event = match mutation {
                Mutation::Keep => None,
                Mutation::Put(value, write) => {
                    let old = data.insert(key.clone(), value.clone());
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
                Mutation::Remove(write) => data.remove(key).map(|old| StoreEvent {
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
        let op = StoreOp::Keys;
        if self.should_fail(&op) {
            self.record(op);
            return Err(Error::caused_by("mock: keys failed"));
        }
        self.record(op);
        Ok(self.data.lock().keys().cloned().collect())
    }

    async fn clear(&self) -> Result<(), Error> {
        let op = StoreOp::Clear;
        if self.should_fail(&op) {
            self.record(op);
            return Err(Error::caused_by("mock: clear failed"));
        }
        self.record(op);
        self.data.lock().clear();
        Ok(())
    }

    fn len(&self) -> Option<u64> {
        Some(u64::try_from(self.data.lock().len()).unwrap_or(u64::MAX))
    }

    fn subscribe(&self, subscriber: Arc<dyn StoreSubscriber<K, V>>) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, subscriber));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().retain(|(sub_id, _)| *sub_id != id);
    }
}
