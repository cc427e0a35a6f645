// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cache itself.
//!
//! Every operation goes through the same shape: check the cache is open,
//! read the entry (treating an expired value as absent and scheduling an
//! expiry event), consult the writer before committing any mutation, commit
//! to the backing store, then flush buffered expiry events and record
//! statistics.

use std::{
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyspawn::JoinHandle;
use parking_lot::Mutex;
use satchel_store::{BackingStore, ExpiryPolicy, Mutation, StoredValue, SubscriptionId, WriteKind};
use tick::Clock;

use crate::{
    Error, ErrorKind,
    builder::CacheBuilder,
    convert::{ConverterPair, Internal},
    events::{CacheEntryEvent, DispatchMode, EventBuffer, EventDispatcher, EventKind, ForwardingSubscriber},
    listener::{CacheEntryListener, ListenerConfig, ListenerId},
    loader::{CacheLoader, NullLoader},
    processor::{EntryProcessor, MutableEntry, Outcome},
    stats::{CacheStatistics, StatCounters},
    writer::{CacheWriter, NullWriter},
};

/// A cache of key-value entries over a pluggable backing store.
///
/// Entries expire lazily under the configured [`ExpiryPolicy`]; an external
/// system of record can be attached through a [`CacheLoader`] and a
/// [`CacheWriter`]; listeners observe entry lifecycle events. Cloning a
/// cache is cheap and every clone operates on the same entries.
///
/// # Examples
///
/// ```
/// use satchel::Cache;
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let cache = Cache::builder::<String, i32>(Clock::new_frozen())
///     .memory()
///     .build();
///
/// cache.put(&"a".to_string(), 1).await?;
/// assert_eq!(cache.get(&"a".to_string()).await?, Some(1));
/// # Ok::<(), satchel::Error>(())
/// # }).unwrap();
/// ```
pub struct Cache<K, V, S, L = NullLoader, W = NullWriter> {
    inner: Arc<Inner<K, V, S, L, W>>,
}

impl<K, V, S, L, W> Clone for Cache<K, V, S, L, W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, S, L, W> std::fmt::Debug for Cache<K, V, S, L, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.inner.name)
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

struct Inner<K, V, S, L, W> {
    name: &'static str,
    store: S,
    clock: Clock,
    policy: ExpiryPolicy,
    key_converter: ConverterPair<K>,
    value_converter: ConverterPair<V>,
    loader: Option<L>,
    writer: Option<W>,
    read_through: bool,
    write_through: bool,
    stats: StatCounters,
    dispatcher: Arc<EventDispatcher<K, V>>,
    subscriptions: Mutex<Subscriptions>,
    closed: AtomicBool,
}

/// The store subscriptions backing the two listener sets, at most one each.
#[derive(Debug, Default)]
struct Subscriptions {
    sync: Option<SubscriptionId>,
    asynchronous: Option<SubscriptionId>,
}

impl Subscriptions {
    fn slot(&mut self, mode: DispatchMode) -> &mut Option<SubscriptionId> {
        match mode {
            DispatchMode::Sync => &mut self.sync,
            DispatchMode::Async => &mut self.asynchronous,
        }
    }
}

pub(crate) struct CacheConfig<K, V, S, L, W> {
    pub name: &'static str,
    pub store: S,
    pub clock: Clock,
    pub policy: ExpiryPolicy,
    pub key_converter: ConverterPair<K>,
    pub value_converter: ConverterPair<V>,
    pub loader: Option<L>,
    pub writer: Option<W>,
    pub read_through: bool,
    pub write_through: bool,
    pub statistics: bool,
    pub spawner: Option<anyspawn::Spawner>,
}

impl Cache<(), (), ()> {
    /// Starts building a cache.
    ///
    /// # Examples
    ///
    /// ```
    /// use satchel::Cache;
    /// use tick::Clock;
    ///
    /// let clock = Clock::new_frozen();
    /// let cache = Cache::builder::<String, i32>(clock)
    ///     .memory()
    ///     .build();
    /// ```
    #[must_use]
    pub fn builder<K, V>(clock: Clock) -> CacheBuilder<K, V> {
        CacheBuilder::new(clock)
    }
}

impl<K, V, S, L, W> Cache<K, V, S, L, W>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BackingStore<Internal<K>, Internal<V>> + 'static,
    L: CacheLoader<K, V> + 'static,
    W: CacheWriter<K, V> + 'static,
{
    pub(crate) fn new(config: CacheConfig<K, V, S, L, W>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: config.name,
                store: config.store,
                clock: config.clock,
                policy: config.policy,
                key_converter: config.key_converter,
                value_converter: config.value_converter,
                loader: config.loader,
                writer: config.writer,
                read_through: config.read_through,
                write_through: config.write_through,
                stats: StatCounters::new(config.statistics),
                dispatcher: Arc::new(EventDispatcher::new(config.spawner)),
                subscriptions: Mutex::new(Subscriptions::default()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Gets the value for a key.
    ///
    /// With read-through enabled, a miss consults the loader and caches
    /// whatever it produces.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed, the store or loader fails, or a
    /// conversion fails.
    pub async fn get(&self, key: &K) -> Result<Option<V>, Error> {
        self.ensure_open()?;
        let watch = self.inner.clock.stopwatch();
        let mut buffer = EventBuffer::new();
        let ikey = self.inner.key_converter.to_internal(key)?;
        let result = self.get_inner(&ikey, key, &mut buffer).await;
        buffer.flush(&self.inner.dispatcher);
        self.inner.stats.record_get_time(watch.elapsed());
        result
    }

    async fn get_inner(
        &self,
        ikey: &Internal<K>,
        key: &K,
        buffer: &mut EventBuffer<K, V>,
    ) -> Result<Option<V>, Error> {
        if let Some(stored) = self.read_live(ikey, key, buffer).await? {
            self.inner.stats.record_hits(1);
            let value = self.inner.value_converter.from_internal(stored.value())?;
            self.record_access(ikey, stored).await?;
            return Ok(Some(value));
        }
        self.inner.stats.record_misses(1);
        self.load_one(ikey, key).await
    }

    /// Returns `true` if the cache holds a live value for the key.
    ///
    /// Does not consult the loader and does not count towards statistics.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed or the store fails.
    pub async fn contains_key(&self, key: &K) -> Result<bool, Error> {
        self.ensure_open()?;
        let mut buffer = EventBuffer::new();
        let ikey = self.inner.key_converter.to_internal(key)?;
        let result = self.read_live(&ikey, key, &mut buffer).await;
        buffer.flush(&self.inner.dispatcher);
        Ok(result?.is_some())
    }

    /// Stores a value under a key, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed, the store or writer fails, or a
    /// conversion fails. A writer failure leaves the cached entry untouched.
    pub async fn put(&self, key: &K, value: V) -> Result<(), Error> {
        self.ensure_open()?;
        let watch = self.inner.clock.stopwatch();
        let mut buffer = EventBuffer::new();
        let ikey = self.inner.key_converter.to_internal(key)?;
        let result = self.store_value(&ikey, key, &value, &mut buffer).await;
        buffer.flush(&self.inner.dispatcher);
        self.inner.stats.record_put_time(watch.elapsed());
        let (_, stored) = result?;
        if stored {
            self.inner.stats.record_puts(1);
        }
        Ok(())
    }

    /// Stores a value under a key only if the key has no live value.
    ///
    /// Returns `true` if the value was stored.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed, the store or writer fails, or a
    /// conversion fails.
    pub async fn put_if_absent(&self, key: &K, value: V) -> Result<bool, Error> {
        self.ensure_open()?;
        let watch = self.inner.clock.stopwatch();
        let mut buffer = EventBuffer::new();
        let ikey = self.inner.key_converter.to_internal(key)?;
        let result = self.put_if_absent_inner(&ikey, key, &value, &mut buffer).await;
        buffer.flush(&self.inner.dispatcher);
        self.inner.stats.record_put_time(watch.elapsed());
        result
    }

    async fn put_if_absent_inner(
        &self,
        ikey: &Internal<K>,
        key: &K,
        value: &V,
        buffer: &mut EventBuffer<K, V>,
    ) -> Result<bool, Error> {
        if self.read_live(ikey, key, buffer).await?.is_some() {
            self.inner.stats.record_hits(1);
            return Ok(false);
        }
        self.inner.stats.record_misses(1);
        self.write_to_source(key, value).await?;
        let inserted = self.inner.store.update(ikey, {
            let now = self.inner.clock.system_time();
            let ivalue = self.inner.value_converter.to_internal(value)?;
            let stored = StoredValue::new(ivalue, now, &self.inner.policy);
            move |current| {
                if current.is_some_and(|sv| !sv.is_expired_at(now)) {
                    return (Mutation::Keep, false);
                }
                if stored.is_expired_at(now) {
                    // Born expired: never stored.
                    return (Mutation::Keep, false);
                }
                (Mutation::Put(stored, WriteKind::Natural), true)
            }
        }).await?;
        if inserted {
            self.inner.stats.record_puts(1);
        }
        Ok(inserted)
    }

    /// Stores a value under a key and returns the value it replaced.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed, the store or writer fails, or a
    /// conversion fails.
    pub async fn get_and_put(&self, key: &K, value: V) -> Result<Option<V>, Error> {
        self.ensure_open()?;
        let watch = self.inner.clock.stopwatch();
        let mut buffer = EventBuffer::new();
        let ikey = self.inner.key_converter.to_internal(key)?;
        let result = self.store_value(&ikey, key, &value, &mut buffer).await;
        buffer.flush(&self.inner.dispatcher);
        self.inner.stats.record_put_time(watch.elapsed());
        let (old, stored) = result?;
        if stored {
            self.inner.stats.record_puts(1);
        }
        match old {
            Some(previous) => {
                self.inner.stats.record_hits(1);
                Ok(Some(self.inner.value_converter.from_internal(previous.value())?))
            }
            None => {
                self.inner.stats.record_misses(1);
                Ok(None)
            }
        }
    }

    /// Stores every entry of `entries`, replacing existing values.
    ///
    /// # Errors
    ///
    /// Fails on the first entry that cannot be stored; earlier entries
    /// remain stored.
    pub async fn put_all(&self, entries: impl IntoIterator<Item = (K, V)> + Send) -> Result<(), Error> {
        for (key, value) in entries {
            self.put(&key, value).await?;
        }
        Ok(())
    }

    /// Gets the values for a batch of keys.
    ///
    /// Keys without a live value (after read-through, when enabled) are
    /// absent from the result.
    ///
    /// # Errors
    ///
    /// Fails on the first key that cannot be read.
    pub async fn get_all(&self, keys: impl IntoIterator<Item = K> + Send) -> Result<Vec<(K, V)>, Error> {
        let mut found = Vec::new();
        for key in keys {
            if let Some(value) = self.get(&key).await? {
                found.push((key, value));
            }
        }
        Ok(found)
    }

    /// Removes the value for a key.
    ///
    /// Returns `true` if a live value was removed. With write-through
    /// enabled the writer's delete runs even when the key is absent.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed or the store or writer fails.
    pub async fn remove(&self, key: &K) -> Result<bool, Error> {
        self.ensure_open()?;
        let watch = self.inner.clock.stopwatch();
        let mut buffer = EventBuffer::new();
        let ikey = self.inner.key_converter.to_internal(key)?;
        let result = self.remove_inner(&ikey, key, &mut buffer).await;
        buffer.flush(&self.inner.dispatcher);
        self.inner.stats.record_remove_time(watch.elapsed());
        Ok(result?.is_some())
    }

    /// Removes the value for a key and returns it.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed or the store or writer fails.
    pub async fn get_and_remove(&self, key: &K) -> Result<Option<V>, Error> {
        self.ensure_open()?;
        let watch = self.inner.clock.stopwatch();
        let mut buffer = EventBuffer::new();
        let ikey = self.inner.key_converter.to_internal(key)?;
        let result = self.remove_inner(&ikey, key, &mut buffer).await;
        buffer.flush(&self.inner.dispatcher);
        self.inner.stats.record_remove_time(watch.elapsed());
        match result? {
            Some(stored) => {
                self.inner.stats.record_hits(1);
                Ok(Some(self.inner.value_converter.from_internal(stored.value())?))
            }
            None => {
                self.inner.stats.record_misses(1);
                Ok(None)
            }
        }
    }

    /// Removes the value for a key only if it equals `expected`.
    ///
    /// Returns `true` if the value was removed.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed, the store or writer fails, or a
    /// conversion fails.
    pub async fn remove_if_equals(&self, key: &K, expected: &V) -> Result<bool, Error>
    where
        V: PartialEq,
    {
        self.ensure_open()?;
        let watch = self.inner.clock.stopwatch();
        let mut buffer = EventBuffer::new();
        let ikey = self.inner.key_converter.to_internal(key)?;
        let result = self.remove_if_equals_inner(&ikey, key, expected, &mut buffer).await;
        buffer.flush(&self.inner.dispatcher);
        self.inner.stats.record_remove_time(watch.elapsed());
        result
    }

    async fn remove_if_equals_inner(
        &self,
        ikey: &Internal<K>,
        key: &K,
        expected: &V,
        buffer: &mut EventBuffer<K, V>,
    ) -> Result<bool, Error>
    where
        V: PartialEq,
    {
        let Some(stored) = self.read_live(ikey, key, buffer).await? else {
            self.inner.stats.record_misses(1);
            return Ok(false);
        };
        self.inner.stats.record_hits(1);
        let current = self.inner.value_converter.from_internal(stored.value())?;
        if current != *expected {
            self.record_access(ikey, stored).await?;
            return Ok(false);
        }
        self.delete_from_source(key).await?;
        let iexpected = self.inner.value_converter.to_internal(expected)?;
        let removed = self
            .inner
            .store
            .update(ikey, move |current| match current {
                Some(sv) if *sv.value() == iexpected => (Mutation::Remove(WriteKind::Natural), true),
                _ => (Mutation::Keep, false),
            })
            .await?;
        if removed {
            self.inner.stats.record_removals(1);
        }
        Ok(removed)
    }

    /// Replaces the value for a key only if the key has a live value.
    ///
    /// Returns `true` if the value was replaced.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed, the store or writer fails, or a
    /// conversion fails.
    pub async fn replace(&self, key: &K, value: V) -> Result<bool, Error> {
        self.ensure_open()?;
        let watch = self.inner.clock.stopwatch();
        let mut buffer = EventBuffer::new();
        let ikey = self.inner.key_converter.to_internal(key)?;
        let result = self.replace_inner(&ikey, key, &value, &mut buffer).await;
        buffer.flush(&self.inner.dispatcher);
        self.inner.stats.record_put_time(watch.elapsed());
        Ok(result?.is_some())
    }

    /// Replaces the value for a key only if it currently equals `expected`.
    ///
    /// Returns `true` if the value was replaced.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed, the store or writer fails, or a
    /// conversion fails.
    pub async fn replace_if_equals(&self, key: &K, expected: &V, value: V) -> Result<bool, Error>
    where
        V: PartialEq,
    {
        self.ensure_open()?;
        let watch = self.inner.clock.stopwatch();
        let mut buffer = EventBuffer::new();
        let ikey = self.inner.key_converter.to_internal(key)?;
        let result = self
            .replace_if_equals_inner(&ikey, key, expected, &value, &mut buffer)
            .await;
        buffer.flush(&self.inner.dispatcher);
        self.inner.stats.record_put_time(watch.elapsed());
        result
    }

    /// Replaces the value for a key and returns the value it replaced, only
    /// if the key has a live value.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed, the store or writer fails, or a
    /// conversion fails.
    pub async fn get_and_replace(&self, key: &K, value: V) -> Result<Option<V>, Error> {
        self.ensure_open()?;
        let watch = self.inner.clock.stopwatch();
        let mut buffer = EventBuffer::new();
        let ikey = self.inner.key_converter.to_internal(key)?;
        let result = self.replace_inner(&ikey, key, &value, &mut buffer).await;
        buffer.flush(&self.inner.dispatcher);
        self.inner.stats.record_put_time(watch.elapsed());
        match result? {
            Some(stored) => Ok(Some(self.inner.value_converter.from_internal(stored.value())?)),
            None => Ok(None),
        }
    }

    /// Shared body of the unconditional replace operations. Returns the
    /// replaced value.
    async fn replace_inner(
        &self,
        ikey: &Internal<K>,
        key: &K,
        value: &V,
        buffer: &mut EventBuffer<K, V>,
    ) -> Result<Option<StoredValue<Internal<V>>>, Error> {
        let Some(stored) = self.read_live(ikey, key, buffer).await? else {
            self.inner.stats.record_misses(1);
            return Ok(None);
        };
        self.inner.stats.record_hits(1);
        self.write_to_source(key, value).await?;
        let now = self.inner.clock.system_time();
        let ivalue = self.inner.value_converter.to_internal(value)?;
        let updated = stored.clone().updated(ivalue, now, &self.inner.policy);
        let born_expired = updated.is_expired_at(now);
        let replaced = self
            .inner
            .store
            .update(ikey, move |current| {
                let Some(current) = current else {
                    return (Mutation::Keep, false);
                };
                if current.is_expired_at(now) {
                    return (Mutation::Keep, false);
                }
                if born_expired {
                    // Replaced into immediate expiry; the value vanishes
                    // without an event.
                    (Mutation::Remove(WriteKind::Synthetic), true)
                } else {
                    (Mutation::Put(updated, WriteKind::Natural), true)
                }
            })
            .await?;
        if replaced {
            if !born_expired {
                self.inner.stats.record_puts(1);
            }
            Ok(Some(stored))
        } else {
            Ok(None)
        }
    }

    async fn replace_if_equals_inner(
        &self,
        ikey: &Internal<K>,
        key: &K,
        expected: &V,
        value: &V,
        buffer: &mut EventBuffer<K, V>,
    ) -> Result<bool, Error>
    where
        V: PartialEq,
    {
        let Some(stored) = self.read_live(ikey, key, buffer).await? else {
            self.inner.stats.record_misses(1);
            return Ok(false);
        };
        self.inner.stats.record_hits(1);
        let iexpected = self.inner.value_converter.to_internal(expected)?;
        if *stored.value() != iexpected {
            self.record_access(ikey, stored).await?;
            return Ok(false);
        }
        self.write_to_source(key, value).await?;
        let now = self.inner.clock.system_time();
        let ivalue = self.inner.value_converter.to_internal(value)?;
        let updated = stored.updated(ivalue, now, &self.inner.policy);
        let born_expired = updated.is_expired_at(now);
        let replaced = self
            .inner
            .store
            .update(ikey, move |current| {
                let Some(current) = current else {
                    return (Mutation::Keep, false);
                };
                if current.is_expired_at(now) || *current.value() != iexpected {
                    return (Mutation::Keep, false);
                }
                if born_expired {
                    (Mutation::Remove(WriteKind::Synthetic), true)
                } else {
                    (Mutation::Put(updated, WriteKind::Natural), true)
                }
            })
            .await?;
        if replaced && !born_expired {
            self.inner.stats.record_puts(1);
        }
        Ok(replaced)
    }

    /// Removes the values for a batch of keys.
    ///
    /// With write-through enabled the writer's delete runs for every key,
    /// present or not.
    ///
    /// # Errors
    ///
    /// Fails on the first key that cannot be removed.
    pub async fn remove_all(&self, keys: impl IntoIterator<Item = K> + Send) -> Result<(), Error> {
        for key in keys {
            let _ = self.remove(&key).await?;
        }
        Ok(())
    }

    /// Removes every entry, raising removal events and consulting the
    /// writer for each.
    ///
    /// # Errors
    ///
    /// Fails on the first entry that cannot be removed.
    pub async fn remove_all_entries(&self) -> Result<(), Error> {
        self.ensure_open()?;
        let keys = self.inner.store.keys().await?;
        for ikey in keys {
            let key = self.inner.key_converter.from_internal(&ikey)?;
            let _ = self.remove(&key).await?;
        }
        Ok(())
    }

    /// Discards every entry without events, without the writer, and without
    /// touching statistics.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed or the store fails.
    pub async fn clear(&self) -> Result<(), Error> {
        self.ensure_open()?;
        Ok(self.inner.store.clear().await?)
    }

    /// Returns a snapshot of every live entry.
    ///
    /// Reading an entry this way counts as an access for expiry purposes
    /// but not for statistics.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed, the store fails, or a conversion fails.
    pub async fn entries(&self) -> Result<Vec<(K, V)>, Error> {
        self.ensure_open()?;
        let mut buffer = EventBuffer::new();
        let result = self.entries_inner(&mut buffer).await;
        buffer.flush(&self.inner.dispatcher);
        result
    }

    async fn entries_inner(&self, buffer: &mut EventBuffer<K, V>) -> Result<Vec<(K, V)>, Error> {
        let mut entries = Vec::new();
        for ikey in self.inner.store.keys().await? {
            let key = self.inner.key_converter.from_internal(&ikey)?;
            if let Some(stored) = self.read_live(&ikey, &key, buffer).await? {
                let value = self.inner.value_converter.from_internal(stored.value())?;
                self.record_access(&ikey, stored).await?;
                entries.push((key, value));
            }
        }
        Ok(entries)
    }

    /// Invokes an entry processor atomically against one entry.
    ///
    /// The processor observes the entry as of the start of the invocation;
    /// its staged mutation commits only if the entry was not concurrently
    /// changed, and the processor is re-run otherwise. When read-through is
    /// enabled, a missing entry is loaded before the processor runs.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed, the store or writer fails, a conversion
    /// fails, or the processor returns an error.
    pub async fn invoke<P>(&self, key: &K, processor: &P) -> Result<P::Output, Error>
    where
        P: EntryProcessor<K, V>,
        V: PartialEq,
    {
        self.ensure_open()?;
        let mut buffer = EventBuffer::new();
        let ikey = self.inner.key_converter.to_internal(key)?;
        let result = self.invoke_inner(&ikey, key, processor, &mut buffer).await;
        buffer.flush(&self.inner.dispatcher);
        result
    }

    /// Invokes an entry processor against a batch of keys, one atomic
    /// invocation per key.
    ///
    /// Per-key failures are returned alongside the key and do not stop the
    /// remaining invocations.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed.
    #[expect(clippy::type_complexity, reason = "per-key results carry per-key errors")]
    pub async fn invoke_all<P>(
        &self,
        keys: impl IntoIterator<Item = K> + Send,
        processor: &P,
    ) -> Result<Vec<(K, Result<P::Output, Error>)>, Error>
    where
        P: EntryProcessor<K, V>,
        V: PartialEq,
    {
        self.ensure_open()?;
        let mut results = Vec::new();
        for key in keys {
            let result = self.invoke(&key, processor).await;
            results.push((key, result));
        }
        Ok(results)
    }

    async fn invoke_inner<P>(
        &self,
        ikey: &Internal<K>,
        key: &K,
        processor: &P,
        buffer: &mut EventBuffer<K, V>,
    ) -> Result<P::Output, Error>
    where
        P: EntryProcessor<K, V>,
        V: PartialEq,
    {
        loop {
            let mut original = self.read_live(ikey, key, buffer).await?;
            let was_cached = original.is_some();
            if original.is_none() && self.load_one(ikey, key).await?.is_some() {
                // The processor observes read-through loads like any reader.
                original = self.inner.store.get(ikey).await?;
            }
            let original_value = original
                .as_ref()
                .map(|sv| self.inner.value_converter.from_internal(sv.value()))
                .transpose()?;
            let mut entry = MutableEntry::new(key, original_value);
            let output = processor
                .process(&mut entry)
                .map_err(|e| Error::ensure_kind(ErrorKind::Processor, e))?;

            match entry.into_outcome() {
                Outcome::Untouched => {
                    if was_cached {
                        self.inner.stats.record_hits(1);
                    } else {
                        self.inner.stats.record_misses(1);
                    }
                    if let Some(stored) = original {
                        self.record_access(ikey, stored).await?;
                    }
                    return Ok(output);
                }
                Outcome::Store(value) => {
                    self.write_to_source(key, &value).await?;
                    let now = self.inner.clock.system_time();
                    let ivalue = self.inner.value_converter.to_internal(&value)?;
                    let updated = match original.clone() {
                        Some(old) => old.updated(ivalue, now, &self.inner.policy),
                        None => StoredValue::new(ivalue, now, &self.inner.policy),
                    };
                    let born_expired = updated.is_expired_at(now);
                    let committed = self
                        .inner
                        .store
                        .update(ikey, {
                            let expected = original;
                            move |current| {
                                if current != expected.as_ref() {
                                    return (Mutation::Keep, false);
                                }
                                if born_expired {
                                    match current {
                                        Some(_) => (Mutation::Remove(WriteKind::Synthetic), true),
                                        None => (Mutation::Keep, true),
                                    }
                                } else {
                                    (Mutation::Put(updated, WriteKind::Natural), true)
                                }
                            }
                        })
                        .await?;
                    if committed {
                        if was_cached {
                            self.inner.stats.record_hits(1);
                        } else {
                            self.inner.stats.record_misses(1);
                        }
                        if !born_expired {
                            self.inner.stats.record_puts(1);
                        }
                        return Ok(output);
                    }
                }
                Outcome::Delete => {
                    self.delete_from_source(key).await?;
                    let committed = self
                        .inner
                        .store
                        .update(ikey, {
                            let expected = original;
                            move |current| {
                                if current == expected.as_ref() {
                                    (Mutation::Remove(WriteKind::Natural), true)
                                } else {
                                    (Mutation::Keep, false)
                                }
                            }
                        })
                        .await?;
                    if committed {
                        if was_cached {
                            self.inner.stats.record_hits(1);
                        } else {
                            self.inner.stats.record_misses(1);
                        }
                        self.inner.stats.record_removals(1);
                        return Ok(output);
                    }
                }
            }
            // The entry changed under the processor; re-run it.
        }
    }

    /// Loads values for a batch of keys in the background.
    ///
    /// Runs on the cache's spawner and returns a handle resolving when the
    /// load finishes. With `replace_existing` unset, keys that already hold
    /// a live value are skipped. Loaded values enter the cache without
    /// write-through and without counting as puts.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed. Loader and store failures surface
    /// through the returned handle.
    pub fn load_all(
        &self,
        keys: Vec<K>,
        replace_existing: bool,
    ) -> Result<JoinHandle<Result<(), Error>>, Error> {
        self.ensure_open()?;
        let cache = self.clone();
        Ok(self
            .inner
            .dispatcher
            .spawner()
            .spawn(async move { cache.load_all_inner(keys, replace_existing).await }))
    }

    async fn load_all_inner(&self, keys: Vec<K>, replace_existing: bool) -> Result<(), Error> {
        let Some(loader) = &self.inner.loader else {
            return Ok(());
        };
        let mut to_load = Vec::new();
        for key in keys {
            let ikey = self.inner.key_converter.to_internal(&key)?;
            if !replace_existing {
                let now = self.inner.clock.system_time();
                if let Some(stored) = self.inner.store.get(&ikey).await? {
                    if !stored.is_expired_at(now) {
                        continue;
                    }
                }
            }
            to_load.push(key);
        }
        if to_load.is_empty() {
            return Ok(());
        }
        let loaded = loader
            .load_all(to_load)
            .await
            .map_err(|e| Error::ensure_kind(ErrorKind::Loader, e))?;
        for (key, value) in loaded {
            let ikey = self.inner.key_converter.to_internal(&key)?;
            let _ = self.insert_loaded(&ikey, &value).await?;
        }
        Ok(())
    }

    /// Registers a listener for entry lifecycle events.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed.
    pub fn register_listener(
        &self,
        config: ListenerConfig,
        listener: Arc<dyn CacheEntryListener<K, V>>,
    ) -> Result<ListenerId, Error> {
        self.ensure_open()?;
        Ok(self.register_listener_inner(config, listener))
    }

    pub(crate) fn register_listener_inner(
        &self,
        config: ListenerConfig,
        listener: Arc<dyn CacheEntryListener<K, V>>,
    ) -> ListenerId {
        let mode = if config.is_synchronous() {
            DispatchMode::Sync
        } else {
            DispatchMode::Async
        };
        let mut subscriptions = self.inner.subscriptions.lock();
        let (id, was_empty) = self.inner.dispatcher.add(mode, config, listener);
        if was_empty {
            let subscriber = Arc::new(ForwardingSubscriber {
                dispatcher: Arc::clone(&self.inner.dispatcher),
                mode,
                key_converter: self.inner.key_converter,
                value_converter: self.inner.value_converter,
            });
            *subscriptions.slot(mode) = Some(self.inner.store.subscribe(subscriber));
        }
        id
    }

    /// Deregisters a previously registered listener.
    ///
    /// Returns `true` if the identifier named a registered listener.
    ///
    /// # Errors
    ///
    /// Fails if the cache is closed.
    pub fn deregister_listener(&self, id: ListenerId) -> Result<bool, Error> {
        self.ensure_open()?;
        let mut subscriptions = self.inner.subscriptions.lock();
        let Some((mode, now_empty)) = self.inner.dispatcher.remove(id) else {
            return Ok(false);
        };
        if now_empty {
            if let Some(subscription) = subscriptions.slot(mode).take() {
                self.inner.store.unsubscribe(subscription);
            }
        }
        Ok(true)
    }

    /// Closes the cache.
    ///
    /// Subsequent operations fail with [`ErrorKind::Closed`]. Listener
    /// delivery stops; pending asynchronous deliveries are dropped. Closing
    /// an already closed cache does nothing. Entries are retained; use
    /// [`destroy`](Cache::destroy) to discard them too.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut subscriptions = self.inner.subscriptions.lock();
        if let Some(id) = subscriptions.sync.take() {
            self.inner.store.unsubscribe(id);
        }
        if let Some(id) = subscriptions.asynchronous.take() {
            self.inner.store.unsubscribe(id);
        }
        self.inner.dispatcher.close();
    }

    /// Returns `true` if the cache has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Closes the cache and discards its entries.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be cleared; the cache is closed regardless.
    pub async fn destroy(&self) -> Result<(), Error> {
        self.close();
        Ok(self.inner.store.clear().await?)
    }

    /// Returns a snapshot of the cache's statistics.
    #[must_use]
    pub fn statistics(&self) -> CacheStatistics {
        self.inner.stats.snapshot()
    }

    /// Returns `true` if statistics collection is enabled.
    #[must_use]
    pub fn statistics_enabled(&self) -> bool {
        self.inner.stats.is_enabled()
    }

    /// Enables or disables statistics collection.
    pub fn set_statistics_enabled(&self, enabled: bool) {
        self.inner.stats.set_enabled(enabled);
    }

    /// Resets all statistics counters to zero.
    pub fn clear_statistics(&self) {
        self.inner.stats.reset();
    }

    /// The cache's name, as configured or derived from its type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Returns a reference to the cache's clock.
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::new(ErrorKind::Closed));
        }
        Ok(())
    }

    /// Reads the entry for a key, treating an expired value as absent.
    ///
    /// An expired value is removed from the store synthetically and an
    /// expiry event is buffered; the caller flushes the buffer after its own
    /// store mutations.
    async fn read_live(
        &self,
        ikey: &Internal<K>,
        key: &K,
        buffer: &mut EventBuffer<K, V>,
    ) -> Result<Option<StoredValue<Internal<V>>>, Error> {
        let Some(stored) = self.inner.store.get(ikey).await? else {
            return Ok(None);
        };
        let now = self.inner.clock.system_time();
        if stored.is_expired_at(now) {
            let _ = self.inner.store.remove(ikey, WriteKind::Synthetic).await?;
            let old_value = self.inner.value_converter.from_internal(stored.value())?;
            buffer.push(CacheEntryEvent {
                kind: EventKind::Expired,
                key: key.clone(),
                old_value: Some(old_value),
                value: None,
            });
            return Ok(None);
        }
        Ok(Some(stored))
    }

    /// Records a read against a live entry, writing the refreshed expiry
    /// time back only when the policy's access rule changes it.
    async fn record_access(&self, ikey: &Internal<K>, mut stored: StoredValue<Internal<V>>) -> Result<(), Error> {
        if stored.access_refreshes_expiry(&self.inner.policy) {
            let now = self.inner.clock.system_time();
            stored.touch(now, &self.inner.policy);
            self.inner.store.put(ikey, stored, WriteKind::Synthetic).await?;
        }
        Ok(())
    }

    /// Shared body of the unconditional value-storing operations. Returns
    /// the live value that was replaced, if any, and whether the new value
    /// was actually stored.
    async fn store_value(
        &self,
        ikey: &Internal<K>,
        key: &K,
        value: &V,
        buffer: &mut EventBuffer<K, V>,
    ) -> Result<(Option<StoredValue<Internal<V>>>, bool), Error> {
        let existing = self.read_live(ikey, key, buffer).await?;
        self.write_to_source(key, value).await?;
        let now = self.inner.clock.system_time();
        let ivalue = self.inner.value_converter.to_internal(value)?;
        let stored = match existing.clone() {
            Some(old) => old.updated(ivalue, now, &self.inner.policy),
            None => StoredValue::new(ivalue, now, &self.inner.policy),
        };
        if stored.is_expired_at(now) {
            // Born expired: the put succeeds but nothing is stored, and any
            // replaced value vanishes without an event.
            if existing.is_some() {
                let _ = self.inner.store.remove(ikey, WriteKind::Synthetic).await?;
            }
            return Ok((existing, false));
        }
        self.inner.store.put(ikey, stored, WriteKind::Natural).await?;
        Ok((existing, true))
    }

    /// Removes the entry for a key. The writer's delete runs regardless of
    /// whether the key is present. Returns the removed value.
    async fn remove_inner(
        &self,
        ikey: &Internal<K>,
        key: &K,
        buffer: &mut EventBuffer<K, V>,
    ) -> Result<Option<StoredValue<Internal<V>>>, Error> {
        let existing = self.read_live(ikey, key, buffer).await?;
        self.delete_from_source(key).await?;
        if existing.is_none() {
            return Ok(None);
        }
        let removed = self.inner.store.remove(ikey, WriteKind::Natural).await?;
        self.inner.stats.record_removals(1);
        Ok(removed)
    }

    /// Consults the loader on a miss when read-through is enabled.
    async fn load_one(&self, ikey: &Internal<K>, key: &K) -> Result<Option<V>, Error> {
        if !self.inner.read_through {
            return Ok(None);
        }
        let Some(loader) = &self.inner.loader else {
            return Ok(None);
        };
        let loaded = loader
            .load(key)
            .await
            .map_err(|e| Error::ensure_kind(ErrorKind::Loader, e))?;
        let Some(value) = loaded else {
            return Ok(None);
        };
        if !self.insert_loaded(ikey, &value).await? {
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// Caches a loaded value. Returns `false` when the value was born
    /// expired and discarded.
    async fn insert_loaded(&self, ikey: &Internal<K>, value: &V) -> Result<bool, Error> {
        let now = self.inner.clock.system_time();
        let ivalue = self.inner.value_converter.to_internal(value)?;
        let stored = StoredValue::new(ivalue, now, &self.inner.policy);
        if stored.is_expired_at(now) {
            return Ok(false);
        }
        self.inner.store.put(ikey, stored, WriteKind::Natural).await?;
        Ok(true)
    }

    /// Runs the writer's write ahead of a store commit when write-through
    /// is enabled.
    async fn write_to_source(&self, key: &K, value: &V) -> Result<(), Error> {
        if !self.inner.write_through {
            return Ok(());
        }
        if let Some(writer) = &self.inner.writer {
            writer
                .write(key, value)
                .await
                .map_err(|e| Error::ensure_kind(ErrorKind::Writer, e))?;
        }
        Ok(())
    }

    /// Runs the writer's delete ahead of a store removal when write-through
    /// is enabled.
    async fn delete_from_source(&self, key: &K) -> Result<(), Error> {
        if !self.inner.write_through {
            return Ok(());
        }
        if let Some(writer) = &self.inner.writer {
            writer
                .delete(key)
                .await
                .map_err(|e| Error::ensure_kind(ErrorKind::Writer, e))?;
        }
        Ok(())
    }
}
