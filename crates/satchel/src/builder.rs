// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cache builder.
//!
//! Configuration is fixed at construction: storage, expiry policy, copy
//! semantics, the loader and writer hooks, statistics, and any initially
//! registered listeners.

use std::{hash::Hash, marker::PhantomData, sync::Arc};

use anyspawn::Spawner;
use satchel_store::{BackingStore, ExpiryPolicy};
use serde::{Serialize, de::DeserializeOwned};
use tick::Clock;

use crate::{
    Cache,
    cache::CacheConfig,
    convert::{ConverterPair, Internal},
    listener::{CacheEntryListener, ListenerConfig},
    loader::{CacheLoader, NullLoader},
    writer::{CacheWriter, NullWriter},
};

#[cfg(feature = "memory")]
use satchel_memory::MemoryStore;

/// Builder for constructing a [`Cache`].
///
/// Created by calling [`Cache::builder`]. Storage must be configured before
/// [`build`](CacheBuilder::build) becomes available.
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
pub struct CacheBuilder<K, V, S = (), L = NullLoader, W = NullWriter> {
    name: Option<&'static str>,
    storage: S,
    clock: Clock,
    policy: ExpiryPolicy,
    key_converter: Option<ConverterPair<K>>,
    value_converter: Option<ConverterPair<V>>,
    loader: Option<L>,
    writer: Option<W>,
    read_through: bool,
    write_through: bool,
    statistics: bool,
    spawner: Option<Spawner>,
    listeners: Vec<(ListenerConfig, Arc<dyn CacheEntryListener<K, V>>)>,
    _phantom: PhantomData<(K, V)>,
}

impl<K, V, S, L, W> std::fmt::Debug for CacheBuilder<K, V, S, L, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("read_through", &self.read_through)
            .field("write_through", &self.write_through)
            .field("statistics", &self.statistics)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> CacheBuilder<K, V, (), NullLoader, NullWriter> {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            name: None,
            storage: (),
            clock,
            policy: ExpiryPolicy::Eternal,
            key_converter: None,
            value_converter: None,
            loader: None,
            writer: None,
            read_through: false,
            write_through: false,
            statistics: false,
            spawner: None,
            listeners: Vec::new(),
            _phantom: PhantomData,
        }
    }
}

impl<K, V, L, W> CacheBuilder<K, V, (), L, W> {
    /// Sets a custom backing store for the cache.
    ///
    /// Use this to provide your own [`BackingStore`] implementation instead
    /// of the built-in [`memory`](CacheBuilder::memory) option.
    pub fn storage<S>(self, storage: S) -> CacheBuilder<K, V, S, L, W>
    where
        S: BackingStore<Internal<K>, Internal<V>>,
    {
        CacheBuilder {
            name: self.name,
            storage,
            clock: self.clock,
            policy: self.policy,
            key_converter: self.key_converter,
            value_converter: self.value_converter,
            loader: self.loader,
            writer: self.writer,
            read_through: self.read_through,
            write_through: self.write_through,
            statistics: self.statistics,
            spawner: self.spawner,
            listeners: self.listeners,
            _phantom: PhantomData,
        }
    }

    /// Configures the cache to use in-memory storage.
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
    #[cfg(feature = "memory")]
    #[must_use]
    pub fn memory(self) -> CacheBuilder<K, V, MemoryStore<Internal<K>, Internal<V>>, L, W>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.storage(MemoryStore::new())
    }
}

impl<K, V, S, L, W> CacheBuilder<K, V, S, L, W> {
    /// Sets the cache name, used in diagnostics.
    ///
    /// Defaults to a name derived from the cache's type.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Sets the expiry policy for entries.
    ///
    /// Defaults to [`ExpiryPolicy::Eternal`].
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use satchel::{Cache, ExpiryPolicy};
    /// use tick::Clock;
    ///
    /// let clock = Clock::new_frozen();
    /// let cache = Cache::builder::<String, i32>(clock)
    ///     .memory()
    ///     .expiry(ExpiryPolicy::Created(Duration::from_secs(300)))
    ///     .build();
    /// ```
    #[must_use]
    pub fn expiry(mut self, policy: ExpiryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stores serialized copies of keys and values instead of clones.
    ///
    /// With store-by-value, later mutation of a caller's object cannot be
    /// observed through the cache.
    #[must_use]
    pub fn store_by_value(mut self) -> Self
    where
        K: Serialize + DeserializeOwned,
        V: Serialize + DeserializeOwned,
    {
        self.key_converter = Some(ConverterPair::by_value());
        self.value_converter = Some(ConverterPair::by_value());
        self
    }

    /// Stores clones of keys and values.
    ///
    /// This is the default.
    #[must_use]
    pub fn store_by_reference(mut self) -> Self
    where
        K: Clone,
        V: Clone,
    {
        self.key_converter = Some(ConverterPair::by_reference());
        self.value_converter = Some(ConverterPair::by_reference());
        self
    }

    /// Sets the loader consulted on cache misses and enables read-through.
    ///
    /// Use [`read_through`](CacheBuilder::read_through) afterwards to keep
    /// the loader for bulk loading only.
    pub fn loader<L2>(self, loader: L2) -> CacheBuilder<K, V, S, L2, W>
    where
        L2: CacheLoader<K, V>,
    {
        CacheBuilder {
            name: self.name,
            storage: self.storage,
            clock: self.clock,
            policy: self.policy,
            key_converter: self.key_converter,
            value_converter: self.value_converter,
            loader: Some(loader),
            writer: self.writer,
            read_through: true,
            write_through: self.write_through,
            statistics: self.statistics,
            spawner: self.spawner,
            listeners: self.listeners,
            _phantom: PhantomData,
        }
    }

    /// Sets the writer for mutations and enables write-through.
    ///
    /// Use [`write_through`](CacheBuilder::write_through) afterwards to keep
    /// the writer configured but inactive.
    pub fn writer<W2>(self, writer: W2) -> CacheBuilder<K, V, S, L, W2>
    where
        W2: CacheWriter<K, V>,
    {
        CacheBuilder {
            name: self.name,
            storage: self.storage,
            clock: self.clock,
            policy: self.policy,
            key_converter: self.key_converter,
            value_converter: self.value_converter,
            loader: self.loader,
            writer: Some(writer),
            read_through: self.read_through,
            write_through: true,
            statistics: self.statistics,
            spawner: self.spawner,
            listeners: self.listeners,
            _phantom: PhantomData,
        }
    }

    /// Enables or disables read-through for cache misses.
    #[must_use]
    pub fn read_through(mut self, enabled: bool) -> Self {
        self.read_through = enabled;
        self
    }

    /// Enables or disables write-through for mutations.
    #[must_use]
    pub fn write_through(mut self, enabled: bool) -> Self {
        self.write_through = enabled;
        self
    }

    /// Enables or disables statistics collection.
    ///
    /// Disabled by default; can be toggled later with
    /// [`Cache::set_statistics_enabled`].
    #[must_use]
    pub fn statistics(mut self, enabled: bool) -> Self {
        self.statistics = enabled;
        self
    }

    /// Sets the spawner used for asynchronous listener delivery and bulk
    /// loading.
    ///
    /// Defaults to a Tokio spawner created on first use.
    #[must_use]
    pub fn spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Registers a listener as part of construction.
    ///
    /// More listeners can be added after construction with
    /// [`Cache::register_listener`].
    #[must_use]
    pub fn listener(mut self, config: ListenerConfig, listener: Arc<dyn CacheEntryListener<K, V>>) -> Self {
        self.listeners.push((config, listener));
        self
    }

    /// Returns a reference to the builder's clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }
}

impl<K, V, S, L, W> CacheBuilder<K, V, S, L, W>
where
    K: Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BackingStore<Internal<K>, Internal<V>> + 'static,
    L: CacheLoader<K, V> + 'static,
    W: CacheWriter<K, V> + 'static,
{
    /// Builds the cache with the configured storage and settings.
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
    pub fn build(self) -> Cache<K, V, S, L, W> {
        let cache = Cache::new(CacheConfig {
            name: short_type_name::<Cache<K, V, S, L, W>>(self.name),
            store: self.storage,
            clock: self.clock,
            policy: self.policy,
            key_converter: self.key_converter.unwrap_or_else(ConverterPair::by_reference),
            value_converter: self.value_converter.unwrap_or_else(ConverterPair::by_reference),
            loader: self.loader,
            writer: self.writer,
            read_through: self.read_through,
            write_through: self.write_through,
            statistics: self.statistics,
            spawner: self.spawner,
        });
        for (config, listener) in self.listeners {
            let _ = cache.register_listener_inner(config, listener);
        }
        cache
    }
}

fn short_type_name<S>(user_name: Option<&'static str>) -> &'static str {
    if let Some(name) = user_name {
        name
    } else {
        let full = std::any::type_name::<S>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_type_name_with_user_name() {
        let name = short_type_name::<String>(Some("custom_name"));
        assert_eq!(name, "custom_name");
    }

    #[test]
    fn short_type_name_without_user_name() {
        let name = short_type_name::<String>(None);
        assert_eq!(name, "String");
    }
}
