// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The external data source hook for read-through and bulk loading.

use crate::Error;

/// Loads values from an external system of record.
///
/// A loader is consulted on cache misses when read-through is enabled, and
/// by bulk loading. Loaded values enter the cache without write-through and
/// without counting as puts in the statistics.
///
/// Errors returned by a loader surface to callers wrapped as
/// [`ErrorKind::Loader`](crate::ErrorKind::Loader).
pub trait CacheLoader<K, V>: Send + Sync {
    /// Loads the value for a single key, or `None` if the source has no
    /// entry for it.
    fn load(&self, key: &K) -> impl Future<Output = Result<Option<V>, Error>> + Send;

    /// Loads values for a batch of keys.
    ///
    /// Keys the source has no entry for are simply absent from the result.
    fn load_all(&self, keys: Vec<K>) -> impl Future<Output = Result<Vec<(K, V)>, Error>> + Send;
}

/// A loader that never produces values.
///
/// This is the default loader type parameter of a cache built without a
/// loader; it is never invoked at runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLoader;

impl<K, V> CacheLoader<K, V> for NullLoader
where
    K: Send + Sync,
    V: Send,
{
    async fn load(&self, _key: &K) -> Result<Option<V>, Error> {
        Ok(None)
    }

    async fn load_all(&self, _keys: Vec<K>) -> Result<Vec<(K, V)>, Error> {
        Ok(Vec::new())
    }
}
