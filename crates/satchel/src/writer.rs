// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The external system-of-record hook for write-through.

use crate::Error;

/// Propagates cache mutations to an external system of record.
///
/// When write-through is enabled, the writer runs before the store mutation
/// is committed; a writer failure therefore leaves the cache contents
/// untouched for that entry.
///
/// Errors returned by a writer surface to callers wrapped as
/// [`ErrorKind::Writer`](crate::ErrorKind::Writer).
pub trait CacheWriter<K, V>: Send + Sync {
    /// Writes an entry to the system of record.
    fn write(&self, key: &K, value: &V) -> impl Future<Output = Result<(), Error>> + Send;

    /// Deletes an entry from the system of record.
    ///
    /// Called for removals regardless of whether the cache currently holds
    /// the key.
    fn delete(&self, key: &K) -> impl Future<Output = Result<(), Error>> + Send;
}

/// A writer that discards all mutations.
///
/// This is the default writer type parameter of a cache built without a
/// writer; it is never invoked at runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullWriter;

impl<K, V> CacheWriter<K, V> for NullWriter
where
    K: Send + Sync,
    V: Sync,
{
    async fn write(&self, _key: &K, _value: &V) -> Result<(), Error> {
        Ok(())
    }

    async fn delete(&self, _key: &K) -> Result<(), Error> {
        Ok(())
    }
}
