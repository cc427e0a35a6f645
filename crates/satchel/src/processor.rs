// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Entry processors, for atomic read-modify-write of a single entry.

use crate::Error;

/// A computation applied atomically to one cache entry.
///
/// The processor observes the entry as of the start of the invocation and
/// describes a mutation through [`MutableEntry`]; the cache commits the
/// mutation only if no concurrent writer changed the entry in the meantime,
/// retrying the processor otherwise.
///
/// Errors returned by a processor surface to callers wrapped as
/// [`ErrorKind::Processor`](crate::ErrorKind::Processor).
pub trait EntryProcessor<K, V>: Send + Sync {
    /// The result produced by a successful invocation.
    type Output;

    /// Processes one entry.
    fn process(&self, entry: &mut MutableEntry<'_, K, V>) -> Result<Self::Output, Error>;
}

impl<K, V, T, F> EntryProcessor<K, V> for F
where
    F: Fn(&mut MutableEntry<'_, K, V>) -> Result<T, Error> + Send + Sync,
{
    type Output = T;

    fn process(&self, entry: &mut MutableEntry<'_, K, V>) -> Result<T, Error> {
        self(entry)
    }
}

/// The view of an entry handed to an [`EntryProcessor`].
///
/// Reads observe the entry as it was when the invocation started; [`set`]
/// and [`remove`] stage a mutation which the cache commits after the
/// processor returns.
///
/// [`set`]: MutableEntry::set
/// [`remove`]: MutableEntry::remove
#[derive(Debug)]
pub struct MutableEntry<'a, K, V> {
    key: &'a K,
    value: Option<V>,
    existed: bool,
    mutated: bool,
}

impl<'a, K, V> MutableEntry<'a, K, V> {
    pub(crate) fn new(key: &'a K, value: Option<V>) -> Self {
        let existed = value.is_some();
        Self {
            key,
            value,
            existed,
            mutated: false,
        }
    }

    /// The key the processor was invoked for.
    #[must_use]
    pub fn key(&self) -> &K {
        self.key
    }

    /// Returns `true` if the entry currently has a value.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    /// The entry's current value, reflecting any staged mutation.
    #[must_use]
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Stages a new value for the entry.
    pub fn set(&mut self, value: V) {
        self.value = Some(value);
        self.mutated = true;
    }

    /// Stages removal of the entry.
    pub fn remove(&mut self) {
        self.value = None;
        self.mutated = true;
    }

    pub(crate) fn into_outcome(self) -> Outcome<V> {
        if !self.mutated {
            return Outcome::Untouched;
        }
        match (self.value, self.existed) {
            (Some(value), _) => Outcome::Store(value),
            (None, true) => Outcome::Delete,
            (None, false) => Outcome::Untouched,
        }
    }
}

/// What an invocation asks the cache to do with the entry.
#[derive(Debug)]
pub(crate) enum Outcome<V> {
    /// The processor did not mutate the entry (or removed a value it also
    /// created, which cancels out).
    Untouched,
    /// Store this value, creating or replacing the entry.
    Store(V),
    /// Remove the entry.
    Delete,
}
