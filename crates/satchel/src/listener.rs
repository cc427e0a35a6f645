// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache entry listeners and their registration configuration.

use crate::{Error, events::CacheEntryEvent};

/// Observes entry lifecycle events on a cache.
///
/// Synchronously registered listeners run on the task performing the
/// triggering operation, before that operation returns. Asynchronously
/// registered listeners run on a background task with no ordering guarantee
/// across operations.
///
/// A listener error never fails the triggering operation; it is logged and
/// dispatch continues with the remaining listeners.
pub trait CacheEntryListener<K, V>: Send + Sync {
    /// Called once per event this listener's configuration selects.
    fn on_event(&self, event: &CacheEntryEvent<K, V>) -> Result<(), Error>;
}

/// Identifies a registered listener.
///
/// Returned by [`Cache::register_listener`](crate::Cache::register_listener)
/// and used to deregister it later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn new(token: u64) -> Self {
        Self(token)
    }
}

/// Configures which events a listener receives and how they are delivered.
///
/// By default no event kinds are selected, delivery is asynchronous, and
/// events are delivered without their old value.
///
/// # Examples
///
/// ```
/// use satchel::ListenerConfig;
///
/// let config = ListenerConfig::new().created().removed().synchronous();
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct ListenerConfig {
    created: bool,
    updated: bool,
    removed: bool,
    expired: bool,
    synchronous: bool,
    old_value_required: bool,
}

impl ListenerConfig {
    /// Creates a configuration selecting no events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration selecting every event kind.
    #[must_use]
    pub fn all_events() -> Self {
        Self::new().created().updated().removed().expired()
    }

    /// Selects creation events.
    #[must_use]
    pub fn created(mut self) -> Self {
        self.created = true;
        self
    }

    /// Selects update events.
    #[must_use]
    pub fn updated(mut self) -> Self {
        self.updated = true;
        self
    }

    /// Selects removal events.
    #[must_use]
    pub fn removed(mut self) -> Self {
        self.removed = true;
        self
    }

    /// Selects expiry events.
    #[must_use]
    pub fn expired(mut self) -> Self {
        self.expired = true;
        self
    }

    /// Delivers events on the mutating task, before the operation returns.
    #[must_use]
    pub fn synchronous(mut self) -> Self {
        self.synchronous = true;
        self
    }

    /// Includes the replaced or removed value in delivered events.
    #[must_use]
    pub fn require_old_value(mut self) -> Self {
        self.old_value_required = true;
        self
    }

    /// Returns `true` if this configuration delivers synchronously.
    #[must_use]
    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    /// Returns `true` if delivered events include the old value.
    #[must_use]
    pub fn wants_old_value(&self) -> bool {
        self.old_value_required
    }

    pub(crate) fn accepts(&self, kind: crate::EventKind) -> bool {
        match kind {
            crate::EventKind::Created => self.created,
            crate::EventKind::Updated => self.updated,
            crate::EventKind::Removed => self.removed,
            crate::EventKind::Expired => self.expired,
        }
    }
}
