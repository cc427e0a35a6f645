// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Expiry policies that drive the lifetime of stored values.
//!
//! A policy is consulted at three points in an entry's life: when it is
//! created, when it is read, and when its value is replaced. Each consultation
//! yields an [`ExpiryDecision`] that the store applies to the entry's
//! absolute expiry time.

use std::time::{Duration, SystemTime};

/// Determines when stored values expire.
///
/// The variants mirror the standard cache expiry strategies: a fixed lifetime
/// from creation, lifetimes refreshed on access and/or modification, or no
/// expiry at all.
///
/// A zero duration means values are expired the moment they are written; such
/// values are never observable through the cache.
///
/// # Examples
///
/// ```
/// use satchel_store::{ExpiryDecision, ExpiryPolicy};
/// use std::time::Duration;
///
/// let policy = ExpiryPolicy::Created(Duration::from_secs(60));
/// assert_eq!(policy.for_creation(), ExpiryDecision::After(Duration::from_secs(60)));
/// assert_eq!(policy.for_access(), ExpiryDecision::Unchanged);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Values never expire.
    Eternal,
    /// Values expire a fixed duration after creation.
    Created(Duration),
    /// Values expire a fixed duration after creation or the most recent read.
    Accessed(Duration),
    /// Values expire a fixed duration after creation or the most recent update.
    Modified(Duration),
    /// Values expire a fixed duration after the most recent creation, read, or update.
    Touched(Duration),
}

/// The outcome of consulting an [`ExpiryPolicy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpiryDecision {
    /// Leave the current expiry time as it is.
    Unchanged,
    /// The value should never expire.
    Never,
    /// The value should expire this long after the triggering operation.
    After(Duration),
}

impl ExpiryPolicy {
    /// Returns the decision to apply when a value is first stored.
    #[must_use]
    pub fn for_creation(&self) -> ExpiryDecision {
        match self {
            Self::Eternal => ExpiryDecision::Never,
            Self::Created(d) | Self::Accessed(d) | Self::Modified(d) | Self::Touched(d) => ExpiryDecision::After(*d),
        }
    }

    /// Returns the decision to apply when a value is read.
    #[must_use]
    pub fn for_access(&self) -> ExpiryDecision {
        match self {
            Self::Eternal | Self::Created(_) | Self::Modified(_) => ExpiryDecision::Unchanged,
            Self::Accessed(d) | Self::Touched(d) => ExpiryDecision::After(*d),
        }
    }

    /// Returns the decision to apply when a value is replaced.
    #[must_use]
    pub fn for_update(&self) -> ExpiryDecision {
        match self {
            Self::Eternal | Self::Created(_) | Self::Accessed(_) => ExpiryDecision::Unchanged,
            Self::Modified(d) | Self::Touched(d) => ExpiryDecision::After(*d),
        }
    }
}

impl ExpiryDecision {
    /// Applies this decision to an existing expiry time, relative to `now`.
    #[must_use]
    pub fn apply(self, current: Option<SystemTime>, now: SystemTime) -> Option<SystemTime> {
        match self {
            Self::Unchanged => current,
            Self::Never => None,
            Self::After(d) => Some(now + d),
        }
    }
}
