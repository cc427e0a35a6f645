// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::SystemTime;

use crate::{ExpiryPolicy, expiry::ExpiryDecision};

/// A stored value with its lifecycle metadata.
///
/// `StoredValue` wraps a value with the timestamps of its creation, most
/// recent read, and most recent update, along with an optional absolute
/// expiry time computed from an [`ExpiryPolicy`]. The cache uses this
/// metadata for lazy expiry detection and event payloads.
///
/// # Examples
///
/// ```
/// use satchel_store::{ExpiryPolicy, StoredValue};
/// use std::time::{Duration, SystemTime};
///
/// let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
/// let value = StoredValue::new(42, now, &ExpiryPolicy::Created(Duration::from_secs(60)));
///
/// assert!(!value.is_expired_at(now));
/// assert!(value.is_expired_at(now + Duration::from_secs(60)));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredValue<V> {
    value: V,
    created_at: SystemTime,
    accessed_at: SystemTime,
    modified_at: SystemTime,
    expires_at: Option<SystemTime>,
}

impl<V> StoredValue<V> {
    /// Creates a stored value at `now`, with an expiry time computed from the
    /// policy's creation rule.
    ///
    /// A zero-duration policy produces a value that is already expired at
    /// `now`; callers are expected to check [`is_expired_at`](Self::is_expired_at)
    /// before committing such a value.
    pub fn new(value: V, now: SystemTime, policy: &ExpiryPolicy) -> Self {
        Self {
            value,
            created_at: now,
            accessed_at: now,
            modified_at: now,
            expires_at: policy.for_creation().apply(None, now),
        }
    }

    /// Returns a reference to the stored value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the stored value and returns the inner value.
    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }

    /// Returns the time the value was first stored.
    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Returns the time the value was last read.
    #[must_use]
    pub fn accessed_at(&self) -> SystemTime {
        self.accessed_at
    }

    /// Returns the time the value was last replaced.
    #[must_use]
    pub fn modified_at(&self) -> SystemTime {
        self.modified_at
    }

    /// Returns the absolute expiry time, or `None` if the value never expires.
    #[must_use]
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    /// Returns `true` if the value is expired as of `now`.
    ///
    /// Expiry is inclusive: a value whose expiry time equals `now` is expired.
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Records a read at `now`, refreshing the expiry time if the policy's
    /// access rule calls for it.
    pub fn touch(&mut self, now: SystemTime, policy: &ExpiryPolicy) {
        self.accessed_at = now;
        self.expires_at = policy.for_access().apply(self.expires_at, now);
    }

    /// Replaces the value at `now`, refreshing the expiry time if the
    /// policy's update rule calls for it.
    ///
    /// The creation timestamp is retained; only the modification timestamp
    /// and (possibly) the expiry time change.
    #[must_use]
    pub fn updated(self, value: V, now: SystemTime, policy: &ExpiryPolicy) -> Self {
        Self {
            value,
            created_at: self.created_at,
            accessed_at: self.accessed_at,
            modified_at: now,
            expires_at: policy.for_update().apply(self.expires_at, now),
        }
    }

    /// Returns `true` if the access-rule consultation at `now` would change
    /// this value's expiry time.
    ///
    /// Used by callers to decide whether a read needs to write bookkeeping
    /// back to the store.
    #[must_use]
    pub fn access_refreshes_expiry(&self, policy: &ExpiryPolicy) -> bool {
        match policy.for_access() {
            ExpiryDecision::Unchanged => false,
            ExpiryDecision::Never => self.expires_at.is_some(),
            ExpiryDecision::After(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn new_sets_all_timestamps_to_now() {
        let value = StoredValue::new("v", at(100), &ExpiryPolicy::Eternal);
        assert_eq!(value.created_at(), at(100));
        assert_eq!(value.accessed_at(), at(100));
        assert_eq!(value.modified_at(), at(100));
        assert_eq!(value.expires_at(), None);
    }

    #[test]
    fn zero_duration_is_born_expired() {
        let value = StoredValue::new("v", at(100), &ExpiryPolicy::Created(Duration::ZERO));
        assert!(value.is_expired_at(at(100)));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let value = StoredValue::new("v", at(100), &ExpiryPolicy::Created(Duration::from_secs(10)));
        assert!(!value.is_expired_at(at(109)));
        assert!(value.is_expired_at(at(110)));
        assert!(value.is_expired_at(at(111)));
    }

    #[test]
    fn touch_refreshes_accessed_policy() {
        let policy = ExpiryPolicy::Accessed(Duration::from_secs(10));
        let mut value = StoredValue::new("v", at(100), &policy);
        value.touch(at(105), &policy);
        assert_eq!(value.accessed_at(), at(105));
        assert_eq!(value.expires_at(), Some(at(115)));
    }

    #[test]
    fn touch_leaves_created_policy_expiry_alone() {
        let policy = ExpiryPolicy::Created(Duration::from_secs(10));
        let mut value = StoredValue::new("v", at(100), &policy);
        value.touch(at(105), &policy);
        assert_eq!(value.accessed_at(), at(105));
        assert_eq!(value.expires_at(), Some(at(110)));
    }

    #[test]
    fn updated_retains_creation_time() {
        let policy = ExpiryPolicy::Modified(Duration::from_secs(10));
        let value = StoredValue::new("a", at(100), &policy);
        let value = value.updated("b", at(104), &policy);
        assert_eq!(value.value(), &"b");
        assert_eq!(value.created_at(), at(100));
        assert_eq!(value.modified_at(), at(104));
        assert_eq!(value.expires_at(), Some(at(114)));
    }

    #[test]
    fn updated_with_created_policy_keeps_original_deadline() {
        let policy = ExpiryPolicy::Created(Duration::from_secs(10));
        let value = StoredValue::new("a", at(100), &policy);
        let value = value.updated("b", at(109), &policy);
        assert!(value.is_expired_at(at(110)));
    }

    #[test]
    fn access_refresh_detection() {
        let value = StoredValue::new("v", at(100), &ExpiryPolicy::Eternal);
        assert!(!value.access_refreshes_expiry(&ExpiryPolicy::Eternal));
        assert!(!value.access_refreshes_expiry(&ExpiryPolicy::Created(Duration::from_secs(1))));
        assert!(value.access_refreshes_expiry(&ExpiryPolicy::Accessed(Duration::from_secs(1))));
        assert!(value.access_refreshes_expiry(&ExpiryPolicy::Touched(Duration::from_secs(1))));
    }
}
