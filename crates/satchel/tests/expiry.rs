// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(feature = "memory")]

//! Integration tests for lazy expiry behavior.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use satchel::{Cache, CacheEntryEvent, CacheEntryListener, Error, EventKind, Internal, ListenerConfig};
use satchel_store::testing::MockStore;
use tick::{Clock, ClockControl};

type TestResult = Result<(), Error>;

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

/// Records delivered events for later assertions.
#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<(EventKind, String, Option<i32>, Option<i32>)>>>,
}

impl Recorder {
    fn events(&self) -> Vec<(EventKind, String, Option<i32>, Option<i32>)> {
        self.events.lock().clone()
    }
}

impl CacheEntryListener<String, i32> for Recorder {
    fn on_event(&self, event: &CacheEntryEvent<String, i32>) -> Result<(), Error> {
        self.events
            .lock()
            .push((event.kind, event.key.clone(), event.old_value, event.value));
        Ok(())
    }
}

#[test]
fn created_policy_expires_after_the_fixed_lifetime() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let cache = Cache::builder::<String, i32>(control.to_clock())
            .memory()
            .expiry(satchel::ExpiryPolicy::Created(Duration::from_secs(60)))
            .build();

        cache.put(&"a".to_string(), 1).await?;
        control.advance(Duration::from_secs(30));
        assert_eq!(cache.get(&"a".to_string()).await?, Some(1));

        control.advance(Duration::from_secs(30));
        assert!(cache.get(&"a".to_string()).await?.is_none());
        Ok(())
    })
}

#[test]
fn expiry_is_inclusive_at_the_boundary() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let cache = Cache::builder::<String, i32>(control.to_clock())
            .memory()
            .expiry(satchel::ExpiryPolicy::Created(Duration::from_secs(60)))
            .build();

        cache.put(&"a".to_string(), 1).await?;
        control.advance(Duration::from_secs(60));
        assert!(cache.get(&"a".to_string()).await?.is_none());
        Ok(())
    })
}

#[test]
fn expired_read_counts_as_a_miss() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let cache = Cache::builder::<String, i32>(control.to_clock())
            .memory()
            .expiry(satchel::ExpiryPolicy::Created(Duration::from_secs(10)))
            .statistics(true)
            .build();

        cache.put(&"a".to_string(), 1).await?;
        control.advance(Duration::from_secs(10));
        assert!(cache.get(&"a".to_string()).await?.is_none());

        let stats = cache.statistics();
        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.misses(), 1);
        Ok(())
    })
}

#[test]
fn expired_entry_is_removed_from_the_store_on_read() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let store = MockStore::<Internal<String>, Internal<i32>>::new();
        let cache = Cache::builder::<String, i32>(control.to_clock())
            .storage(store.clone())
            .expiry(satchel::ExpiryPolicy::Created(Duration::from_secs(10)))
            .build();

        cache.put(&"a".to_string(), 1).await?;
        control.advance(Duration::from_secs(10));
        // The store still holds the value until something reads the key.
        assert_eq!(store.entry_count(), 1);

        assert!(cache.get(&"a".to_string()).await?.is_none());
        assert_eq!(store.entry_count(), 0);
        Ok(())
    })
}

#[test]
fn accessed_policy_slides_on_reads() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let cache = Cache::builder::<String, i32>(control.to_clock())
            .memory()
            .expiry(satchel::ExpiryPolicy::Accessed(Duration::from_secs(10)))
            .build();

        cache.put(&"a".to_string(), 1).await?;
        // Each read inside the window restarts it.
        for _ in 0..3 {
            control.advance(Duration::from_secs(8));
            assert_eq!(cache.get(&"a".to_string()).await?, Some(1));
        }

        control.advance(Duration::from_secs(10));
        assert!(cache.get(&"a".to_string()).await?.is_none());
        Ok(())
    })
}

#[test]
fn created_policy_does_not_slide_on_reads() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let cache = Cache::builder::<String, i32>(control.to_clock())
            .memory()
            .expiry(satchel::ExpiryPolicy::Created(Duration::from_secs(10)))
            .build();

        cache.put(&"a".to_string(), 1).await?;
        control.advance(Duration::from_secs(8));
        assert_eq!(cache.get(&"a".to_string()).await?, Some(1));

        control.advance(Duration::from_secs(2));
        assert!(cache.get(&"a".to_string()).await?.is_none());
        Ok(())
    })
}

#[test]
fn modified_policy_slides_on_updates_only() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let cache = Cache::builder::<String, i32>(control.to_clock())
            .memory()
            .expiry(satchel::ExpiryPolicy::Modified(Duration::from_secs(10)))
            .build();

        cache.put(&"a".to_string(), 1).await?;
        control.advance(Duration::from_secs(8));
        cache.put(&"a".to_string(), 2).await?;

        // The update restarted the window; a read does not.
        control.advance(Duration::from_secs(8));
        assert_eq!(cache.get(&"a".to_string()).await?, Some(2));
        control.advance(Duration::from_secs(2));
        assert!(cache.get(&"a".to_string()).await?.is_none());
        Ok(())
    })
}

#[test]
fn touched_policy_slides_on_reads_and_updates() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let cache = Cache::builder::<String, i32>(control.to_clock())
            .memory()
            .expiry(satchel::ExpiryPolicy::Touched(Duration::from_secs(10)))
            .build();

        cache.put(&"a".to_string(), 1).await?;
        control.advance(Duration::from_secs(8));
        assert_eq!(cache.get(&"a".to_string()).await?, Some(1));
        control.advance(Duration::from_secs(8));
        cache.put(&"a".to_string(), 2).await?;
        control.advance(Duration::from_secs(8));
        assert_eq!(cache.get(&"a".to_string()).await?, Some(2));

        control.advance(Duration::from_secs(10));
        assert!(cache.get(&"a".to_string()).await?.is_none());
        Ok(())
    })
}

#[test]
fn zero_lifetime_values_are_never_stored() -> TestResult {
    block_on(async {
        let clock = Clock::new_frozen();
        let recorder = Recorder::default();
        let store = MockStore::<Internal<String>, Internal<i32>>::new();
        let cache = Cache::builder::<String, i32>(clock)
            .storage(store.clone())
            .expiry(satchel::ExpiryPolicy::Created(Duration::ZERO))
            .listener(
                ListenerConfig::all_events().synchronous(),
                Arc::new(recorder.clone()),
            )
            .build();

        // The put succeeds but nothing lands in the store and no creation
        // event fires.
        cache.put(&"a".to_string(), 1).await?;
        assert!(cache.get(&"a".to_string()).await?.is_none());
        assert_eq!(store.entry_count(), 0);
        assert!(!cache.put_if_absent(&"b".to_string(), 2).await?);
        assert!(recorder.events().is_empty());
        Ok(())
    })
}

#[test]
fn zero_lifetime_puts_do_not_count_as_puts() -> TestResult {
    block_on(async {
        let clock = Clock::new_frozen();
        let cache = Cache::builder::<String, i32>(clock)
            .memory()
            .expiry(satchel::ExpiryPolicy::Created(Duration::ZERO))
            .statistics(true)
            .build();

        // Nothing durable is stored, so nothing counts as a put.
        cache.put(&"a".to_string(), 1).await?;
        assert!(cache.get_and_put(&"a".to_string(), 2).await?.is_none());
        assert_eq!(cache.statistics().puts(), 0);
        assert!(cache.get(&"a".to_string()).await?.is_none());
        Ok(())
    })
}

#[test]
fn expiry_raises_an_expired_event_with_the_old_value() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let recorder = Recorder::default();
        let cache = Cache::builder::<String, i32>(control.to_clock())
            .memory()
            .expiry(satchel::ExpiryPolicy::Created(Duration::from_secs(10)))
            .listener(
                ListenerConfig::new().expired().synchronous().require_old_value(),
                Arc::new(recorder.clone()),
            )
            .build();

        cache.put(&"a".to_string(), 1).await?;
        control.advance(Duration::from_secs(10));
        assert!(cache.get(&"a".to_string()).await?.is_none());

        assert_eq!(
            recorder.events(),
            vec![(EventKind::Expired, "a".to_string(), Some(1), None)]
        );
        Ok(())
    })
}

#[test]
fn writing_over_an_expired_entry_raises_expired_then_created() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let recorder = Recorder::default();
        let cache = Cache::builder::<String, i32>(control.to_clock())
            .memory()
            .expiry(satchel::ExpiryPolicy::Created(Duration::from_secs(10)))
            .listener(
                ListenerConfig::all_events().synchronous().require_old_value(),
                Arc::new(recorder.clone()),
            )
            .build();

        cache.put(&"a".to_string(), 1).await?;
        control.advance(Duration::from_secs(10));
        // The expired entry is gone, so this is a creation, and the expiry
        // event is delivered after the commit.
        cache.put(&"a".to_string(), 2).await?;

        assert_eq!(
            recorder.events(),
            vec![
                (EventKind::Created, "a".to_string(), None, Some(1)),
                (EventKind::Created, "a".to_string(), None, Some(2)),
                (EventKind::Expired, "a".to_string(), Some(1), None),
            ]
        );
        Ok(())
    })
}

#[test]
fn replace_treats_an_expired_entry_as_absent() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let cache = Cache::builder::<String, i32>(control.to_clock())
            .memory()
            .expiry(satchel::ExpiryPolicy::Created(Duration::from_secs(10)))
            .build();

        cache.put(&"a".to_string(), 1).await?;
        control.advance(Duration::from_secs(10));
        assert!(!cache.replace(&"a".to_string(), 2).await?);
        assert!(cache.get(&"a".to_string()).await?.is_none());
        Ok(())
    })
}

#[test]
fn entries_skips_expired_values() -> TestResult {
    block_on(async {
        let control = ClockControl::new();
        let cache = Cache::builder::<String, i32>(control.to_clock())
            .memory()
            .expiry(satchel::ExpiryPolicy::Created(Duration::from_secs(10)))
            .build();

        cache.put(&"old".to_string(), 1).await?;
        control.advance(Duration::from_secs(10));
        cache.put(&"new".to_string(), 2).await?;

        let entries = cache.entries().await?;
        assert_eq!(entries, vec![("new".to_string(), 2)]);
        Ok(())
    })
}
