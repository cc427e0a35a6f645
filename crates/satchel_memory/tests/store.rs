// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for the in-process backing store.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use parking_lot::Mutex;
use satchel_memory::MemoryStore;
use satchel_store::{
    BackingStore, Error, ExpiryPolicy, Mutation, StoreEvent, StoreEventKind, StoreSubscriber, StoredValue, WriteKind,
};

type TestResult = Result<(), Error>;

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

fn eternal(value: i32) -> StoredValue<i32> {
    StoredValue::new(value, SystemTime::UNIX_EPOCH + Duration::from_secs(100), &ExpiryPolicy::Eternal)
}

/// Records every event it sees.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(StoreEventKind, String, WriteKind)>>,
}

impl StoreSubscriber<String, i32> for Recorder {
    fn on_event(&self, event: &StoreEvent<String, i32>) {
        self.events.lock().push((event.kind, event.key.clone(), event.write));
    }
}

#[test]
fn get_put_remove_roundtrip() -> TestResult {
    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        let key = "key".to_string();

        assert!(store.get(&key).await?.is_none());

        store.put(&key, eternal(42), WriteKind::Natural).await?;
        assert_eq!(*store.get(&key).await?.expect("entry should exist").value(), 42);

        let removed = store.remove(&key, WriteKind::Natural).await?;
        assert_eq!(*removed.expect("entry should have been present").value(), 42);
        assert!(store.get(&key).await?.is_none());
        Ok(())
    })
}

#[test]
fn remove_missing_returns_none() -> TestResult {
    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        assert!(store.remove(&"missing".to_string(), WriteKind::Natural).await?.is_none());
        Ok(())
    })
}

#[test]
fn len_and_keys_track_contents() -> TestResult {
    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        assert_eq!(store.len(), Some(0));
        assert_eq!(store.is_empty(), Some(true));

        store.put(&"a".to_string(), eternal(1), WriteKind::Natural).await?;
        store.put(&"b".to_string(), eternal(2), WriteKind::Natural).await?;

        assert_eq!(store.len(), Some(2));
        let mut keys = store.keys().await?;
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        Ok(())
    })
}

#[test]
fn clear_removes_everything_silently() -> TestResult {
    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        let recorder = Arc::new(Recorder::default());
        store.put(&"a".to_string(), eternal(1), WriteKind::Natural).await?;

        let _id = store.subscribe(Arc::clone(&recorder) as Arc<dyn StoreSubscriber<String, i32>>);
        store.clear().await?;

        assert_eq!(store.len(), Some(0));
        assert!(recorder.events.lock().is_empty(), "clear must not notify subscribers");
        Ok(())
    })
}

#[test]
fn subscriber_sees_inserts_updates_and_removes() -> TestResult {
    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        let recorder = Arc::new(Recorder::default());
        let _id = store.subscribe(Arc::clone(&recorder) as Arc<dyn StoreSubscriber<String, i32>>);

        let key = "key".to_string();
        store.put(&key, eternal(1), WriteKind::Natural).await?;
        store.put(&key, eternal(2), WriteKind::Synthetic).await?;
        store.remove(&key, WriteKind::Natural).await?;

        let events = recorder.events.lock().clone();
        assert_eq!(
            events,
            vec![
                (StoreEventKind::Inserted, key.clone(), WriteKind::Natural),
                (StoreEventKind::Updated, key.clone(), WriteKind::Synthetic),
                (StoreEventKind::Removed, key, WriteKind::Natural),
            ]
        );
        Ok(())
    })
}

#[test]
fn unsubscribe_stops_notifications() -> TestResult {
    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        let recorder = Arc::new(Recorder::default());
        let id = store.subscribe(Arc::clone(&recorder) as Arc<dyn StoreSubscriber<String, i32>>);

        store.put(&"a".to_string(), eternal(1), WriteKind::Natural).await?;
        store.unsubscribe(id);
        store.put(&"b".to_string(), eternal(2), WriteKind::Natural).await?;

        assert_eq!(recorder.events.lock().len(), 1);
        Ok(())
    })
}

#[test]
fn update_put_on_missing_key_inserts() -> TestResult {
    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        let key = "key".to_string();

        let inserted = store
            .update(&key, |current| {
                assert!(current.is_none());
                (Mutation::Put(eternal(7), WriteKind::Natural), true)
            })
            .await?;

        assert!(inserted);
        assert_eq!(*store.get(&key).await?.expect("entry should exist").value(), 7);
        Ok(())
    })
}

#[test]
fn update_sees_current_value_and_can_remove() -> TestResult {
    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        let key = "key".to_string();
        store.put(&key, eternal(7), WriteKind::Natural).await?;

        let seen = store
            .update(&key, |current| {
                let seen = current.map(|v| *v.value());
                (Mutation::Remove(WriteKind::Natural), seen)
            })
            .await?;

        assert_eq!(seen, Some(7));
        assert!(store.get(&key).await?.is_none());
        Ok(())
    })
}

#[test]
fn update_keep_leaves_entry_untouched() -> TestResult {
    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        let recorder = Arc::new(Recorder::default());
        let key = "key".to_string();
        store.put(&key, eternal(7), WriteKind::Natural).await?;

        let _id = store.subscribe(Arc::clone(&recorder) as Arc<dyn StoreSubscriber<String, i32>>);
        store.update(&key, |_| (Mutation::Keep, ())).await?;

        assert!(recorder.events.lock().is_empty());
        assert_eq!(*store.get(&key).await?.expect("entry should exist").value(), 7);
        Ok(())
    })
}

#[test]
fn update_event_carries_old_and_new_values() -> TestResult {
    struct OldNewCheck;

    impl StoreSubscriber<String, i32> for OldNewCheck {
        fn on_event(&self, event: &StoreEvent<String, i32>) {
            assert_eq!(event.kind, StoreEventKind::Updated);
            assert_eq!(event.old.as_ref().map(|v| *v.value()), Some(1));
            assert_eq!(event.new.as_ref().map(|v| *v.value()), Some(2));
        }
    }

    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        let key = "key".to_string();
        store.put(&key, eternal(1), WriteKind::Natural).await?;

        let _id = store.subscribe(Arc::new(OldNewCheck));
        store
            .update(&key, |_| (Mutation::Put(eternal(2), WriteKind::Natural), ()))
            .await?;
        Ok(())
    })
}

#[test]
fn clones_share_state() -> TestResult {
    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        let clone = store.clone();

        store.put(&"key".to_string(), eternal(42), WriteKind::Natural).await?;
        assert_eq!(*clone.get(&"key".to_string()).await?.expect("entry should exist").value(), 42);
        Ok(())
    })
}

#[test]
fn store_is_send_and_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<MemoryStore<String, i32>>();
    assert_sync::<MemoryStore<String, i32>>();
}
