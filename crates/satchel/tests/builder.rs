// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(feature = "memory")]

//! Integration tests for cache construction.

use satchel::{Cache, Error, Internal};
use satchel_store::testing::MockStore;
use serde::{Deserialize, Serialize};
use tick::Clock;

type TestResult = Result<(), Error>;

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Payload {
    id: u32,
    name: String,
}

#[test]
fn default_name_is_derived_from_the_type() {
    let clock = Clock::new_frozen();
    let cache = Cache::builder::<String, i32>(clock).memory().build();
    assert!(!cache.name().is_empty());
}

#[test]
fn custom_name_is_used_verbatim() {
    let clock = Clock::new_frozen();
    let cache = Cache::builder::<String, i32>(clock).memory().name("sessions").build();
    assert_eq!(cache.name(), "sessions");
}

#[test]
fn clock_returns_reference() {
    let clock = Clock::new_frozen();
    let cache = Cache::builder::<String, i32>(clock).memory().build();
    let _ = cache.clock().instant();
}

#[test]
fn statistics_flag_is_honored() {
    let clock = Clock::new_frozen();
    let cache = Cache::builder::<String, i32>(clock).memory().statistics(true).build();
    assert!(cache.statistics_enabled());
}

#[test]
fn custom_storage_is_used() -> TestResult {
    block_on(async {
        let clock = Clock::new_frozen();
        let store = MockStore::<Internal<String>, Internal<i32>>::new();
        let cache = Cache::builder::<String, i32>(clock).storage(store.clone()).build();

        cache.put(&"a".to_string(), 1).await?;
        assert!(store.contains_key(&Internal::Reference("a".to_string())));
        Ok(())
    })
}

#[test]
fn store_by_reference_needs_no_serialization() -> TestResult {
    // Deliberately not Serialize: by-reference storage only clones.
    #[derive(Clone, Debug, PartialEq)]
    struct Opaque(u32);

    block_on(async {
        let clock = Clock::new_frozen();
        let cache = Cache::builder::<String, Opaque>(clock).memory().build();

        cache.put(&"a".to_string(), Opaque(7)).await?;
        assert_eq!(cache.get(&"a".to_string()).await?, Some(Opaque(7)));
        Ok(())
    })
}

#[test]
fn store_by_value_roundtrips_structured_values() -> TestResult {
    block_on(async {
        let clock = Clock::new_frozen();
        let cache = Cache::builder::<String, Payload>(clock).memory().store_by_value().build();

        let payload = Payload {
            id: 7,
            name: "seven".to_string(),
        };
        cache.put(&"a".to_string(), payload.clone()).await?;
        assert_eq!(cache.get(&"a".to_string()).await?, Some(payload));
        Ok(())
    })
}

#[test]
fn store_by_value_keys_are_serialized_in_the_store() -> TestResult {
    block_on(async {
        let clock = Clock::new_frozen();
        let store = MockStore::<Internal<String>, Internal<i32>>::new();
        let cache = Cache::builder::<String, i32>(clock)
            .storage(store.clone())
            .store_by_value()
            .build();

        cache.put(&"a".to_string(), 1).await?;
        assert_eq!(store.entry_count(), 1);
        assert!(!store.contains_key(&Internal::Reference("a".to_string())));
        Ok(())
    })
}
