// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Simple Cache Example
//!
//! Demonstrates basic cache operations: put, get, remove, and expiry.

use std::time::Duration;

use satchel::{Cache, ExpiryPolicy};
use tick::Clock;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), satchel::Error> {
    let clock = Clock::new_tokio();

    // Build a simple in-memory cache whose entries live for 5 seconds.
    let cache = Cache::builder::<String, String>(clock)
        .memory()
        .expiry(ExpiryPolicy::Created(Duration::from_secs(5)))
        .statistics(true)
        .build();

    // Store a value.
    let key = "user:1".to_string();
    cache.put(&key, "Alice".to_string()).await?;

    // Check if the key exists (returns true).
    let exists = cache.contains_key(&key).await?;
    println!("contains user:1: {exists}");

    // Retrieve the value.
    let value = cache.get(&key).await?;
    println!("user:1: {value:?}");

    // Remove the key.
    let removed = cache.remove(&key).await?;
    println!("removed: {removed}");

    // A read of a missing key is a miss.
    let missing = cache.get(&"user:2".to_string()).await?;
    println!("user:2: {missing:?}");

    let stats = cache.statistics();
    println!(
        "hits: {}, misses: {}, puts: {}, removals: {}",
        stats.hits(),
        stats.misses(),
        stats.puts(),
        stats.removals()
    );

    Ok(())
}
