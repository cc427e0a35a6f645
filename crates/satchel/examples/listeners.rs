// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Entry Listener Example
//!
//! Demonstrates registering listeners for entry lifecycle events, both
//! synchronously on the mutating task and asynchronously on a background
//! task.

use std::{sync::Arc, time::Duration};

use satchel::{Cache, CacheEntryEvent, CacheEntryListener, Error, ExpiryPolicy, ListenerConfig};
use tick::Clock;

struct Printer {
    label: &'static str,
}

impl CacheEntryListener<String, String> for Printer {
    fn on_event(&self, event: &CacheEntryEvent<String, String>) -> Result<(), Error> {
        println!(
            "[{}] {:?} key={} old={:?} new={:?}",
            self.label, event.kind, event.key, event.old_value, event.value
        );
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    let clock = Clock::new_tokio();

    let cache = Cache::builder::<String, String>(clock)
        .memory()
        .expiry(ExpiryPolicy::Created(Duration::from_millis(50)))
        .listener(
            ListenerConfig::all_events().synchronous().require_old_value(),
            Arc::new(Printer { label: "sync" }),
        )
        .build();

    // Listeners can also be added after construction.
    let id = cache.register_listener(
        ListenerConfig::new().created().removed(),
        Arc::new(Printer { label: "async" }),
    )?;

    cache.put(&"greeting".to_string(), "hello".to_string()).await?;
    cache.put(&"greeting".to_string(), "hello again".to_string()).await?;
    let _ = cache.remove(&"greeting".to_string()).await?;

    // Expiry is observed lazily: the expired event fires on the next read.
    cache.put(&"ephemeral".to_string(), "going soon".to_string()).await?;
    tokio::time::sleep(Duration::from_millis(60)).await;
    let _ = cache.get(&"ephemeral".to_string()).await?;

    let _ = cache.deregister_listener(id)?;
    cache.close();

    Ok(())
}
