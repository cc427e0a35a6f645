// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Read-Through and Write-Through Example
//!
//! Demonstrates attaching a system of record to a cache: misses consult the
//! loader, and mutations run through the writer before the cache commits.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use satchel::{Cache, CacheLoader, CacheWriter, Error};
use tick::Clock;

/// A toy system of record backed by an in-process map.
#[derive(Clone, Default)]
struct Database {
    rows: Arc<Mutex<HashMap<String, String>>>,
}

impl CacheLoader<String, String> for Database {
    async fn load(&self, key: &String) -> Result<Option<String>, Error> {
        println!("database: load {key}");
        Ok(self.rows.lock().get(key).cloned())
    }

    async fn load_all(&self, keys: Vec<String>) -> Result<Vec<(String, String)>, Error> {
        let rows = self.rows.lock();
        Ok(keys
            .into_iter()
            .filter_map(|key| rows.get(&key).cloned().map(|value| (key, value)))
            .collect())
    }
}

impl CacheWriter<String, String> for Database {
    async fn write(&self, key: &String, value: &String) -> Result<(), Error> {
        println!("database: write {key} = {value}");
        let _ = self.rows.lock().insert(key.clone(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &String) -> Result<(), Error> {
        println!("database: delete {key}");
        let _ = self.rows.lock().remove(key);
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    let clock = Clock::new_tokio();
    let database = Database::default();
    let _ = database.rows.lock().insert("user:1".to_string(), "Alice".to_string());

    let cache = Cache::builder::<String, String>(clock)
        .memory()
        .loader(database.clone())
        .writer(database.clone())
        .build();

    // A miss is served by the loader and cached for the next read.
    let value = cache.get(&"user:1".to_string()).await?;
    println!("first read: {value:?}");
    let value = cache.get(&"user:1".to_string()).await?;
    println!("second read (no load): {value:?}");

    // A put reaches the database before the cache commits.
    cache.put(&"user:2".to_string(), "Bob".to_string()).await?;
    println!("database rows: {}", database.rows.lock().len());

    // A removal deletes from the database too, even for absent keys.
    let _ = cache.remove(&"user:3".to_string()).await?;

    // Warm the cache in the background.
    cache
        .load_all(vec!["user:1".to_string(), "user:2".to_string()], true)?
        .await?;

    Ok(())
}
