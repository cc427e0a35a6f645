// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Caching with expiry policies, read/write-through, and entry listeners.
//!
//! This crate provides a cache over a pluggable backing store with:
//! - Lazy expiry under created, accessed, modified, and touched policies
//! - Read-through loading and write-through persistence hooks
//! - Store-by-reference or store-by-value copy semantics
//! - Synchronous and asynchronous entry lifecycle listeners
//! - Atomic per-entry processors and operation statistics
//!
//! # Examples
//!
//! ## Basic In-Memory Cache
//!
//! ```
//! use satchel::Cache;
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! let clock = Clock::new_frozen();
//! let cache = Cache::builder::<String, i32>(clock)
//!     .memory()
//!     .build();
//!
//! cache.put(&"key".to_string(), 42).await?;
//! assert_eq!(cache.get(&"key".to_string()).await?, Some(42));
//! # Ok::<(), satchel::Error>(())
//! # }).unwrap();
//! ```
//!
//! ## Expiry and Statistics
//!
//! ```
//! use std::time::Duration;
//!
//! use satchel::{Cache, ExpiryPolicy};
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! let clock = Clock::new_frozen();
//! let cache = Cache::builder::<String, i32>(clock)
//!     .memory()
//!     .expiry(ExpiryPolicy::Created(Duration::from_secs(60)))
//!     .statistics(true)
//!     .build();
//!
//! cache.put(&"key".to_string(), 42).await?;
//! let _ = cache.get(&"key".to_string()).await?;
//! assert_eq!(cache.statistics().hits(), 1);
//! # Ok::<(), satchel::Error>(())
//! # }).unwrap();
//! ```

pub mod builder;
pub mod cache;
mod convert;
mod error;
mod events;
mod listener;
mod loader;
mod processor;
mod stats;
mod writer;

#[doc(inline)]
pub use builder::CacheBuilder;
#[doc(inline)]
pub use cache::Cache;
#[doc(inline)]
pub use convert::{ConverterPair, Internal};
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
#[doc(inline)]
pub use events::{CacheEntryEvent, EventKind};
#[doc(inline)]
pub use listener::{CacheEntryListener, ListenerConfig, ListenerId};
#[doc(inline)]
pub use loader::{CacheLoader, NullLoader};
#[doc(inline)]
pub use processor::{EntryProcessor, MutableEntry};
#[doc(inline)]
pub use satchel_store::{
    BackingStore, ExpiryDecision, ExpiryPolicy, Mutation, StoreEvent, StoreEventKind, StoreSubscriber, StoredValue,
    SubscriptionId, WriteKind,
};
#[doc(inline)]
pub use stats::CacheStatistics;
#[doc(inline)]
pub use writer::{CacheWriter, NullWriter};

#[cfg(feature = "memory")]
#[doc(inline)]
pub use satchel_memory::MemoryStore;

#[cfg(any(feature = "test-util", test))]
#[doc(inline)]
pub use satchel_store::testing::{MockStore, StoreOp};
