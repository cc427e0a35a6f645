// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Core backing store abstractions for the satchel cache adapter.
//!
//! This crate defines the [`BackingStore`] trait that storage engines
//! implement, along with [`StoredValue`] for values enveloped with lifecycle
//! metadata, [`ExpiryPolicy`] for driving value lifetimes, and the store
//! event types used for synchronous change notification.
//!
//! # Overview
//!
//! The backing store abstraction separates storage concerns from cache
//! semantics. Implement [`BackingStore`] for your storage engine, then use
//! `satchel` to add expiry handling, read/write-through, listeners, and
//! statistics on top.
//!
//! # Implementing a Backing Store
//!
//! A store is a keyed map of [`StoredValue`]s. Beyond plain gets and puts it
//! must provide an atomic per-key read-modify-write ([`BackingStore::update`])
//! and synchronous change notification ([`BackingStore::subscribe`]). The
//! in-process implementation in `satchel_memory` is the reference for both.

pub mod error;
mod event;
mod expiry;
mod store;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
mod value;

#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use event::{StoreEvent, StoreEventKind, StoreSubscriber, SubscriptionId, WriteKind};
#[doc(inline)]
pub use expiry::{ExpiryDecision, ExpiryPolicy};
#[doc(inline)]
pub use store::{BackingStore, Mutation};
#[doc(inline)]
pub use value::StoredValue;
