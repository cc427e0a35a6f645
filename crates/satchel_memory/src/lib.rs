// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! In-process backing store for the satchel cache adapter.
//!
//! This crate provides [`MemoryStore`], a concurrent hash-map-backed
//! implementation of `satchel_store::BackingStore` with synchronous change
//! notification and an atomic per-key read-modify-write primitive.

mod store;

#[doc(inline)]
pub use store::MemoryStore;
