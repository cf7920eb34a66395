// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Resizable in-memory store backed by moka.
//!
//! This crate provides [`InMemoryStore`], a concurrent [`HistoricalStore`](histocache_tier::HistoricalStore)
//! that evicts least-recently-used entries once its maximum size is reached. Use
//! [`InMemoryStoreBuilder`] to configure capacity without exposing moka types directly.
//!
//! # Quick Start
//!
//! ```
//! use histocache_memory::InMemoryStoreBuilder;
//! use histocache_tier::{HistoricalStore, Key};
//!
//! let store = InMemoryStoreBuilder::<i32>::new().max_capacity(1000).build();
//!
//! store.put(Key::from_millis(10), 42);
//! assert_eq!(store.get(&Key::from_millis(10)), Some(42));
//! ```
//!
//! # Features
//!
//! - **Capacity limits**: Set maximum entry count with LRU eviction
//! - **Growable**: The budget can be raised at runtime without losing entries
//! - **Thread-safe**: Safe for concurrent access from multiple threads
//! - **Zero external types**: Builder API avoids exposing moka in your public API

pub mod builder;
pub mod store;

#[doc(inline)]
pub use builder::InMemoryStoreBuilder;
#[doc(inline)]
pub use store::InMemoryStore;
