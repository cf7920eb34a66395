// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Gap-tolerant caching for timestamp-ordered historical data.
//!
//! Historical data sources (tick databases, event logs, sensor archives) are
//! expensive to query and are usually read as "the value in effect at time
//! `t`". A [`GapCache`] answers such lookups with the newest value at or
//! before the requested key, loading whole ascending ranges from the backend
//! and tolerating arbitrary gaps between keys. It also survives its store
//! evicting entries behind its back: missing values are reloaded and the size
//! budget grows when evictions keep repeating.
//!
//! # Quick Start
//!
//! ```
//! use histocache::{GapCache, Key};
//! use histocache_tier::testing::MockReader;
//!
//! let reader = MockReader::new(|v: &(Key, &str)| v.0).with_values([
//!     (Key::from_millis(10), "open"),
//!     (Key::from_millis(20), "halt"),
//!     (Key::from_millis(30), "close"),
//! ]);
//! let cache = GapCache::builder(reader).memory().build();
//!
//! assert_eq!(cache.get(Key::from_millis(25))?, Some((Key::from_millis(20), "halt")));
//! assert_eq!(cache.get(Key::from_millis(5))?, Some((Key::from_millis(10), "open")));
//! # Ok::<(), histocache::Error>(())
//! ```
//!
//! # Frontier Clipping
//!
//! A [`KeyBoundAdjuster`] clips every query to a lazily discovered highest
//! allowed key, so a simulation never sees data from its own future. Queries
//! go through [`GapCache::query`]; [`Query::with_future`] opts out of the
//! clipping and adds forward scans.
//!
//! # Features
//!
//! - `memory` (default): in-memory store via [`GapCacheBuilder::memory`]
//! - `logs` (default): structured `tracing` events for loads, evictions and frontier moves
//! - `test-util`: mock reader and store with call recording and failure injection

mod adjust;
mod buffer;
mod builder;
mod estimator;
mod gap;
mod query;
mod telemetry;

#[doc(inline)]
pub use adjust::{AdjustContext, AdjustedKey, FrontierProbe, KeyBoundAdjuster, QueryKey, RegisteredCache};
#[doc(inline)]
pub use buffer::BufferedSequence;
#[doc(inline)]
pub use builder::GapCacheBuilder;
#[doc(inline)]
pub use estimator::{DEFAULT_EVICTION_THRESHOLD, DEFAULT_MIN_READ_BACK_STEP, DEFAULT_READ_BACK_STEP, ReadBackEstimator};
#[doc(inline)]
pub use gap::{DEFAULT_LAST_VALUES_CAPACITY, GapBounds, GapCache};
#[doc(inline)]
pub use histocache_tier::{Error, ErrorKind, HistoricalReader, HistoricalStore, Key, Result};
#[cfg(feature = "memory")]
#[doc(inline)]
pub use histocache_memory::{InMemoryStore, InMemoryStoreBuilder};
#[doc(inline)]
pub use query::{ElementFilter, FutureQuery, NextEntries, NextKeys, NextValues, Query, QueryInterceptor};

/// Mock reader and store for testing code built on historical caches.
#[cfg(any(feature = "test-util", test))]
pub mod testing {
    #[doc(inline)]
    pub use histocache_tier::testing::*;
}
