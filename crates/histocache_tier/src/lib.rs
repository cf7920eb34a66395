// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Collaborator abstractions for gap-tolerant historical caches.
//!
//! A historical cache sits between a host application and an expensive,
//! timestamp-ordered data source. This crate defines the pieces the cache
//! talks to but does not own:
//!
//! - [`Key`]: a millisecond timestamp, the ordering of all values
//! - [`HistoricalStore`]: the in-memory key/value store with its own eviction policy
//! - [`HistoricalReader`]: the backend that performs ascending range scans and
//!   nearest-value lookups
//! - [`Error`]: the error type shared by all historical cache crates
//!
//! # Implementing a Reader
//!
//! ```
//! use histocache_tier::{HistoricalReader, Key, Result};
//!
//! struct Ticks(Vec<(Key, f64)>);
//!
//! impl HistoricalReader<(Key, f64)> for Ticks {
//!     fn extract_key(&self, _hint: Key, value: &(Key, f64)) -> Key {
//!         value.0
//!     }
//!
//!     fn read_all_values_ascending_from(&self, key: Key) -> Result<Vec<(Key, f64)>> {
//!         Ok(self.0.iter().filter(|(k, _)| *k >= key).copied().collect())
//!     }
//!
//!     fn read_latest_value_for(&self, key: Key) -> Result<Option<(Key, f64)>> {
//!         let before = self.0.iter().rev().find(|(k, _)| *k <= key);
//!         Ok(before.or_else(|| self.0.first()).copied())
//!     }
//! }
//!
//! let ticks = Ticks(vec![(Key::from_millis(10), 1.0), (Key::from_millis(20), 2.0)]);
//! let latest = ticks.read_latest_value_for(Key::from_millis(15))?;
//! assert_eq!(latest, Some((Key::from_millis(10), 1.0)));
//! # Ok::<(), histocache_tier::Error>(())
//! ```

pub mod error;
mod key;
mod reader;
mod store;
#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
#[doc(inline)]
pub use key::Key;
#[doc(inline)]
pub use reader::HistoricalReader;
#[doc(inline)]
pub use store::HistoricalStore;
