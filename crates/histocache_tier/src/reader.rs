// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The backend a historical cache loads from.

use crate::{Key, Result};

/// Read access to the expensive, timestamp-ordered data source.
///
/// Implementations perform the actual I/O. The cache calls them while holding
/// its own lock, so they must not call back into the same cache.
///
/// All three operations must agree on ordering: the key of every value is
/// whatever [`extract_key`](HistoricalReader::extract_key) returns for it.
pub trait HistoricalReader<V>: Send + Sync {
    /// Extracts the key of `value`.
    ///
    /// The result must depend on `value` alone. `hint` is the key the caller
    /// was looking for and may only be used to disambiguate, never to alter
    /// the result.
    fn extract_key(&self, hint: Key, value: &V) -> Key;

    /// Reads every value with a key at or after `key`, ascending by key.
    ///
    /// The result may be empty and may be truncated to a batch; the cache
    /// continues from the last returned key when it needs more. It must not
    /// contain values beyond the highest allowed key of the data set.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable.
    fn read_all_values_ascending_from(&self, key: Key) -> Result<Vec<V>>;

    /// Reads the newest value at or before `key`, or else the nearest value after it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable.
    fn read_latest_value_for(&self, key: Key) -> Result<Option<V>>;
}
