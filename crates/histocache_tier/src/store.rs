// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The in-memory store a historical cache fills.

use std::sync::Arc;

use crate::Key;

/// An ordered key/value store with its own eviction policy.
///
/// The store may drop any entry at any time between calls, and evictions need
/// not be contiguous: the presence of one key says nothing about its
/// neighbours. Historical caches detect and compensate for this.
///
/// Only [`get`](HistoricalStore::get), [`put`](HistoricalStore::put),
/// [`remove`](HistoricalStore::remove), [`len`](HistoricalStore::len) and
/// [`clear`](HistoricalStore::clear) are required. The size methods default
/// to an unbounded store that ignores budget increases.
pub trait HistoricalStore<V>: Send + Sync {
    /// Returns a copy of the value stored under `key`.
    fn get(&self, key: &Key) -> Option<V>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: Key, value: V);

    /// Removes the value stored under `key`, if any.
    fn remove(&self, key: &Key);

    /// Returns `true` if a value is currently stored under `key`.
    fn contains_key(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    /// Returns the number of stored entries.
    fn len(&self) -> usize;

    /// Returns `true` if the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all entries.
    fn clear(&self);

    /// Returns the eviction budget in entries, or `None` when unbounded.
    fn maximum_size(&self) -> Option<u64> {
        None
    }

    /// Raises the eviction budget to `maximum_size` entries.
    ///
    /// Requests that would shrink the budget are ignored.
    fn increase_maximum_size(&self, maximum_size: u64) {
        let _ = maximum_size;
    }
}

impl<V, S> HistoricalStore<V> for Arc<S>
where
    S: HistoricalStore<V> + ?Sized,
{
    fn get(&self, key: &Key) -> Option<V> {
        (**self).get(key)
    }

    fn put(&self, key: Key, value: V) {
        (**self).put(key, value);
    }

    fn remove(&self, key: &Key) {
        (**self).remove(key);
    }

    fn contains_key(&self, key: &Key) -> bool {
        (**self).contains_key(key)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn clear(&self) {
        (**self).clear();
    }

    fn maximum_size(&self) -> Option<u64> {
        (**self).maximum_size()
    }

    fn increase_maximum_size(&self, maximum_size: u64) {
        (**self).increase_maximum_size(maximum_size);
    }
}
