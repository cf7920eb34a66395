// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory store implementation using moka.

use std::fmt;

use histocache_tier::{HistoricalStore, Key};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use parking_lot::RwLock;

use crate::builder::InMemoryStoreBuilder;

/// An in-memory historical store backed by moka.
///
/// Entries are evicted least-recently-used once the maximum size is reached.
/// Raising the maximum size rebuilds the underlying moka cache and copies the
/// live entries over, since moka fixes its capacity at construction.
///
/// # Examples
///
/// ```
/// use histocache_memory::InMemoryStore;
/// use histocache_tier::{HistoricalStore, Key};
///
/// let store = InMemoryStore::<i32>::with_capacity(2);
/// store.put(Key::from_millis(1), 1);
/// store.increase_maximum_size(8);
///
/// assert_eq!(store.maximum_size(), Some(8));
/// assert_eq!(store.get(&Key::from_millis(1)), Some(1));
/// ```
pub struct InMemoryStore<V> {
    inner: RwLock<Cache<Key, V>>,
    initial_capacity: Option<usize>,
    name: Option<String>,
}

impl<V> fmt::Debug for InMemoryStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("InMemoryStore")
            .field("name", &self.name)
            .field("entry_count", &inner.entry_count())
            .field("max_capacity", &inner.policy().max_capacity())
            .finish_non_exhaustive()
    }
}

impl<V> Default for InMemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> InMemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new unbounded in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a new in-memory store holding at most `max_capacity` entries.
    #[must_use]
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self::builder().max_capacity(max_capacity).build()
    }

    /// Creates a new builder for configuring an in-memory store.
    #[must_use]
    pub fn builder() -> InMemoryStoreBuilder<V> {
        InMemoryStoreBuilder::new()
    }

    pub(crate) fn from_builder(builder: InMemoryStoreBuilder<V>) -> Self {
        let cache = build_cache(builder.max_capacity, builder.initial_capacity, builder.name.as_deref());
        Self {
            inner: RwLock::new(cache),
            initial_capacity: builder.initial_capacity,
            name: builder.name,
        }
    }
}

fn build_cache<V>(max_capacity: Option<u64>, initial_capacity: Option<usize>, name: Option<&str>) -> Cache<Key, V>
where
    V: Clone + Send + Sync + 'static,
{
    let mut moka_builder = Cache::builder().eviction_policy(EvictionPolicy::lru());

    if let Some(capacity) = max_capacity {
        moka_builder = moka_builder.max_capacity(capacity);
    }

    if let Some(capacity) = initial_capacity {
        moka_builder = moka_builder.initial_capacity(capacity);
    }

    if let Some(name) = name {
        moka_builder = moka_builder.name(name);
    }

    moka_builder.build()
}

impl<V> HistoricalStore<V> for InMemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &Key) -> Option<V> {
        self.inner.read().get(key)
    }

    fn put(&self, key: Key, value: V) {
        self.inner.read().insert(key, value);
    }

    fn remove(&self, key: &Key) {
        self.inner.read().invalidate(key);
    }

    fn contains_key(&self, key: &Key) -> bool {
        self.inner.read().contains_key(key)
    }

    fn len(&self) -> usize {
        let inner = self.inner.read();
        // moka applies writes lazily; flush them so the count is exact.
        inner.run_pending_tasks();
        usize::try_from(inner.entry_count()).unwrap_or(usize::MAX)
    }

    fn clear(&self) {
        let inner = self.inner.read();
        inner.invalidate_all();
        inner.run_pending_tasks();
    }

    fn maximum_size(&self) -> Option<u64> {
        self.inner.read().policy().max_capacity()
    }

    fn increase_maximum_size(&self, maximum_size: u64) {
        let mut inner = self.inner.write();
        let Some(current) = inner.policy().max_capacity() else {
            return;
        };
        if current >= maximum_size {
            return;
        }

        let resized = build_cache(Some(maximum_size), self.initial_capacity, self.name.as_deref());
        for (key, value) in inner.iter() {
            resized.insert(*key, value);
        }
        *inner = resized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_store_ignores_increase() {
        let store = InMemoryStore::<u8>::new();
        store.increase_maximum_size(10);
        assert_eq!(store.maximum_size(), None);
    }

    #[test]
    fn shrinking_is_ignored() {
        let store = InMemoryStore::<u8>::with_capacity(10);
        store.increase_maximum_size(4);
        assert_eq!(store.maximum_size(), Some(10));
    }

    #[test]
    fn debug_reports_name_and_capacity() {
        let store = InMemoryStore::<u8>::builder().name("ticks").max_capacity(3).build();
        let debug = format!("{store:?}");
        assert!(debug.contains("ticks"), "got: {debug}");
        assert!(debug.contains("Some(3)"), "got: {debug}");
    }
}
