// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring in-memory stores.

use std::marker::PhantomData;

use crate::store::InMemoryStore;

/// Builder for configuring an `InMemoryStore`.
///
/// # Examples
///
/// ```
/// use histocache_memory::InMemoryStore;
///
/// let store = InMemoryStore::<i32>::builder()
///     .max_capacity(1000)
///     .initial_capacity(100)
///     .name("quotes")
///     .build();
/// ```
#[derive(Debug)]
pub struct InMemoryStoreBuilder<V> {
    pub(crate) max_capacity: Option<u64>,
    pub(crate) initial_capacity: Option<usize>,
    pub(crate) name: Option<String>,
    _phantom: PhantomData<V>,
}

impl<V> Default for InMemoryStoreBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> InMemoryStoreBuilder<V> {
    /// Creates a new builder for an unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_capacity: None,
            initial_capacity: None,
            name: None,
            _phantom: PhantomData,
        }
    }

    /// Sets the maximum number of entries.
    ///
    /// Once the capacity is reached, the least recently used entries are
    /// evicted. If not set, the store is unbounded and
    /// [`increase_maximum_size`](histocache_tier::HistoricalStore::increase_maximum_size)
    /// has no effect.
    #[must_use]
    pub fn max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    /// Sets the initial capacity (pre-allocation hint) for the store.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Sets a name for the store.
    ///
    /// The name is passed on to moka and kept when the store is resized.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the configured `InMemoryStore`.
    #[must_use]
    pub fn build(self) -> InMemoryStore<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        InMemoryStore::from_builder(self)
    }
}
