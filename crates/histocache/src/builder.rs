// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for gap caches.
//!
//! The builder tracks the chosen store in its type, so a cache cannot be
//! built before a store has been picked.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "memory")]
use histocache_memory::InMemoryStore;

use crate::adjust::{KeyBoundAdjuster, RegisteredCache};
use crate::estimator::{DEFAULT_EVICTION_THRESHOLD, DEFAULT_MIN_READ_BACK_STEP, DEFAULT_READ_BACK_STEP, ReadBackEstimator};
use crate::gap::{DEFAULT_LAST_VALUES_CAPACITY, GapCache};
use crate::{HistoricalReader, HistoricalStore};

const DEFAULT_NAME: &str = "histocache";

#[derive(Debug, Clone)]
struct Settings {
    name: &'static str,
    initial_maximum_size: Option<u64>,
    read_back_step: Duration,
    min_read_back_step: Duration,
    last_values_capacity: usize,
    eviction_threshold: u32,
    adjuster: Option<Arc<KeyBoundAdjuster>>,
}

/// Builder for a [`GapCache`].
///
/// Created by [`GapCache::builder`].
///
/// # Examples
///
/// ```
/// use histocache_tier::testing::MockReader;
/// use histocache::{GapCache, Key};
/// use std::time::Duration;
///
/// let reader = MockReader::new(|v: &(Key, u32)| v.0);
/// let cache = GapCache::builder(reader)
///     .name("quotes")
///     .initial_maximum_size(10_000)
///     .memory()
///     .read_back_step(Duration::from_secs(3600))
///     .build();
///
/// assert_eq!(cache.name(), "quotes");
/// assert_eq!(cache.optimal_maximum_size(), Some(10_000));
/// ```
#[derive(Debug)]
pub struct GapCacheBuilder<V, R, S = ()> {
    reader: R,
    store: S,
    settings: Settings,
    _phantom: PhantomData<fn() -> V>,
}

impl<V, R> GapCacheBuilder<V, R, ()> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            store: (),
            settings: Settings {
                name: DEFAULT_NAME,
                initial_maximum_size: None,
                read_back_step: DEFAULT_READ_BACK_STEP,
                min_read_back_step: DEFAULT_MIN_READ_BACK_STEP,
                last_values_capacity: DEFAULT_LAST_VALUES_CAPACITY,
                eviction_threshold: DEFAULT_EVICTION_THRESHOLD,
                adjuster: None,
            },
            _phantom: PhantomData,
        }
    }

    /// Sets the store the cache fills.
    ///
    /// Pass an `Arc` to keep a handle to the store outside the cache.
    pub fn store<S>(self, store: S) -> GapCacheBuilder<V, R, S>
    where
        S: HistoricalStore<V>,
    {
        GapCacheBuilder {
            reader: self.reader,
            store,
            settings: self.settings,
            _phantom: PhantomData,
        }
    }

    /// Uses an in-memory store bounded by the initial maximum size set so far.
    ///
    /// Without an initial maximum size the store is unbounded.
    #[cfg(feature = "memory")]
    #[must_use]
    pub fn memory(self) -> GapCacheBuilder<V, R, InMemoryStore<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let mut store = InMemoryStore::builder().name(self.settings.name);
        if let Some(size) = self.settings.initial_maximum_size {
            store = store.max_capacity(size);
        }
        self.store(store.build())
    }
}

impl<V, R, S> GapCacheBuilder<V, R, S> {
    /// Sets the name used in log events.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.settings.name = name;
        self
    }

    /// Sets the size budget the cache starts from.
    ///
    /// Defaults to the store's own maximum size.
    #[must_use]
    pub fn initial_maximum_size(mut self, size: u64) -> Self {
        self.settings.initial_maximum_size = Some(size);
        self
    }

    /// Sets how far before a requested key the first range load starts.
    #[must_use]
    pub fn read_back_step(mut self, step: Duration) -> Self {
        self.settings.read_back_step = step;
        self
    }

    /// Sets the floor the adaptive read-back step never goes below.
    #[must_use]
    pub fn min_read_back_step(mut self, floor: Duration) -> Self {
        self.settings.min_read_back_step = floor;
        self
    }

    /// Sets how many recently consumed lookahead values are kept (at least one).
    #[must_use]
    pub fn last_values_capacity(mut self, capacity: usize) -> Self {
        self.settings.last_values_capacity = capacity.max(1);
        self
    }

    /// Sets how many successive evictions double the size budget (at least one).
    #[must_use]
    pub fn eviction_threshold(mut self, threshold: u32) -> Self {
        self.settings.eviction_threshold = threshold.max(1);
        self
    }

    /// Clips queries to the frontier of `adjuster`.
    ///
    /// The first cache built on an adjuster becomes the parent that deferred
    /// keys are evicted from. Every cache is cleared once the frontier is
    /// first discovered.
    #[must_use]
    pub fn adjuster(mut self, adjuster: Arc<KeyBoundAdjuster>) -> Self {
        self.settings.adjuster = Some(adjuster);
        self
    }
}

impl<V, R, S> GapCacheBuilder<V, R, S>
where
    V: Clone + Send + Sync + 'static,
    R: HistoricalReader<V> + 'static,
    S: HistoricalStore<V> + 'static,
{
    /// Builds the cache.
    #[must_use]
    pub fn build(self) -> Arc<GapCache<V, R, S>> {
        let settings = self.settings;
        let initial_maximum_size = settings.initial_maximum_size.or_else(|| self.store.maximum_size());
        let estimator = ReadBackEstimator::new(initial_maximum_size)
            .with_min_read_back_step(settings.min_read_back_step)
            .with_read_back_step(settings.read_back_step)
            .with_eviction_threshold(settings.eviction_threshold);

        let cache = Arc::new(GapCache::new(
            settings.name,
            self.reader,
            self.store,
            settings.adjuster.clone(),
            estimator,
            settings.last_values_capacity,
        ));

        if let Some(adjuster) = settings.adjuster {
            let registered: Arc<dyn RegisteredCache> = Arc::<GapCache<V, R, S>>::clone(&cache);
            let registered = Arc::downgrade(&registered);
            adjuster.bind_parent_if_unbound(registered.clone());
            adjuster.register_historical_cache(registered);
        }
        cache
    }
}
