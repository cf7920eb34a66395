// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The gap-filling historical cache.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::adjust::{KeyBoundAdjuster, RegisteredCache};
use crate::buffer::BufferedSequence;
use crate::builder::GapCacheBuilder;
use crate::estimator::ReadBackEstimator;
use crate::query::Query;
use crate::telemetry::{self, CacheActivity};
use crate::{Error, HistoricalReader, HistoricalStore, Key, Result};

/// Number of recently consumed lookahead values kept by default.
pub const DEFAULT_LAST_VALUES_CAPACITY: usize = 2;

/// A snapshot of the keys a [`GapCache`] has learned about.
///
/// All fields start out unknown. `min_key_in_db` only ever moves earlier and
/// `max_key_in_db` only ever moves later, except that [`GapCache::clear`]
/// forgets both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct GapBounds {
    /// The smallest key ever requested.
    pub min_key: Option<Key>,
    /// The largest key ever requested.
    pub max_key: Option<Key>,
    /// The smallest key known to exist in the backend.
    pub min_key_in_db: Option<Key>,
    /// The largest key known to exist in the backend.
    pub max_key_in_db: Option<Key>,
    /// The smallest key any range load returned.
    pub min_key_in_db_from_load: Option<Key>,
    /// The largest key any range load returned.
    pub max_key_in_db_from_load: Option<Key>,
}

type Entry<V> = (Key, V);

struct GapState<V> {
    bounds: GapBounds,
    further_values: BufferedSequence<Entry<V>>,
    last_values: BufferedSequence<Entry<V>>,
    estimator: ReadBackEstimator,
    loads: u64,
}

impl<V> GapState<V> {
    /// Restores `snapshot` after a failed call that started at `loads`.
    fn roll_back(&mut self, snapshot: GapBounds, loads: u64) {
        let min_from_load = self.bounds.min_key_in_db_from_load;
        let max_from_load = self.bounds.max_key_in_db_from_load;
        self.bounds = snapshot;
        // An earlier load in the same call already replaced the buffer.
        if self.loads != loads {
            self.bounds.min_key_in_db_from_load = min_from_load;
            self.bounds.max_key_in_db_from_load = max_from_load;
        }
    }
}

/// A historical cache that fills gaps in its store with as few range scans as possible.
///
/// A lookup for a key returns the newest value at or before it. Values come
/// from the store when present, from a lookahead buffer of previously scanned
/// values, or from a new ascending range scan that starts one read-back step
/// before the requested key. The store may evict entries at any time; a miss
/// for a value the cache should already have triggers one recovery scan and
/// teaches the read-back estimator to ask for a larger store.
///
/// All operations run under one lock for their full duration, including the
/// backend calls they make.
///
/// # Examples
///
/// ```
/// use histocache::GapCache;
/// use histocache_tier::testing::MockReader;
/// use histocache::Key;
///
/// let reader = MockReader::new(|v: &(Key, &str)| v.0).with_values([
///     (Key::from_millis(10), "ten"),
///     (Key::from_millis(20), "twenty"),
///     (Key::from_millis(30), "thirty"),
/// ]);
///
/// let cache = GapCache::builder(reader).memory().build();
///
/// assert_eq!(cache.get(Key::from_millis(25))?, Some((Key::from_millis(20), "twenty")));
/// assert_eq!(cache.get(Key::from_millis(5))?, Some((Key::from_millis(10), "ten")));
/// assert_eq!(cache.get(Key::from_millis(35))?, Some((Key::from_millis(30), "thirty")));
/// # Ok::<(), histocache::Error>(())
/// ```
pub struct GapCache<V, R, S> {
    name: &'static str,
    reader: R,
    store: S,
    adjuster: Option<Arc<KeyBoundAdjuster>>,
    last_values_capacity: usize,
    state: Mutex<GapState<V>>,
}

impl<V, R, S> fmt::Debug for GapCache<V, R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("GapCache")
            .field("name", &self.name)
            .field("bounds", &state.bounds)
            .field("further_values", &state.further_values.len())
            .field("last_values", &state.last_values.len())
            .field("estimator", &state.estimator)
            .field("adjuster", &self.adjuster)
            .finish_non_exhaustive()
    }
}

impl<V> GapCache<V, (), ()> {
    /// Starts building a cache over `reader`.
    ///
    /// A store must be chosen with [`GapCacheBuilder::store`] or
    /// [`GapCacheBuilder::memory`] before the cache can be built.
    pub fn builder<R>(reader: R) -> GapCacheBuilder<V, R, ()>
    where
        R: HistoricalReader<V>,
    {
        GapCacheBuilder::new(reader)
    }
}

impl<V, R, S> GapCache<V, R, S>
where
    V: Clone + Send + Sync + 'static,
    R: HistoricalReader<V>,
    S: HistoricalStore<V>,
{
    pub(crate) fn new(
        name: &'static str,
        reader: R,
        store: S,
        adjuster: Option<Arc<KeyBoundAdjuster>>,
        estimator: ReadBackEstimator,
        last_values_capacity: usize,
    ) -> Self {
        Self {
            name,
            reader,
            store,
            adjuster,
            last_values_capacity: last_values_capacity.max(1),
            state: Mutex::new(GapState {
                bounds: GapBounds::default(),
                further_values: BufferedSequence::new(),
                last_values: BufferedSequence::new(),
                estimator,
                loads: 0,
            }),
        }
    }

    /// Returns the newest value at or before `key`.
    ///
    /// When `key` precedes all data the earliest value is returned instead.
    /// The result is also cached under `key`, so repeating the lookup is
    /// answered by the store.
    ///
    /// Keys are used as given; use [`query`](Self::query) to clip them to the
    /// adjuster's frontier first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or a range scan is not sorted
    /// ascending. Learned bounds are left as they were before the call, except
    /// the range-load bounds of a load that succeeded before the failure.
    pub fn get(&self, key: Key) -> Result<Option<V>> {
        let mut state = self.state.lock();
        if let Some(value) = self.store.get(&key) {
            return Ok(Some(value));
        }

        let snapshot = state.bounds;
        let loads = state.loads;
        match self.load_value(&mut state, key) {
            Ok(value) => {
                if let Some(value) = &value {
                    self.store.put(key, value.clone());
                }
                Ok(value)
            }
            Err(error) => {
                state.roll_back(snapshot, loads);
                Err(error)
            }
        }
    }

    /// Returns the first entry strictly after `key`.
    ///
    /// The lookahead buffer answers when it provably follows `key`; otherwise
    /// a range scan starts one millisecond after `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or a range scan is not sorted
    /// ascending.
    pub fn next_entry(&self, key: Key) -> Result<Option<(Key, V)>> {
        let mut state = self.state.lock();
        let snapshot = state.bounds;
        let loads = state.loads;
        let result = self.load_next_entry(&mut state, key);
        if result.is_err() {
            state.roll_back(snapshot, loads);
        }
        result
    }

    /// Re-reads the backend bounds and drops all cached data if they moved.
    ///
    /// Returns `true` if anything was dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; nothing is dropped then.
    pub fn refresh(&self) -> Result<bool> {
        let mut state = self.state.lock();
        let before = state.bounds;
        if let Err(error) = self.refresh_bounds(&mut state, true) {
            state.bounds = before;
            return Err(error);
        }

        let after = state.bounds;
        let moved = before.min_key_in_db != after.min_key_in_db || before.max_key_in_db != after.max_key_in_db;
        if moved {
            self.store.clear();
            state.further_values.clear();
            state.last_values.clear();
            telemetry::record(
                self.name,
                CacheActivity::BoundsRefreshed,
                after.max_key_in_db.unwrap_or(Key::MIN),
                0,
            );
        }
        Ok(moved)
    }

    /// Drops every cached value, both buffers and the backend bounds.
    ///
    /// The requested-key watermarks and the range-load bounds are kept.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        self.store.clear();
        state.further_values.clear();
        state.last_values.clear();
        state.bounds.min_key_in_db = None;
        state.bounds.max_key_in_db = None;
        telemetry::record(self.name, CacheActivity::Cleared, state.bounds.max_key.unwrap_or(Key::MIN), 0);
    }

    /// Evicts the value cached under `key`.
    pub fn remove(&self, key: Key) {
        self.store.remove(&key);
    }

    /// Returns a query that clips keys to this cache's adjuster.
    #[must_use]
    pub fn query(&self) -> Query<'_, V, R, S> {
        Query::new(self)
    }

    /// Returns the name used in log events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the backend reader.
    #[must_use]
    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Returns the adjuster this cache is clipped by, if any.
    #[must_use]
    pub fn adjuster(&self) -> Option<&Arc<KeyBoundAdjuster>> {
        self.adjuster.as_ref()
    }

    /// Returns a snapshot of the learned bounds.
    #[must_use]
    pub fn bounds(&self) -> GapBounds {
        self.state.lock().bounds
    }

    /// Returns the current read-back step.
    #[must_use]
    pub fn optimal_read_back_step(&self) -> std::time::Duration {
        self.state.lock().estimator.optimal_read_back_step()
    }

    /// Returns the size budget the cache asked the store for.
    #[must_use]
    pub fn optimal_maximum_size(&self) -> Option<u64> {
        self.state.lock().estimator.optimal_maximum_size()
    }

    /// Raises the store's size budget to at least `maximum_size`.
    ///
    /// The read-back estimator keeps growing the budget from there.
    pub fn increase_maximum_size(&self, maximum_size: u64) {
        let mut state = self.state.lock();
        let key = state.bounds.max_key.unwrap_or(Key::MIN);
        self.grow_store(&mut state, key, maximum_size);
    }

    fn entry(&self, hint: Key, value: V) -> Entry<V> {
        (self.reader.extract_key(hint, &value), value)
    }

    fn load_value(&self, state: &mut GapState<V>, key: Key) -> Result<Option<V>> {
        self.refresh_bounds(state, false)?;

        let new_min_key = state.bounds.min_key.is_none_or(|min| key < min);
        if new_min_key {
            state.bounds.min_key = Some(key);
        }
        let previous_max_key = state.bounds.max_key;
        let new_max_key = previous_max_key.is_none_or(|max| key > max);
        if new_max_key {
            state.bounds.max_key = Some(key);
        }

        if let Some(value) = self.eventually_get_min_value(state, key, new_min_key) {
            return Ok(Some(value));
        }
        if let Some(max_db) = state.bounds.max_key_in_db {
            if key >= max_db {
                if let Some(value) = self.store.get(&max_db) {
                    return Ok(Some(value));
                }
            }
        }

        let mut loaded = false;
        if self.should_load_further_values(state, key, new_min_key) {
            let from = self.load_start(state, key, new_min_key);
            self.load_further_values(state, key, from)?;
            loaded = true;
        }

        let mut found = self.search_in_further_values(state, key, &mut loaded)?;

        if !loaded && self.is_potentially_already_evicted(state, key, found.as_ref()) {
            let current_len = self.store.len();
            let from = self.load_start(state, key, false);
            self.load_further_values(state, key, from)?;
            loaded = true;
            telemetry::record(self.name, CacheActivity::EvictionRecovery, key, 0);
            if let Some(size) = state.estimator.check_successive_cache_evictions(key, current_len) {
                self.grow_store(state, key, size);
            }
            found = self.search_in_further_values(state, key, &mut loaded)?;
        }

        if let Some((_, value)) = found {
            return Ok(Some(value));
        }

        if loaded {
            if let Some(value) = self.eventually_get_min_value(state, key, new_min_key) {
                return Ok(Some(value));
            }
        }
        if new_max_key && state.bounds.max_key_in_db.is_some_and(|max_db| max_db <= key) {
            if let Some(value) = previous_max_key.and_then(|previous| self.store.get(&previous)) {
                return Ok(Some(value));
            }
        }

        self.read_newest_value_from_db(state, key)
    }

    fn refresh_bounds(&self, state: &mut GapState<V>, force: bool) -> Result<()> {
        if force || state.bounds.min_key_in_db.is_none() {
            if let Some(value) = self.reader.read_latest_value_for(Key::MIN)? {
                let (min, value) = self.entry(Key::MIN, value);
                self.store.put(min, value);
                state.bounds.min_key_in_db = Some(state.bounds.min_key_in_db.map_or(min, |known| known.min(min)));
            }
        }

        let frontier = self.adjuster.as_ref().and_then(|adjuster| adjuster.cached_highest_allowed_key());
        if let Some(frontier) = frontier {
            state.bounds.max_key_in_db = Some(state.bounds.max_key_in_db.map_or(frontier, |known| known.max(frontier)));
        } else if force || state.bounds.max_key_in_db.is_none() {
            if let Some(value) = self.reader.read_latest_value_for(Key::MAX)? {
                let (max, value) = self.entry(Key::MAX, value);
                self.store.put(max, value);
                state.bounds.max_key_in_db = Some(state.bounds.max_key_in_db.map_or(max, |known| known.max(max)));
            }
        }
        Ok(())
    }

    fn eventually_get_min_value(&self, state: &GapState<V>, key: Key, new_min_key: bool) -> Option<V> {
        let min_db = state.bounds.min_key_in_db?;
        if key > min_db {
            return None;
        }
        if !new_min_key {
            if let Some(value) = state.bounds.min_key.and_then(|min| self.store.get(&min)) {
                return Some(value);
            }
        }
        self.store.get(&min_db)
    }

    fn should_load_further_values(&self, state: &GapState<V>, key: Key, new_min_key: bool) -> bool {
        let bounds = &state.bounds;
        if state.further_values.is_empty() {
            let (Some((ring_head, _)), Some((ring_tail, _))) = (state.last_values.head(), state.last_values.tail()) else {
                return true;
            };
            let ring_reaches_max = bounds.max_key_in_db == Some(*ring_tail) && key <= *ring_tail;
            return !(ring_reaches_max && *ring_head <= key);
        }
        new_min_key && bounds.min_key_in_db_from_load.is_some_and(|min| key < min)
    }

    fn load_start(&self, state: &GapState<V>, key: Key, new_min_key: bool) -> Key {
        let bounds = &state.bounds;
        let read_back = key.saturating_sub(state.estimator.optimal_read_back_step());
        let Some(min_db) = bounds.min_key_in_db else {
            return read_back;
        };
        if new_min_key && bounds.min_key_in_db_from_load.is_some_and(|min| key < min) {
            return min_db;
        }
        read_back.max(min_db)
    }

    fn is_potentially_already_evicted(&self, state: &GapState<V>, key: Key, found: Option<&Entry<V>>) -> bool {
        let bounds = &state.bounds;
        match found {
            // The buffer ran dry below both `key` and the backend maximum, so
            // the values in between are gone from the store.
            Some((found_key, _)) if *found_key <= key => {
                state.further_values.is_empty()
                    && *found_key < key
                    && bounds.max_key_in_db.is_some_and(|max_db| *found_key < max_db)
            }
            _ => {
                bounds.min_key_in_db.is_some_and(|min| key > min)
                    || bounds.min_key_in_db_from_load.is_some_and(|min| key > min)
            }
        }
    }

    /// Range-loads from `from` until the loaded tail reaches `key` or the
    /// backend maximum, then replaces the lookahead buffer.
    fn load_further_values(&self, state: &mut GapState<V>, key: Key, from: Key) -> Result<()> {
        let max_db = state.bounds.max_key_in_db;
        let mut loaded = BufferedSequence::<Entry<V>>::new();
        let mut first_batch: Option<(std::time::Duration, usize)> = None;
        let mut cursor = from;

        loop {
            let mut batch: Vec<Entry<V>> = self
                .reader
                .read_all_values_ascending_from(cursor)?
                .into_iter()
                .map(|value| self.entry(cursor, value))
                .collect();

            if let Some((tail_key, _)) = loaded.tail() {
                if batch.last().is_none_or(|(last, _)| last <= tail_key) {
                    break;
                }
                let stale = batch.iter().take_while(|(batch_key, _)| *batch_key < cursor).count();
                batch.drain(..stale);
            }

            if !loaded.consume(batch) {
                break;
            }

            let (Some((head_key, _)), Some((tail_key, _))) = (loaded.head(), loaded.tail()) else {
                break;
            };
            let (head_key, tail_key) = (*head_key, *tail_key);
            if first_batch.is_none() {
                first_batch = Some((tail_key.duration_since(head_key), loaded.len()));
            }
            if tail_key >= key || max_db.is_some_and(|max| tail_key >= max) {
                break;
            }
            cursor = tail_key.add_millis(1);
        }

        let mut previous: Option<Key> = None;
        for (loaded_key, _) in &loaded {
            if let Some(previous) = previous.filter(|previous| loaded_key < previous) {
                return Err(Error::unsorted(previous, *loaded_key));
            }
            previous = Some(*loaded_key);
        }

        let bounds = loaded.head().map(|(head, _)| *head).zip(loaded.tail().map(|(tail, _)| *tail));
        let count = loaded.len();
        state.further_values = loaded;
        state.last_values.clear();
        state.loads = state.loads.wrapping_add(1);

        telemetry::record(self.name, CacheActivity::RangeLoad, from, u64::try_from(count).unwrap_or(u64::MAX));

        let Some((head, tail)) = bounds else {
            return Ok(());
        };
        let known = &mut state.bounds;
        // A load may start anywhere, so it only sharpens bounds already read from the backend.
        known.min_key_in_db = known.min_key_in_db.map(|min| min.min(head));
        known.max_key_in_db = known.max_key_in_db.map(|max| max.max(tail));
        known.min_key_in_db_from_load = Some(known.min_key_in_db_from_load.map_or(head, |min| min.min(head)));
        known.max_key_in_db_from_load = Some(known.max_key_in_db_from_load.map_or(tail, |max| max.max(tail)));

        if let Some((span, batch_len)) = first_batch {
            if let Some(size) = state.estimator.observe_load(span, batch_len) {
                self.grow_store(state, key, size);
            }
        }
        Ok(())
    }

    /// Finds the newest buffered value at or before `key`, consuming the
    /// lookahead buffer up to it and continuing the range load while the
    /// buffer runs dry before `key`.
    fn search_in_further_values(&self, state: &mut GapState<V>, key: Key, loaded: &mut bool) -> Result<Option<Entry<V>>> {
        let mut previous: Option<Entry<V>> = None;
        for (last_key, last_value) in &state.last_values {
            if *last_key > key {
                return Ok(previous);
            }
            previous = Some((*last_key, last_value.clone()));
        }

        loop {
            while state.further_values.head().is_some_and(|(head_key, _)| *head_key <= key) {
                let Some((head_key, head_value)) = state.further_values.pop_head() else {
                    break;
                };
                self.push_last_value(state, (head_key, head_value.clone()));
                if head_key == key {
                    return Ok(Some((head_key, head_value)));
                }
                self.store.put(head_key, head_value.clone());
                previous = Some((head_key, head_value));
            }

            if !state.further_values.is_empty() {
                break;
            }
            let Some(consumed_key) = previous.as_ref().map(|(previous_key, _)| *previous_key) else {
                break;
            };
            let Some(max_db) = state.bounds.max_key_in_db else {
                break;
            };
            // The drained buffer's tail decides, not the furthest load so far.
            if !(consumed_key < max_db && key < max_db) {
                break;
            }

            let read_back = key.saturating_sub(state.estimator.optimal_read_back_step());
            self.load_further_values(state, key, consumed_key.max(read_back))?;
            *loaded = true;

            if state.further_values.tail().is_none_or(|(tail_key, _)| *tail_key <= consumed_key) {
                break;
            }
            if state.further_values.head().is_some_and(|(head_key, _)| *head_key == consumed_key) {
                if let Some(duplicate) = state.further_values.pop_head() {
                    self.push_last_value(state, duplicate);
                }
            } else {
                previous = None;
            }
        }

        Ok(previous)
    }

    fn push_last_value(&self, state: &mut GapState<V>, entry: Entry<V>) {
        while state.last_values.len() >= self.last_values_capacity {
            state.last_values.pop_head();
        }
        state.last_values.push(entry);
    }

    fn read_newest_value_from_db(&self, state: &GapState<V>, key: Key) -> Result<Option<V>> {
        let latest = self.reader.read_latest_value_for(key)?.map(|value| self.entry(key, value));
        let head = state.further_values.head();

        let newest = match (latest, head) {
            (None, head) => head.cloned(),
            (Some((latest_key, _)), Some((head_key, head_value))) if latest_key > key && latest_key > *head_key => {
                Some((*head_key, head_value.clone()))
            }
            (latest, _) => latest,
        };

        Ok(newest.map(|(newest_key, value)| {
            self.store.put(newest_key, value.clone());
            value
        }))
    }

    fn load_next_entry(&self, state: &mut GapState<V>, key: Key) -> Result<Option<Entry<V>>> {
        let brackets = state.last_values.tail().is_some_and(|(last_key, _)| *last_key <= key);
        if brackets {
            while state.further_values.head().is_some_and(|(head_key, _)| *head_key <= key) {
                if let Some(consumed) = state.further_values.pop_head() {
                    self.store.put(consumed.0, consumed.1.clone());
                    self.push_last_value(state, consumed);
                }
            }
            if let Some(next) = self.consume_head(state) {
                return Ok(Some(next));
            }
        }

        let after = key.add_millis(1);
        if after == key {
            return Ok(None);
        }
        self.load_further_values(state, after, after)?;
        Ok(self.consume_head(state))
    }

    fn consume_head(&self, state: &mut GapState<V>) -> Option<Entry<V>> {
        let next = state.further_values.pop_head()?;
        self.store.put(next.0, next.1.clone());
        self.push_last_value(state, next.clone());
        Some(next)
    }

    fn grow_store(&self, state: &mut GapState<V>, key: Key, size: u64) {
        self.store.increase_maximum_size(size);
        state.estimator.increase_maximum_size(size);
        telemetry::record(self.name, CacheActivity::MaximumSizeIncreased, key, size);
    }
}

impl<V, R, S> RegisteredCache for GapCache<V, R, S>
where
    V: Clone + Send + Sync + 'static,
    R: HistoricalReader<V>,
    S: HistoricalStore<V>,
{
    fn clear(&self) {
        Self::clear(self);
    }

    fn remove(&self, key: Key) {
        Self::remove(self, key);
    }
}

#[cfg(test)]
mod tests {
    use histocache_tier::testing::{MockReader, MockStore, ReaderOp, StoreOp};

    use super::*;

    type Value = (Key, u32);

    fn key(millis: i64) -> Key {
        Key::from_millis(millis)
    }

    fn reader(keys: &[i64]) -> MockReader<Value> {
        MockReader::new(|v: &Value| v.0).with_values(keys.iter().map(|millis| (key(*millis), u32::try_from(*millis).unwrap_or(0))))
    }

    fn cache(reader: MockReader<Value>, store: MockStore<Value>) -> GapCache<Value, MockReader<Value>, MockStore<Value>> {
        GapCache::new("test", reader, store, None, ReadBackEstimator::new(None), DEFAULT_LAST_VALUES_CAPACITY)
    }

    #[test]
    fn empty_backend_yields_none() -> Result<()> {
        let cache = cache(reader(&[]), MockStore::new());
        assert_eq!(cache.get(key(10))?, None);
        assert_eq!(cache.bounds().min_key_in_db, None);
        Ok(())
    }

    #[test]
    fn first_lookup_reads_bounds_then_range_loads() -> Result<()> {
        let reader = reader(&[10, 20, 30]);
        let cache = cache(reader.clone(), MockStore::new());
        assert_eq!(cache.get(key(25))?, Some((key(20), 20)));
        assert_eq!(
            reader.operations(),
            vec![
                ReaderOp::ReadLatestValueFor(Key::MIN),
                ReaderOp::ReadLatestValueFor(Key::MAX),
                ReaderOp::ReadAllValuesAscendingFrom(key(10)),
            ]
        );
        let bounds = cache.bounds();
        assert_eq!(bounds.min_key_in_db, Some(key(10)));
        assert_eq!(bounds.max_key_in_db, Some(key(30)));
        assert_eq!(bounds.min_key_in_db_from_load, Some(key(10)));
        assert_eq!(bounds.max_key_in_db_from_load, Some(key(30)));
        Ok(())
    }

    #[test]
    fn exact_hits_are_served_from_the_buffer() -> Result<()> {
        let reader = reader(&[10, 20, 30, 40]);
        let cache = cache(reader.clone(), MockStore::new());
        assert_eq!(cache.get(key(20))?, Some((key(20), 20)));
        assert_eq!(cache.get(key(30))?, Some((key(30), 30)));
        assert_eq!(reader.range_reads(), 1);
        Ok(())
    }

    #[test]
    fn batched_reader_continues_until_key() -> Result<()> {
        let reader = reader(&[10, 20, 30, 40, 50, 60]).with_batch_size(2);
        let cache = cache(reader.clone(), MockStore::new());
        assert_eq!(cache.get(key(55))?, Some((key(50), 50)));
        assert_eq!(
            reader.operations()[2..],
            [
                ReaderOp::ReadAllValuesAscendingFrom(key(10)),
                ReaderOp::ReadAllValuesAscendingFrom(key(21)),
                ReaderOp::ReadAllValuesAscendingFrom(key(41)),
            ]
        );
        Ok(())
    }

    #[test]
    fn consumed_values_are_cached_under_their_keys() -> Result<()> {
        let store = MockStore::new();
        let cache = cache(reader(&[10, 20, 30]), store.clone());
        let _ = cache.get(key(25))?;
        assert_eq!(store.keys(), vec![key(10), key(20), key(25), key(30)]);
        Ok(())
    }

    #[test]
    fn backend_failure_restores_bounds() {
        let reader = reader(&[10, 20, 30]);
        reader.fail_when(|op| matches!(op, ReaderOp::ReadAllValuesAscendingFrom(_)));
        let cache = cache(reader.clone(), MockStore::new());

        let error = cache.get(key(25)).expect_err("range load fails");
        assert_eq!(error.kind(), crate::ErrorKind::Backend);
        assert_eq!(cache.bounds(), GapBounds::default());

        reader.clear_failures();
        assert_eq!(cache.get(key(25)).expect("recovered"), Some((key(20), 20)));
    }

    #[test]
    fn failure_after_a_load_keeps_load_bounds_in_step_with_buffer() {
        let reader = reader(&[10, 20, 30]);
        reader.fail_when(|op| *op == ReaderOp::ReadLatestValueFor(key(25)));
        let estimator = ReadBackEstimator::new(None)
            .with_min_read_back_step(std::time::Duration::from_millis(1))
            .with_read_back_step(std::time::Duration::from_millis(1));
        let cache = GapCache::new("test", reader.clone(), MockStore::new(), None, estimator, DEFAULT_LAST_VALUES_CAPACITY);

        // The range load from 24 succeeds with [30]; the final point lookup fails.
        let error = cache.get(key(25)).expect_err("point lookup fails");
        assert_eq!(error.kind(), crate::ErrorKind::Backend);

        let bounds = cache.bounds();
        assert_eq!(bounds.min_key, None);
        assert_eq!(bounds.max_key_in_db, None);
        assert_eq!(bounds.min_key_in_db_from_load, Some(key(30)));
        assert_eq!(bounds.max_key_in_db_from_load, Some(key(30)));

        reader.clear_failures();
        assert_eq!(cache.get(key(25)).expect("recovered"), Some((key(20), 20)));
    }

    #[test]
    fn external_increase_reaches_store_and_estimator() {
        let store = MockStore::with_maximum_size(10);
        let cache = GapCache::new(
            "test",
            reader(&[10]),
            store.clone(),
            None,
            ReadBackEstimator::new(Some(10)),
            DEFAULT_LAST_VALUES_CAPACITY,
        );

        cache.increase_maximum_size(40);
        assert_eq!(cache.optimal_maximum_size(), Some(40));
        assert_eq!(store.maximum_size(), Some(40));
        assert_eq!(store.operations(), vec![StoreOp::IncreaseMaximumSize(40)]);
    }

    #[test]
    fn clear_keeps_watermarks() -> Result<()> {
        let store = MockStore::new();
        let cache = cache(reader(&[10, 20, 30]), store.clone());
        let _ = cache.get(key(25))?;
        cache.clear();

        let bounds = cache.bounds();
        assert_eq!(bounds.min_key, Some(key(25)));
        assert_eq!(bounds.max_key, Some(key(25)));
        assert_eq!(bounds.min_key_in_db, None);
        assert_eq!(bounds.max_key_in_db, None);
        assert_eq!(bounds.min_key_in_db_from_load, Some(key(10)));
        assert!(store.keys().is_empty());
        assert_eq!(store.operations().last(), Some(&StoreOp::Clear));
        Ok(())
    }

    #[test]
    fn refresh_reports_moved_bounds() -> Result<()> {
        let reader = reader(&[10, 20, 30]);
        let store = MockStore::new();
        let cache = cache(reader.clone(), store.clone());
        let _ = cache.get(key(25))?;

        assert!(!cache.refresh()?);
        assert!(!store.keys().is_empty());

        reader.push((key(40), 40));
        assert!(cache.refresh()?);
        assert_eq!(cache.bounds().max_key_in_db, Some(key(40)));
        assert_eq!(store.keys(), vec![]);
        Ok(())
    }

    #[test]
    fn next_entry_reuses_lookahead() -> Result<()> {
        let reader = reader(&[10, 20, 30, 40]);
        let cache = cache(reader.clone(), MockStore::new());
        assert_eq!(cache.next_entry(key(10))?, Some((key(20), 20)));
        assert_eq!(cache.next_entry(key(20))?, Some((key(30), 30)));
        assert_eq!(cache.next_entry(key(30))?, Some((key(40), 40)));
        assert_eq!(reader.range_reads(), 1);
        assert_eq!(cache.next_entry(key(40))?, None);
        Ok(())
    }

    #[test]
    fn next_entry_loads_when_key_is_not_bracketed() -> Result<()> {
        let reader = reader(&[10, 20, 30, 40]);
        let cache = cache(reader.clone(), MockStore::new());
        assert_eq!(cache.next_entry(key(30))?, Some((key(40), 40)));
        assert_eq!(cache.next_entry(key(15))?, Some((key(20), 20)));
        assert_eq!(reader.range_reads(), 2);
        Ok(())
    }
}
