// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock stores and readers for testing.
//!
//! [`MockStore`] records every store operation and lets a test evict entries
//! behind the cache's back. [`MockReader`] serves an append-only data set,
//! records every backend call and supports failure injection.

use std::{collections::BTreeMap, fmt, ops::Bound, sync::Arc};

use parking_lot::Mutex;

use crate::{Error, HistoricalReader, HistoricalStore, Key, Result};

/// Recorded store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// A lookup for the given key.
    Get(Key),
    /// A value was stored under the given key.
    Put(Key),
    /// The given key was removed by the cache.
    Remove(Key),
    /// All entries were removed.
    Clear,
    /// The eviction budget was raised to the given size.
    IncreaseMaximumSize(u64),
}

/// A shared, operation-recording store for testing.
///
/// Clones share the same data, so a test can keep one handle while the cache
/// owns another.
///
/// # Examples
///
/// ```
/// use histocache_tier::testing::{MockStore, StoreOp};
/// use histocache_tier::{HistoricalStore, Key};
///
/// let store = MockStore::<u32>::new();
/// store.put(Key::from_millis(10), 1);
///
/// // Simulate the eviction policy dropping the entry out of band.
/// store.evict(&Key::from_millis(10));
/// assert_eq!(store.get(&Key::from_millis(10)), None);
///
/// assert_eq!(
///     store.operations(),
///     vec![StoreOp::Put(Key::from_millis(10)), StoreOp::Get(Key::from_millis(10))]
/// );
/// ```
pub struct MockStore<V> {
    data: Arc<Mutex<BTreeMap<Key, V>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    maximum_size: Arc<Mutex<Option<u64>>>,
}

impl<V: fmt::Debug> fmt::Debug for MockStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockStore")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("maximum_size", &self.maximum_size)
            .finish()
    }
}

impl<V> Clone for MockStore<V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            maximum_size: Arc::clone(&self.maximum_size),
        }
    }
}

impl<V> Default for MockStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MockStore<V> {
    /// Creates an empty, unbounded mock store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(BTreeMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            maximum_size: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates an empty mock store that reports the given eviction budget.
    ///
    /// The budget is only reported and raised, never enforced; use
    /// [`evict`](Self::evict) to simulate evictions.
    #[must_use]
    pub fn with_maximum_size(maximum_size: u64) -> Self {
        let store = Self::new();
        *store.maximum_size.lock() = Some(maximum_size);
        store
    }

    /// Drops the entry for `key` without recording an operation.
    ///
    /// Returns `true` if an entry was dropped.
    pub fn evict(&self, key: &Key) -> bool {
        self.data.lock().remove(key).is_some()
    }

    /// Returns the stored keys in ascending order.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.data.lock().keys().copied().collect()
    }

    /// Returns a copy of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().clone()
    }

    /// Forgets all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn record(&self, op: StoreOp) {
        self.operations.lock().push(op);
    }
}

impl<V> HistoricalStore<V> for MockStore<V>
where
    V: Clone + Send,
{
    fn get(&self, key: &Key) -> Option<V> {
        self.record(StoreOp::Get(*key));
        self.data.lock().get(key).cloned()
    }

    fn put(&self, key: Key, value: V) {
        self.record(StoreOp::Put(key));
        self.data.lock().insert(key, value);
    }

    fn remove(&self, key: &Key) {
        self.record(StoreOp::Remove(*key));
        self.data.lock().remove(key);
    }

    fn contains_key(&self, key: &Key) -> bool {
        self.data.lock().contains_key(key)
    }

    fn len(&self) -> usize {
        self.data.lock().len()
    }

    fn clear(&self) {
        self.record(StoreOp::Clear);
        self.data.lock().clear();
    }

    fn maximum_size(&self) -> Option<u64> {
        *self.maximum_size.lock()
    }

    fn increase_maximum_size(&self, maximum_size: u64) {
        self.record(StoreOp::IncreaseMaximumSize(maximum_size));
        let mut current = self.maximum_size.lock();
        if current.is_none_or(|size| size < maximum_size) {
            *current = Some(maximum_size);
        }
    }
}

/// Recorded backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderOp {
    /// A range scan starting at the given key.
    ReadAllValuesAscendingFrom(Key),
    /// A nearest-value lookup for the given key.
    ReadLatestValueFor(Key),
}

type Extractor<V> = Arc<dyn Fn(&V) -> Key + Send + Sync>;
type FailPredicate = Box<dyn Fn(&ReaderOp) -> bool + Send + Sync>;

/// An append-only, operation-recording backend for testing.
///
/// Values are kept ordered by the key the extractor returns for them. Clones
/// share the same data, so a test can append values or count range scans
/// while the cache owns another handle.
///
/// # Examples
///
/// ```
/// use histocache_tier::testing::{MockReader, ReaderOp};
/// use histocache_tier::{HistoricalReader, Key};
///
/// let reader = MockReader::new(|v: &(Key, u32)| v.0)
///     .with_values([(Key::from_millis(10), 1), (Key::from_millis(20), 2)]);
///
/// let values = reader.read_all_values_ascending_from(Key::from_millis(15))?;
/// assert_eq!(values, vec![(Key::from_millis(20), 2)]);
/// assert_eq!(reader.range_reads(), 1);
///
/// reader.fail_when(|op| matches!(op, ReaderOp::ReadLatestValueFor(_)));
/// assert!(reader.read_latest_value_for(Key::from_millis(15)).is_err());
/// # Ok::<(), histocache_tier::Error>(())
/// ```
pub struct MockReader<V> {
    data: Arc<Mutex<BTreeMap<Key, V>>>,
    extractor: Extractor<V>,
    batch_size: Option<usize>,
    operations: Arc<Mutex<Vec<ReaderOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl<V: fmt::Debug> fmt::Debug for MockReader<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockReader")
            .field("data", &self.data)
            .field("batch_size", &self.batch_size)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl<V> Clone for MockReader<V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            extractor: Arc::clone(&self.extractor),
            batch_size: self.batch_size,
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
        }
    }
}

impl<V> MockReader<V> {
    /// Creates an empty reader that orders values by `extractor`.
    pub fn new(extractor: impl Fn(&V) -> Key + Send + Sync + 'static) -> Self {
        Self {
            data: Arc::new(Mutex::new(BTreeMap::new())),
            extractor: Arc::new(extractor),
            batch_size: None,
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }

    /// Adds the given values to the data set.
    #[must_use]
    pub fn with_values(self, values: impl IntoIterator<Item = V>) -> Self {
        for value in values {
            self.push(value);
        }
        self
    }

    /// Truncates every range scan to at most `batch_size` values.
    ///
    /// This forces the cache to continue a load with further range scans.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self
    }

    /// Appends a value to the data set.
    pub fn push(&self, value: V) {
        let key = (self.extractor)(&value);
        self.data.lock().insert(key, value);
    }

    /// Returns the keys of the data set in ascending order.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.data.lock().keys().copied().collect()
    }

    /// Sets a predicate that decides which backend calls fail.
    ///
    /// Failing calls are still recorded.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&ReaderOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a copy of all recorded backend calls.
    #[must_use]
    pub fn operations(&self) -> Vec<ReaderOp> {
        self.operations.lock().clone()
    }

    /// Returns how many range scans were issued.
    #[must_use]
    pub fn range_reads(&self) -> usize {
        self.operations
            .lock()
            .iter()
            .filter(|op| matches!(op, ReaderOp::ReadAllValuesAscendingFrom(_)))
            .count()
    }

    /// Forgets all recorded backend calls.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn begin(&self, op: ReaderOp) -> Result<()> {
        self.operations.lock().push(op);
        if self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op)) {
            return Err(Error::backend(format!("mock: {op:?} failed")));
        }
        Ok(())
    }
}

impl<V> HistoricalReader<V> for MockReader<V>
where
    V: Clone + Send,
{
    fn extract_key(&self, _hint: Key, value: &V) -> Key {
        (self.extractor)(value)
    }

    fn read_all_values_ascending_from(&self, key: Key) -> Result<Vec<V>> {
        self.begin(ReaderOp::ReadAllValuesAscendingFrom(key))?;
        let data = self.data.lock();
        let values = data.range(key..).map(|(_, value)| value.clone());
        Ok(match self.batch_size {
            Some(batch_size) => values.take(batch_size).collect(),
            None => values.collect(),
        })
    }

    fn read_latest_value_for(&self, key: Key) -> Result<Option<V>> {
        self.begin(ReaderOp::ReadLatestValueFor(key))?;
        let data = self.data.lock();
        let latest = data
            .range(..=key)
            .next_back()
            .or_else(|| data.range((Bound::Excluded(key), Bound::Unbounded)).next());
        Ok(latest.map(|(_, value)| value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(millis: i64) -> Key {
        Key::from_millis(millis)
    }

    fn reader() -> MockReader<(Key, u32)> {
        MockReader::new(|v: &(Key, u32)| v.0).with_values([(key(10), 1), (key(20), 2), (key(30), 3)])
    }

    #[test]
    fn latest_value_prefers_past_then_future() -> Result<()> {
        let reader = reader();
        assert_eq!(reader.read_latest_value_for(key(25))?, Some((key(20), 2)));
        assert_eq!(reader.read_latest_value_for(key(30))?, Some((key(30), 3)));
        assert_eq!(reader.read_latest_value_for(key(5))?, Some((key(10), 1)));
        assert_eq!(reader.read_latest_value_for(Key::MAX)?, Some((key(30), 3)));
        Ok(())
    }

    #[test]
    fn batch_size_truncates_range_reads() -> Result<()> {
        let reader = reader().with_batch_size(2);
        let values = reader.read_all_values_ascending_from(Key::MIN)?;
        assert_eq!(values, vec![(key(10), 1), (key(20), 2)]);
        Ok(())
    }

    #[test]
    fn failures_are_recorded_and_cleared() {
        let reader = reader();
        reader.fail_when(|_| true);
        let error = reader.read_all_values_ascending_from(key(0)).expect_err("should fail");
        assert_eq!(error.kind(), crate::ErrorKind::Backend);
        reader.clear_failures();
        assert!(reader.read_all_values_ascending_from(key(0)).is_ok());
        assert_eq!(reader.range_reads(), 2);
    }

    #[test]
    fn clones_share_appended_values() {
        let reader = reader();
        let handle = reader.clone();
        handle.push((key(40), 4));
        assert_eq!(reader.keys(), vec![key(10), key(20), key(30), key(40)]);
    }

    #[test]
    fn store_eviction_is_not_recorded() {
        let store = MockStore::new();
        store.put(key(1), 'a');
        assert!(store.evict(&key(1)));
        assert!(!store.evict(&key(1)));
        assert_eq!(store.operations(), vec![StoreOp::Put(key(1))]);
    }

    #[test]
    fn store_budget_only_grows() {
        let store = MockStore::<u8>::with_maximum_size(10);
        store.increase_maximum_size(5);
        assert_eq!(store.maximum_size(), Some(10));
        store.increase_maximum_size(20);
        assert_eq!(store.maximum_size(), Some(20));
    }
}
