// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Point lookups and forward scans over a [`GapCache`].
//!
//! [`Query`] resolves keys the way a consumer should see them: clipped to the
//! cache's adjuster when there is one. [`FutureQuery`] drops the clipping and
//! adds shift-by-N lookups and lazy forward iterators. An [`ElementFilter`]
//! hides entries from forward scans.

use std::fmt;
use std::iter::FusedIterator;
use std::vec;

use crate::adjust::AdjustContext;
use crate::gap::GapCache;
use crate::{Error, HistoricalReader, HistoricalStore, Key, Result};

/// Lets a decorating query answer forward lookups itself.
///
/// Returning `None` falls back to the cache's own computation. Both methods
/// are only called with `shift_units >= 1`.
pub trait QueryInterceptor<V>: Send + Sync {
    /// Answers [`FutureQuery::get_next_entry`].
    fn next_entry(&self, key: Key, shift_units: usize) -> Option<Result<Option<(Key, V)>>> {
        let _ = (key, shift_units);
        None
    }

    /// Answers [`FutureQuery::get_next_entries`] with at most `shift_units` entries.
    fn next_entries(&self, key: Key, shift_units: usize) -> Option<Result<Vec<(Key, V)>>> {
        let _ = (key, shift_units);
        None
    }
}

/// Decides which entries a forward scan may yield.
///
/// Closures taking the entry's key and value implement this trait.
pub trait ElementFilter<V>: Send + Sync {
    /// Returns `false` to skip the entry.
    fn is_valid(&self, key: Key, value: &V) -> bool;
}

impl<V, F> ElementFilter<V> for F
where
    F: Fn(Key, &V) -> bool + Send + Sync,
{
    fn is_valid(&self, key: Key, value: &V) -> bool {
        self(key, value)
    }
}

/// Lookups through a cache's adjuster.
///
/// Created by [`GapCache::query`].
///
/// # Examples
///
/// ```
/// use histocache::{GapCache, Key, KeyBoundAdjuster};
/// use histocache_tier::testing::MockReader;
/// use std::sync::Arc;
///
/// let reader = MockReader::new(|v: &(Key, u32)| v.0)
///     .with_values([(Key::from_millis(50), 5), (Key::from_millis(150), 15)]);
/// let adjuster = Arc::new(KeyBoundAdjuster::from_fn(|_ctx| Ok(Some(Key::from_millis(100)))));
/// let cache = GapCache::builder(reader).memory().adjuster(adjuster).build();
///
/// // 150 is beyond the frontier, so the query resolves 100 instead.
/// assert_eq!(cache.query().get_key(Key::from_millis(150))?, Some(Key::from_millis(50)));
/// # Ok::<(), histocache::Error>(())
/// ```
pub struct Query<'a, V, R, S> {
    cache: &'a GapCache<V, R, S>,
    ctx: AdjustContext,
    filter_duplicate_keys: bool,
    future_null: bool,
    interceptor: Option<&'a dyn QueryInterceptor<V>>,
    element_filter: Option<&'a dyn ElementFilter<V>>,
}

impl<V, R, S> fmt::Debug for Query<'_, V, R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("ctx", &self.ctx)
            .field("filter_duplicate_keys", &self.filter_duplicate_keys)
            .field("future_null", &self.future_null)
            .field("intercepted", &self.interceptor.is_some())
            .field("filtered", &self.element_filter.is_some())
            .finish_non_exhaustive()
    }
}

impl<V, R, S> Clone for Query<'_, V, R, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V, R, S> Copy for Query<'_, V, R, S> {}

impl<'a, V, R, S> Query<'a, V, R, S> {
    pub(crate) fn new(cache: &'a GapCache<V, R, S>) -> Self {
        Self {
            cache,
            ctx: AdjustContext::root(),
            filter_duplicate_keys: true,
            future_null: false,
            interceptor: None,
            element_filter: None,
        }
    }

    /// Runs adjustments in `ctx`.
    ///
    /// Frontier probes that query adjusted caches pass their nested context
    /// here, so the lookup defers keys instead of probing again.
    #[must_use]
    pub fn with_adjust_context(mut self, ctx: AdjustContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Controls whether forward scans skip entries whose key was just yielded.
    ///
    /// Enabled by default.
    #[must_use]
    pub fn with_filter_duplicate_keys(mut self, filter: bool) -> Self {
        self.filter_duplicate_keys = filter;
        self
    }

    /// Lets `interceptor` answer forward lookups before the cache does.
    #[must_use]
    pub fn with_interceptor(mut self, interceptor: &'a dyn QueryInterceptor<V>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    /// Skips entries `filter` rejects in forward scans.
    ///
    /// Skipped entries do not count toward the requested number of entries.
    /// Point lookups ignore the filter.
    #[must_use]
    pub fn with_element_filter(mut self, filter: &'a dyn ElementFilter<V>) -> Self {
        self.element_filter = Some(filter);
        self
    }

    /// Makes point lookups return `None` instead of a value from after the key.
    ///
    /// Without it, a key before all data resolves to the earliest value.
    #[must_use]
    pub fn with_future_null(mut self) -> Self {
        self.future_null = true;
        self
    }

    /// Switches to unclipped lookups with forward scans.
    #[must_use]
    pub fn with_future(self) -> FutureQuery<'a, V, R, S> {
        FutureQuery { query: self }
    }
}

impl<V, R, S> Query<'_, V, R, S>
where
    V: Clone + Send + Sync + 'static,
    R: HistoricalReader<V>,
    S: HistoricalStore<V>,
{
    fn adjust(&self, key: Key) -> Key {
        self.cache.adjuster().map_or(key, |adjuster| adjuster.adjust_key_in(self.ctx, key))
    }

    fn resolve(&self, key: Key) -> Result<Option<(Key, V)>> {
        let entry = self
            .cache
            .get(key)?
            .map(|value| (self.cache.reader().extract_key(key, &value), value));
        Ok(entry.filter(|(found, _)| !self.future_null || *found <= key))
    }

    /// Returns the newest value at or before the adjusted `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn get_value(&self, key: Key) -> Result<Option<V>> {
        Ok(self.resolve(self.adjust(key))?.map(|(_, value)| value))
    }

    /// Returns the newest entry at or before the adjusted `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn get_entry(&self, key: Key) -> Result<Option<(Key, V)>> {
        self.resolve(self.adjust(key))
    }

    /// Returns the key of the newest entry at or before the adjusted `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn get_key(&self, key: Key) -> Result<Option<Key>> {
        Ok(self.get_entry(key)?.map(|(key, _)| key))
    }
}

/// Unclipped lookups and forward scans.
///
/// Created by [`Query::with_future`].
///
/// # Examples
///
/// ```
/// use histocache::{GapCache, Key};
/// use histocache_tier::testing::MockReader;
///
/// let reader = MockReader::new(|v: &(Key, u32)| v.0).with_values(
///     [10, 20, 30, 40].map(|millis| (Key::from_millis(millis), millis as u32)),
/// );
/// let cache = GapCache::builder(reader).memory().build();
/// let query = cache.query().with_future();
///
/// let keys: Vec<Key> = query.get_next_keys(Key::from_millis(10), 3)?.collect::<Result<_, _>>()?;
/// assert_eq!(keys, [20, 30, 40].map(Key::from_millis));
///
/// assert_eq!(query.get_next_value(Key::from_millis(10), 2)?, Some((Key::from_millis(30), 30)));
/// assert_eq!(query.get_next_value(Key::from_millis(30), 2)?, None);
/// # Ok::<(), histocache::Error>(())
/// ```
pub struct FutureQuery<'a, V, R, S> {
    query: Query<'a, V, R, S>,
}

impl<V, R, S> fmt::Debug for FutureQuery<'_, V, R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureQuery").field("query", &self.query).finish()
    }
}

impl<V, R, S> Clone for FutureQuery<'_, V, R, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V, R, S> Copy for FutureQuery<'_, V, R, S> {}

impl<'a, V, R, S> FutureQuery<'a, V, R, S> {
    /// See [`Query::with_filter_duplicate_keys`].
    #[must_use]
    pub fn with_filter_duplicate_keys(mut self, filter: bool) -> Self {
        self.query.filter_duplicate_keys = filter;
        self
    }

    /// See [`Query::with_element_filter`].
    #[must_use]
    pub fn with_element_filter(mut self, filter: &'a dyn ElementFilter<V>) -> Self {
        self.query.element_filter = Some(filter);
        self
    }

    /// See [`Query::with_future_null`].
    #[must_use]
    pub fn with_future_null(mut self) -> Self {
        self.query.future_null = true;
        self
    }
}

impl<'a, V, R, S> FutureQuery<'a, V, R, S>
where
    V: Clone + Send + Sync + 'static,
    R: HistoricalReader<V>,
    S: HistoricalStore<V>,
{
    /// Returns the newest value at or before `key`, without clipping.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn get_value(&self, key: Key) -> Result<Option<V>> {
        Ok(self.query.resolve(key)?.map(|(_, value)| value))
    }

    /// Returns the `shift_units`-th entry strictly after `key`.
    ///
    /// Returns `None` when fewer entries follow `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if `shift_units` is zero or the backend fails.
    pub fn get_next_entry(&self, key: Key, shift_units: usize) -> Result<Option<(Key, V)>> {
        check_shift(shift_units)?;
        if let Some(answer) = self.query.interceptor.and_then(|interceptor| interceptor.next_entry(key, shift_units)) {
            return answer;
        }

        let mut yielded = 0;
        let mut last = None;
        for entry in self.scan(key, shift_units) {
            last = Some(entry?);
            yielded += 1;
        }
        Ok(if yielded == shift_units { last } else { None })
    }

    /// Returns the key of the `shift_units`-th entry strictly after `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if `shift_units` is zero or the backend fails.
    pub fn get_next_key(&self, key: Key, shift_units: usize) -> Result<Option<Key>> {
        Ok(self.get_next_entry(key, shift_units)?.map(|(key, _)| key))
    }

    /// Returns the value of the `shift_units`-th entry strictly after `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if `shift_units` is zero or the backend fails.
    pub fn get_next_value(&self, key: Key, shift_units: usize) -> Result<Option<V>> {
        Ok(self.get_next_entry(key, shift_units)?.map(|(_, value)| value))
    }

    /// Lazily yields up to `shift_units` entries strictly after `key`.
    ///
    /// # Errors
    ///
    /// Returns an error right away if `shift_units` is zero, or if an
    /// interceptor fails. Backend failures surface as the iterator's last item.
    pub fn get_next_entries(&self, key: Key, shift_units: usize) -> Result<NextEntries<'a, V, R, S>> {
        check_shift(shift_units)?;
        if let Some(answer) = self.query.interceptor.and_then(|interceptor| interceptor.next_entries(key, shift_units)) {
            return Ok(NextEntries::new(Source::Intercepted(answer?.into_iter()), shift_units, &self.query));
        }
        Ok(self.scan(key, shift_units))
    }

    /// Lazily yields up to `shift_units` values strictly after `key`.
    ///
    /// # Errors
    ///
    /// Same as [`get_next_entries`](Self::get_next_entries).
    pub fn get_next_values(&self, key: Key, shift_units: usize) -> Result<NextValues<'a, V, R, S>> {
        self.get_next_entries(key, shift_units).map(NextValues)
    }

    /// Lazily yields up to `shift_units` keys strictly after `key`.
    ///
    /// # Errors
    ///
    /// Same as [`get_next_entries`](Self::get_next_entries).
    pub fn get_next_keys(&self, key: Key, shift_units: usize) -> Result<NextKeys<'a, V, R, S>> {
        self.get_next_entries(key, shift_units).map(NextKeys)
    }

    fn scan(&self, key: Key, shift_units: usize) -> NextEntries<'a, V, R, S> {
        NextEntries::new(
            Source::Cache {
                cache: self.query.cache,
                cursor: key,
            },
            shift_units,
            &self.query,
        )
    }
}

fn check_shift(shift_units: usize) -> Result<()> {
    if shift_units == 0 {
        return Err(Error::invalid_shift(shift_units));
    }
    Ok(())
}

enum Source<'a, V, R, S> {
    Cache { cache: &'a GapCache<V, R, S>, cursor: Key },
    Intercepted(vec::IntoIter<(Key, V)>),
    Done,
}

/// Lazy forward scan over entries.
///
/// Yields at most the requested number of entries, in ascending key order.
/// The scan stops for good once it is exhausted or yields an error.
pub struct NextEntries<'a, V, R, S> {
    source: Source<'a, V, R, S>,
    remaining: usize,
    last_key: Option<Key>,
    filter_duplicate_keys: bool,
    element_filter: Option<&'a dyn ElementFilter<V>>,
}

impl<V, R, S> fmt::Debug for NextEntries<'_, V, R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NextEntries")
            .field("remaining", &self.remaining)
            .field("last_key", &self.last_key)
            .field("filtered", &self.element_filter.is_some())
            .field("done", &matches!(self.source, Source::Done))
            .finish_non_exhaustive()
    }
}

impl<'a, V, R, S> NextEntries<'a, V, R, S> {
    fn new(source: Source<'a, V, R, S>, remaining: usize, query: &Query<'a, V, R, S>) -> Self {
        Self {
            source,
            remaining,
            last_key: None,
            filter_duplicate_keys: query.filter_duplicate_keys,
            element_filter: query.element_filter,
        }
    }
}

impl<V, R, S> Iterator for NextEntries<'_, V, R, S>
where
    V: Clone + Send + Sync + 'static,
    R: HistoricalReader<V>,
    S: HistoricalStore<V>,
{
    type Item = Result<(Key, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 {
            let next = match &mut self.source {
                Source::Cache { cache, cursor } => {
                    let next = cache.next_entry(*cursor);
                    if let Ok(Some((next_key, _))) = &next {
                        *cursor = *next_key;
                    }
                    next.transpose()
                }
                Source::Intercepted(entries) => entries.next().map(Ok),
                Source::Done => None,
            };

            match next {
                Some(Ok(entry)) => {
                    if self.filter_duplicate_keys && self.last_key == Some(entry.0) {
                        continue;
                    }
                    if self.element_filter.is_some_and(|filter| !filter.is_valid(entry.0, &entry.1)) {
                        continue;
                    }
                    self.last_key = Some(entry.0);
                    self.remaining -= 1;
                    return Some(Ok(entry));
                }
                Some(Err(error)) => {
                    self.source = Source::Done;
                    return Some(Err(error));
                }
                None => break,
            }
        }
        self.source = Source::Done;
        self.remaining = 0;
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.source {
            Source::Done => (0, Some(0)),
            _ => (0, Some(self.remaining)),
        }
    }
}

impl<V, R, S> FusedIterator for NextEntries<'_, V, R, S>
where
    V: Clone + Send + Sync + 'static,
    R: HistoricalReader<V>,
    S: HistoricalStore<V>,
{
}

/// Lazy forward scan over values, see [`NextEntries`].
#[derive(Debug)]
pub struct NextValues<'a, V, R, S>(NextEntries<'a, V, R, S>);

impl<V, R, S> Iterator for NextValues<'_, V, R, S>
where
    V: Clone + Send + Sync + 'static,
    R: HistoricalReader<V>,
    S: HistoricalStore<V>,
{
    type Item = Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|entry| entry.map(|(_, value)| value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<V, R, S> FusedIterator for NextValues<'_, V, R, S>
where
    V: Clone + Send + Sync + 'static,
    R: HistoricalReader<V>,
    S: HistoricalStore<V>,
{
}

/// Lazy forward scan over keys, see [`NextEntries`].
#[derive(Debug)]
pub struct NextKeys<'a, V, R, S>(NextEntries<'a, V, R, S>);

impl<V, R, S> Iterator for NextKeys<'_, V, R, S>
where
    V: Clone + Send + Sync + 'static,
    R: HistoricalReader<V>,
    S: HistoricalStore<V>,
{
    type Item = Result<Key>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|entry| entry.map(|(key, _)| key))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<V, R, S> FusedIterator for NextKeys<'_, V, R, S>
where
    V: Clone + Send + Sync + 'static,
    R: HistoricalReader<V>,
    S: HistoricalStore<V>,
{
}
