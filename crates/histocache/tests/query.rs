// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for forward scans.

use histocache::{ErrorKind, GapCache, Key, QueryInterceptor, Result};
use histocache_tier::testing::{MockReader, MockStore};

type TestResult = Result<()>;
type Value = (Key, u32);

fn key(millis: i64) -> Key {
    Key::from_millis(millis)
}

fn value(millis: i64) -> Value {
    (key(millis), u32::try_from(millis).expect("test keys are small"))
}

fn reader(keys: &[i64]) -> MockReader<Value> {
    MockReader::new(|v: &Value| v.0).with_values(keys.iter().copied().map(value))
}

#[test]
fn next_entries_yield_following_keys_in_order() -> TestResult {
    let cache = GapCache::builder(reader(&[10, 20, 30, 40])).store(MockStore::new()).build();
    let query = cache.query().with_future();

    let entries: Vec<(Key, Value)> = query.get_next_entries(key(10), 3)?.collect::<Result<_>>()?;
    assert_eq!(entries, vec![(key(20), value(20)), (key(30), value(30)), (key(40), value(40))]);

    let tail: Vec<Key> = query.get_next_keys(key(30), 3)?.collect::<Result<_>>()?;
    assert_eq!(tail, vec![key(40)], "only one entry follows");

    let none: Vec<Value> = query.get_next_values(key(40), 2)?.collect::<Result<_>>()?;
    assert!(none.is_empty());
    Ok(())
}

#[test]
fn sequential_scan_reuses_lookahead() -> TestResult {
    let cache = GapCache::builder(reader(&[10, 20, 30, 40, 50])).store(MockStore::new()).build();
    let query = cache.query().with_future();

    let keys: Vec<Key> = query.get_next_keys(key(0), 5)?.collect::<Result<_>>()?;
    assert_eq!(keys, [10, 20, 30, 40, 50].map(key));
    assert_eq!(cache.reader().range_reads(), 1);

    // Scanned entries are cached, so point lookups need no backend call.
    let calls = cache.reader().operations().len();
    assert_eq!(cache.get(key(30))?, Some(value(30)));
    assert_eq!(cache.reader().operations().len(), calls);
    Ok(())
}

#[test]
fn shift_picks_nth_following_entry() -> TestResult {
    let cache = GapCache::builder(reader(&[10, 20, 30, 40])).store(MockStore::new()).build();
    let query = cache.query().with_future();

    assert_eq!(query.get_next_entry(key(10), 1)?, Some((key(20), value(20))));
    assert_eq!(query.get_next_value(key(10), 3)?, Some(value(40)));
    assert_eq!(query.get_next_key(key(15), 2)?, Some(key(30)));
    assert_eq!(query.get_next_key(key(10), 4)?, None, "fewer than four entries follow");
    Ok(())
}

#[test]
fn zero_shift_is_invalid() {
    let cache = GapCache::builder(reader(&[10, 20])).store(MockStore::new()).build();
    let query = cache.query().with_future();

    let error = query.get_next_entry(key(10), 0).expect_err("zero shift");
    assert_eq!(error.kind(), ErrorKind::InvalidShift);
    let error = query.get_next_values(key(10), 0).expect_err("zero shift");
    assert_eq!(error.kind(), ErrorKind::InvalidShift);
}

struct Fixed;

impl QueryInterceptor<Value> for Fixed {
    fn next_entry(&self, key: Key, shift_units: usize) -> Option<Result<Option<(Key, Value)>>> {
        let millis = key.as_millis() + i64::try_from(shift_units).ok()?;
        Some(Ok(Some((Key::from_millis(millis), value(millis)))))
    }
}

#[test]
fn interceptor_answers_single_lookups() -> TestResult {
    let cache = GapCache::builder(reader(&[10, 20])).store(MockStore::new()).build();
    let query = cache.query().with_interceptor(&Fixed).with_future();

    assert_eq!(query.get_next_key(key(10), 5)?, Some(key(15)));
    assert!(cache.reader().operations().is_empty());

    // Scans are not intercepted by `Fixed`, so the cache answers them.
    let keys: Vec<Key> = query.get_next_keys(key(10), 1)?.collect::<Result<_>>()?;
    assert_eq!(keys, vec![key(20)]);
    Ok(())
}
