// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `InMemoryStore`.

use histocache_memory::{InMemoryStore, InMemoryStoreBuilder};
use histocache_tier::{HistoricalStore, Key};

fn key(millis: i64) -> Key {
    Key::from_millis(millis)
}

#[test]
fn new_creates_empty_unbounded_store() {
    let store = InMemoryStore::<i32>::new();
    assert!(store.is_empty());
    assert_eq!(store.maximum_size(), None);
}

#[test]
fn default_matches_new() {
    let store = InMemoryStore::<i32>::default();
    assert_eq!(store.len(), 0);
}

#[test]
fn builder_sets_capacity() {
    let store = InMemoryStoreBuilder::<i32>::new().max_capacity(50).initial_capacity(10).build();
    assert_eq!(store.maximum_size(), Some(50));
}

#[test]
fn put_get_remove() {
    let store = InMemoryStore::new();
    store.put(key(10), "ten");
    assert_eq!(store.get(&key(10)), Some("ten"));
    assert!(store.contains_key(&key(10)));

    store.remove(&key(10));
    assert_eq!(store.get(&key(10)), None);
    assert!(!store.contains_key(&key(10)));
}

#[test]
fn put_replaces_existing_value() {
    let store = InMemoryStore::new();
    store.put(key(1), 1);
    store.put(key(1), 2);
    assert_eq!(store.get(&key(1)), Some(2));
    assert_eq!(store.len(), 1);
}

#[test]
fn clear_removes_everything() {
    let store = InMemoryStore::new();
    for millis in 0..5 {
        store.put(key(millis), millis);
    }
    assert_eq!(store.len(), 5);

    store.clear();
    assert!(store.is_empty());
    assert_eq!(store.get(&key(3)), None);
}

#[test]
fn bounded_store_evicts_beyond_capacity() {
    let store = InMemoryStore::with_capacity(4);
    for millis in 0..32 {
        store.put(key(millis), millis);
    }
    assert!(store.len() <= 4, "len = {}", store.len());
}

#[test]
fn increase_maximum_size_keeps_entries() {
    let store = InMemoryStore::builder().max_capacity(8).name("resized").build();
    for millis in 0..3 {
        store.put(key(millis), millis);
    }

    store.increase_maximum_size(64);

    assert_eq!(store.maximum_size(), Some(64));
    for millis in 0..3 {
        assert_eq!(store.get(&key(millis)), Some(millis));
    }

    for millis in 3..40 {
        store.put(key(millis), millis);
    }
    assert_eq!(store.len(), 40);
}

#[test]
fn shared_through_arc() {
    let store: std::sync::Arc<dyn HistoricalStore<u8>> = std::sync::Arc::new(InMemoryStore::new());
    let other = std::sync::Arc::clone(&store);
    store.put(key(5), 5);
    assert_eq!(other.get(&key(5)), Some(5));
}
