// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `HistoricalStore` trait default implementations.

use histocache_tier::{HistoricalStore, Key};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Minimal implementation that only provides required methods
struct MinimalStore<V> {
    data: Mutex<BTreeMap<Key, V>>,
}

impl<V> MinimalStore<V> {
    fn new() -> Self {
        Self {
            data: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<V: Clone + Send> HistoricalStore<V> for MinimalStore<V> {
    fn get(&self, key: &Key) -> Option<V> {
        self.data.lock().expect("lock poisoned").get(key).cloned()
    }

    fn put(&self, key: Key, value: V) {
        self.data.lock().expect("lock poisoned").insert(key, value);
    }

    fn remove(&self, key: &Key) {
        self.data.lock().expect("lock poisoned").remove(key);
    }

    fn len(&self) -> usize {
        self.data.lock().expect("lock poisoned").len()
    }

    fn clear(&self) {
        self.data.lock().expect("lock poisoned").clear();
    }
}

#[test]
fn minimal_store_defaults_to_unbounded() {
    let store = MinimalStore::<u32>::new();
    assert_eq!(store.maximum_size(), None);
    store.increase_maximum_size(100);
    assert_eq!(store.maximum_size(), None);
}

#[test]
fn minimal_store_contains_key_uses_get() {
    let store = MinimalStore::new();
    let key = Key::from_millis(7);
    assert!(!store.contains_key(&key));
    store.put(key, "seven");
    assert!(store.contains_key(&key));
    store.remove(&key);
    assert!(!store.contains_key(&key));
}

#[test]
fn minimal_store_is_empty_uses_len() {
    let store = MinimalStore::new();
    assert!(store.is_empty());
    store.put(Key::from_millis(1), 1);
    store.put(Key::from_millis(2), 2);
    assert!(!store.is_empty());
    assert_eq!(store.len(), 2);
    store.clear();
    assert!(store.is_empty());
}

#[test]
fn arc_store_forwards_to_inner() {
    let inner = Arc::new(MinimalStore::new());
    let shared: Arc<dyn HistoricalStore<u32>> = inner.clone();
    shared.put(Key::from_millis(3), 30);
    assert_eq!(inner.get(&Key::from_millis(3)), Some(30));
    assert_eq!(HistoricalStore::len(&shared), 1);
}
