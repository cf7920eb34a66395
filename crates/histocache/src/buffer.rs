// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Ordered append-and-drain queue.

use std::collections::VecDeque;
use std::collections::vec_deque;

/// An append-and-drain queue with constant-time access to both ends.
///
/// Gap caches keep their lookahead window and their ring of recently consumed
/// values in buffered sequences. The sequence itself does not check ordering;
/// callers verify it before handing values over.
///
/// # Examples
///
/// ```
/// use histocache::BufferedSequence;
///
/// let mut seq: BufferedSequence<u32> = [1, 2].into_iter().collect();
/// assert!(seq.consume([3, 4]));
/// assert!(!seq.consume([]));
///
/// assert_eq!(seq.head(), Some(&1));
/// assert_eq!(seq.tail(), Some(&4));
/// assert_eq!(seq.pop_head(), Some(1));
/// assert_eq!(seq.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedSequence<V> {
    values: VecDeque<V>,
}

impl<V> Default for BufferedSequence<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> BufferedSequence<V> {
    /// Creates an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self { values: VecDeque::new() }
    }

    /// Returns the number of buffered values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the oldest buffered value.
    #[must_use]
    pub fn head(&self) -> Option<&V> {
        self.values.front()
    }

    /// Returns the newest buffered value.
    #[must_use]
    pub fn tail(&self) -> Option<&V> {
        self.values.back()
    }

    /// Appends one value.
    pub fn push(&mut self, value: V) {
        self.values.push_back(value);
    }

    /// Removes and returns the oldest value.
    pub fn pop_head(&mut self) -> Option<V> {
        self.values.pop_front()
    }

    /// Appends every value of `values`, returning `true` if at least one was added.
    pub fn consume(&mut self, values: impl IntoIterator<Item = V>) -> bool {
        let before = self.values.len();
        self.values.extend(values);
        self.values.len() > before
    }

    /// Drops every buffered value.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Iterates from head to tail without draining.
    pub fn iter(&self) -> vec_deque::Iter<'_, V> {
        self.values.iter()
    }
}

impl<V> FromIterator<V> for BufferedSequence<V> {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<V> Extend<V> for BufferedSequence<V> {
    fn extend<I: IntoIterator<Item = V>>(&mut self, iter: I) {
        self.values.extend(iter);
    }
}

impl<'a, V> IntoIterator for &'a BufferedSequence<V> {
    type Item = &'a V;
    type IntoIter = vec_deque::Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
