// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Adaptive read-back step and size budget.

use std::time::Duration;

use crate::Key;

/// Read-back step used until the first range load has been observed.
pub const DEFAULT_READ_BACK_STEP: Duration = Duration::from_secs(10 * 24 * 60 * 60);

/// Lower bound for the read-back step.
pub const DEFAULT_MIN_READ_BACK_STEP: Duration = Duration::from_secs(1);

/// Number of successive evictions that doubles the size budget.
pub const DEFAULT_EVICTION_THRESHOLD: u32 = 3;

/// Tunes how far back a range load starts and how many entries the store
/// should hold.
///
/// The estimator starts pessimistic: the first range load narrows the step to
/// the span the load actually covered, and later loads that cover much less
/// than the step narrow it further, halfway at a time. The size budget only
/// grows, either when a single load returns more values than the budget, or
/// when the cache keeps reloading values that the store evicted nearby.
///
/// # Examples
///
/// ```
/// use histocache::ReadBackEstimator;
/// use std::time::Duration;
///
/// let mut estimator = ReadBackEstimator::new(Some(100));
/// assert_eq!(estimator.observe_load(Duration::from_secs(60), 10), None);
/// assert_eq!(estimator.optimal_read_back_step(), Duration::from_secs(60));
///
/// // A single batch larger than the budget grows it.
/// assert_eq!(estimator.observe_load(Duration::from_secs(60), 250), Some(250));
/// ```
#[derive(Debug, Clone)]
pub struct ReadBackEstimator {
    optimal_read_back_step: Duration,
    min_read_back_step: Duration,
    step_limited: bool,
    optimal_maximum_size: Option<u64>,
    eviction_threshold: u32,
    successive_evictions: u32,
    last_eviction_key: Option<Key>,
}

impl ReadBackEstimator {
    /// Creates an estimator with the default step, floor and threshold.
    ///
    /// `None` stands for an unbounded store whose budget never grows.
    #[must_use]
    pub fn new(initial_maximum_size: Option<u64>) -> Self {
        Self {
            optimal_read_back_step: DEFAULT_READ_BACK_STEP,
            min_read_back_step: DEFAULT_MIN_READ_BACK_STEP,
            step_limited: false,
            optimal_maximum_size: initial_maximum_size,
            eviction_threshold: DEFAULT_EVICTION_THRESHOLD,
            successive_evictions: 0,
            last_eviction_key: None,
        }
    }

    /// Sets the step used before the first load is observed.
    #[must_use]
    pub fn with_read_back_step(mut self, step: Duration) -> Self {
        self.optimal_read_back_step = step.max(self.min_read_back_step);
        self
    }

    /// Sets the floor the step never goes below.
    #[must_use]
    pub fn with_min_read_back_step(mut self, floor: Duration) -> Self {
        self.min_read_back_step = floor;
        self.optimal_read_back_step = self.optimal_read_back_step.max(floor);
        self
    }

    /// Sets how many successive evictions double the size budget.
    ///
    /// Values below one are treated as one.
    #[must_use]
    pub fn with_eviction_threshold(mut self, threshold: u32) -> Self {
        self.eviction_threshold = threshold.max(1);
        self
    }

    /// Returns how far before a requested key the next range load starts.
    #[must_use]
    pub fn optimal_read_back_step(&self) -> Duration {
        self.optimal_read_back_step
    }

    /// Returns the size budget the store should have, or `None` when unbounded.
    #[must_use]
    pub fn optimal_maximum_size(&self) -> Option<u64> {
        self.optimal_maximum_size
    }

    /// Learns from a successful range load covering `span` with `count` values.
    ///
    /// Returns the new size budget when the load outgrew the current one.
    pub fn observe_load(&mut self, span: Duration, count: usize) -> Option<u64> {
        if !span.is_zero() {
            if !self.step_limited {
                self.optimal_read_back_step = self.optimal_read_back_step.min(span).max(self.min_read_back_step);
                self.step_limited = true;
            } else if span < self.optimal_read_back_step / 2 {
                let halfway = span + (self.optimal_read_back_step - span) / 2;
                self.optimal_read_back_step = halfway.max(self.min_read_back_step);
            }
        }

        let count = u64::try_from(count).unwrap_or(u64::MAX);
        match self.optimal_maximum_size {
            Some(optimal) if count > optimal => {
                self.optimal_maximum_size = Some(count);
                Some(count)
            }
            _ => None,
        }
    }

    /// Records that the store evicted a value the cache had to reload for `key`.
    ///
    /// Evictions within one read-back step of the previous one are successive.
    /// Once the threshold is reached the budget doubles (relative to the larger
    /// of the budget and `current_len`) and the new budget is returned.
    pub fn check_successive_cache_evictions(&mut self, key: Key, current_len: usize) -> Option<u64> {
        let step_millis = self.optimal_read_back_step.as_millis();
        let successive = self
            .last_eviction_key
            .is_some_and(|previous| u128::from(previous.as_millis().abs_diff(key.as_millis())) <= step_millis);
        self.last_eviction_key = Some(key);
        self.successive_evictions = if successive { self.successive_evictions + 1 } else { 1 };

        if self.successive_evictions < self.eviction_threshold {
            return None;
        }
        self.successive_evictions = 0;

        let optimal = self.optimal_maximum_size?;
        let current_len = u64::try_from(current_len).unwrap_or(u64::MAX);
        let grown = optimal.max(current_len).saturating_mul(2);
        self.optimal_maximum_size = Some(grown);
        Some(grown)
    }

    /// Keeps the budget in sync when the store was grown for another reason.
    pub fn increase_maximum_size(&mut self, maximum_size: u64) {
        if let Some(optimal) = self.optimal_maximum_size.as_mut() {
            *optimal = (*optimal).max(maximum_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    #[test]
    fn first_load_limits_step_to_span() {
        let mut estimator = ReadBackEstimator::new(None);
        assert_eq!(estimator.optimal_read_back_step(), DEFAULT_READ_BACK_STEP);
        estimator.observe_load(secs(3600), 5);
        assert_eq!(estimator.optimal_read_back_step(), secs(3600));
    }

    #[test]
    fn first_load_never_widens_step() {
        let mut estimator = ReadBackEstimator::new(None).with_read_back_step(secs(10));
        estimator.observe_load(secs(1000), 5);
        assert_eq!(estimator.optimal_read_back_step(), secs(10));
    }

    #[test]
    fn zero_span_is_ignored() {
        let mut estimator = ReadBackEstimator::new(None);
        estimator.observe_load(Duration::ZERO, 1);
        assert_eq!(estimator.optimal_read_back_step(), DEFAULT_READ_BACK_STEP);
        estimator.observe_load(secs(50), 1);
        assert_eq!(estimator.optimal_read_back_step(), secs(50));
    }

    #[test]
    fn later_small_spans_move_halfway() {
        let mut estimator = ReadBackEstimator::new(None);
        estimator.observe_load(secs(100), 1);
        estimator.observe_load(secs(60), 1);
        assert_eq!(estimator.optimal_read_back_step(), secs(100), "not below half");
        estimator.observe_load(secs(20), 1);
        assert_eq!(estimator.optimal_read_back_step(), secs(60));
    }

    #[test]
    fn step_respects_floor() {
        let mut estimator = ReadBackEstimator::new(None).with_min_read_back_step(secs(30));
        estimator.observe_load(Duration::from_millis(5), 1);
        assert_eq!(estimator.optimal_read_back_step(), secs(30));
    }

    #[test]
    fn large_batch_grows_budget() {
        let mut estimator = ReadBackEstimator::new(Some(10));
        assert_eq!(estimator.observe_load(secs(1), 10), None);
        assert_eq!(estimator.observe_load(secs(1), 11), Some(11));
        assert_eq!(estimator.optimal_maximum_size(), Some(11));
    }

    #[test]
    fn unbounded_never_grows() {
        let mut estimator = ReadBackEstimator::new(None).with_eviction_threshold(1);
        assert_eq!(estimator.observe_load(secs(1), 1_000), None);
        assert_eq!(estimator.check_successive_cache_evictions(Key::from_millis(1), 5), None);
        assert_eq!(estimator.optimal_maximum_size(), None);
    }

    #[test]
    fn successive_evictions_double_budget() {
        let mut estimator = ReadBackEstimator::new(Some(10)).with_read_back_step(secs(1));
        assert_eq!(estimator.check_successive_cache_evictions(Key::from_millis(0), 4), None);
        assert_eq!(estimator.check_successive_cache_evictions(Key::from_millis(500), 4), None);
        assert_eq!(estimator.check_successive_cache_evictions(Key::from_millis(900), 25), Some(50));
        assert_eq!(estimator.check_successive_cache_evictions(Key::from_millis(950), 25), None, "counter reset");
    }

    #[test]
    fn distant_evictions_restart_count() {
        let mut estimator = ReadBackEstimator::new(Some(10)).with_read_back_step(secs(1));
        estimator.check_successive_cache_evictions(Key::from_millis(0), 0);
        estimator.check_successive_cache_evictions(Key::from_millis(500), 0);
        assert_eq!(estimator.check_successive_cache_evictions(Key::from_millis(90_000), 0), None);
        assert_eq!(estimator.optimal_maximum_size(), Some(10));
    }

    #[test]
    fn external_increase_is_tracked() {
        let mut estimator = ReadBackEstimator::new(Some(10));
        estimator.increase_maximum_size(40);
        estimator.increase_maximum_size(20);
        assert_eq!(estimator.optimal_maximum_size(), Some(40));
    }
}
