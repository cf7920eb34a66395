// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display};
use std::time::{Duration, SystemTime};

/// A millisecond-resolution timestamp that orders historical values.
///
/// Keys are totally ordered and support signed millisecond offsets. All
/// arithmetic saturates at [`Key::MIN`] and [`Key::MAX`], so reading back a
/// long duration from an early key never wraps around.
///
/// # Examples
///
/// ```
/// use histocache_tier::Key;
/// use std::time::Duration;
///
/// let key = Key::from_millis(1_000);
/// assert_eq!(key.add_millis(-250), Key::from_millis(750));
/// assert_eq!(key.saturating_sub(Duration::from_secs(1)), Key::from_millis(0));
/// assert_eq!(Key::MIN.add_millis(-1), Key::MIN);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(i64);

impl Key {
    /// The earliest representable key.
    pub const MIN: Self = Self(i64::MIN);

    /// The latest representable key.
    pub const MAX: Self = Self(i64::MAX);

    /// Creates a key from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Shifts the key by a signed number of milliseconds.
    #[must_use]
    pub const fn add_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Moves the key `duration` into the past.
    #[must_use]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        self.add_millis(-duration_millis(duration))
    }

    /// Moves the key `duration` into the future.
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        self.add_millis(duration_millis(duration))
    }

    /// Returns the time elapsed from `earlier` to `self`, or zero if `earlier` is later.
    #[must_use]
    pub fn duration_since(self, earlier: Self) -> Duration {
        let millis = self.0.saturating_sub(earlier.0);
        u64::try_from(millis).map_or(Duration::ZERO, Duration::from_millis)
    }

    /// Converts a system time into a key, truncating to whole milliseconds.
    #[must_use]
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(after) => Self(duration_millis(after)),
            Err(before) => Self(-duration_millis(before.duration())),
        }
    }

    /// Converts the key into a system time.
    #[must_use]
    pub fn to_system_time(self) -> SystemTime {
        let offset = Duration::from_millis(self.0.unsigned_abs());
        if self.0 >= 0 {
            SystemTime::UNIX_EPOCH + offset
        } else {
            SystemTime::UNIX_EPOCH - offset
        }
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl From<i64> for Key {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

impl From<Key> for i64 {
    fn from(key: Key) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_millis() {
        assert!(Key::from_millis(-5) < Key::from_millis(3));
        assert!(Key::MIN < Key::from_millis(i64::MIN + 1));
        assert!(Key::MAX > Key::from_millis(0));
    }

    #[test]
    fn offsets_saturate() {
        assert_eq!(Key::MAX.add_millis(1), Key::MAX);
        assert_eq!(Key::from_millis(5).saturating_sub(Duration::MAX), Key::from_millis(5 - i64::MAX));
        assert_eq!(Key::from_millis(0).saturating_add(Duration::from_millis(7)), Key::from_millis(7));
    }

    #[test]
    fn duration_since_is_never_negative() {
        let early = Key::from_millis(10);
        let late = Key::from_millis(40);
        assert_eq!(late.duration_since(early), Duration::from_millis(30));
        assert_eq!(early.duration_since(late), Duration::ZERO);
    }

    #[test]
    fn system_time_round_trips_on_both_sides_of_epoch() {
        for millis in [-1_500, 0, 1_700_000_000_123] {
            let key = Key::from_millis(millis);
            assert_eq!(Key::from_system_time(key.to_system_time()), key);
        }
    }

    #[test]
    fn display_uses_millis_suffix() {
        assert_eq!(Key::from_millis(42).to_string(), "42ms");
    }
}
