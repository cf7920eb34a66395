// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured log events for cache and adjuster activity.
//!
//! Events are emitted through `tracing` when the `logs` feature is enabled
//! and compile away otherwise.

use crate::Key;

#[cfg(all(test, feature = "logs"))]
pub(crate) const CACHE_NAME: &str = "cache.name";
#[cfg(all(test, feature = "logs"))]
pub(crate) const CACHE_ACTIVITY_NAME: &str = "cache.activity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    RangeLoad,
    EvictionRecovery,
    MaximumSizeIncreased,
    BoundsRefreshed,
    Cleared,
}

impl CacheActivity {
    #[cfg_attr(not(any(feature = "logs", test)), expect(dead_code, reason = "only consulted when logging"))]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RangeLoad => "cache.range_load",
            Self::EvictionRecovery => "cache.eviction_recovery",
            Self::MaximumSizeIncreased => "cache.maximum_size_increased",
            Self::BoundsRefreshed => "cache.bounds_refreshed",
            Self::Cleared => "cache.cleared",
        }
    }

    #[cfg_attr(not(feature = "logs"), expect(dead_code, reason = "only consulted when logging"))]
    fn is_notable(self) -> bool {
        matches!(self, Self::EvictionRecovery | Self::MaximumSizeIncreased)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrontierActivity {
    Discovered,
    Advanced,
}

impl FrontierActivity {
    #[cfg_attr(not(any(feature = "logs", test)), expect(dead_code, reason = "only consulted when logging"))]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "frontier.discovered",
            Self::Advanced => "frontier.advanced",
        }
    }
}

/// Records a cache activity for `key` along with an activity-specific count.
///
/// For range loads the count is the number of loaded values; for size
/// increases it is the new budget.
#[cfg_attr(not(feature = "logs"), expect(unused_variables, reason = "events compile away without logging"))]
pub(crate) fn record(cache_name: &'static str, activity: CacheActivity, key: Key, count: u64) {
    #[cfg(feature = "logs")]
    {
        let activity_name = activity.as_str();
        let key = key.as_millis();

        // Tracing level must be constant, so we use a macro to select the appropriate level.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    cache.name = cache_name,
                    cache.activity = activity_name,
                    cache.key = key,
                    cache.count = count,
                    "cache.event"
                )
            };
        }

        if activity.is_notable() {
            emit_event!(info);
        } else {
            emit_event!(debug);
        }
    }
}

/// Records a frontier change of the adjuster identified by `adjuster_id`.
#[cfg_attr(not(feature = "logs"), expect(unused_variables, reason = "events compile away without logging"))]
pub(crate) fn record_frontier(adjuster_id: u64, activity: FrontierActivity, frontier: Key, evicted: usize) {
    #[cfg(feature = "logs")]
    tracing::debug!(
        adjuster.id = adjuster_id,
        adjuster.activity = activity.as_str(),
        adjuster.frontier = frontier.as_millis(),
        adjuster.evicted = evicted,
        "adjuster.event"
    );
}

/// Records that the frontier probe failed; keys pass through unclipped.
#[cfg_attr(not(feature = "logs"), expect(unused_variables, reason = "events compile away without logging"))]
pub(crate) fn record_probe_failure(adjuster_id: u64, error: &crate::Error) {
    #[cfg(feature = "logs")]
    tracing::warn!(adjuster.id = adjuster_id, error = %error, "frontier probe failed");
}
