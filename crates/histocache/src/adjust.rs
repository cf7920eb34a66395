// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Clipping keys to a dynamically discovered frontier.
//!
//! A [`KeyBoundAdjuster`] keeps consumers from seeing values above the
//! highest allowed key, for example to stop a backtest from reading data
//! that lies in its simulated future. The frontier is discovered lazily via
//! a [`FrontierProbe`] and only ever moves forward.
//!
//! Probes frequently answer by querying historical caches that are adjusted
//! themselves. Instead of thread-local state, the call carries an
//! [`AdjustContext`]: inside a probe the context is nested, and a nested
//! adjustment never recomputes the frontier. It returns the key unchanged
//! and remembers it for removal from the parent cache once the frontier
//! advances past it.

use std::fmt;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashSet;
use parking_lot::{Mutex, RwLock};

use crate::telemetry::{self, FrontierActivity};
use crate::{Key, Result};

static NEXT_ADJUSTER_ID: AtomicU64 = AtomicU64::new(1);

/// A cache that an adjuster can clear or evict from.
///
/// Adjusters hold registered caches weakly, so registering never keeps a
/// cache alive.
pub trait RegisteredCache: Send + Sync {
    /// Drops everything the cache holds.
    fn clear(&self);

    /// Evicts the entry stored under `key`, bypassing adjustment.
    fn remove(&self, key: Key);
}

/// Marks whether a call runs inside a frontier computation.
///
/// # Examples
///
/// ```
/// use histocache::AdjustContext;
///
/// let root = AdjustContext::root();
/// assert!(!root.is_adjusting());
/// assert!(root.nested().is_adjusting());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AdjustContext {
    adjusting: bool,
}

impl AdjustContext {
    /// A context outside any frontier computation.
    #[must_use]
    pub const fn root() -> Self {
        Self { adjusting: false }
    }

    /// The context a frontier probe runs in.
    #[must_use]
    pub const fn nested(self) -> Self {
        Self { adjusting: true }
    }

    /// Returns `true` inside a frontier computation.
    #[must_use]
    pub const fn is_adjusting(self) -> bool {
        self.adjusting
    }
}

/// Computes the current highest allowed key.
///
/// Returning `Ok(None)` means the frontier is not known yet. Probes receive
/// a nested context and should pass it on to any adjusted query they run.
///
/// Closures taking an [`AdjustContext`] implement this trait.
pub trait FrontierProbe: Send + Sync {
    /// Returns the highest key consumers may currently see.
    ///
    /// # Errors
    ///
    /// Returns an error when the frontier source is unavailable. The adjuster
    /// logs it and treats it like `Ok(None)`.
    fn highest_allowed_key(&self, ctx: AdjustContext) -> Result<Option<Key>>;
}

impl<F> FrontierProbe for F
where
    F: Fn(AdjustContext) -> Result<Option<Key>> + Send + Sync,
{
    fn highest_allowed_key(&self, ctx: AdjustContext) -> Result<Option<Key>> {
        self(ctx)
    }
}

/// A key tagged with the adjuster that already clipped it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdjustedKey {
    key: Key,
    adjuster_id: u64,
}

impl AdjustedKey {
    /// Returns the clipped key.
    #[must_use]
    pub fn key(self) -> Key {
        self.key
    }

    /// Returns the id of the adjuster that produced this key.
    #[must_use]
    pub fn adjuster_id(self) -> u64 {
        self.adjuster_id
    }
}

/// A query key that may or may not have been adjusted already.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// A key straight from the caller.
    Raw(Key),
    /// A key some adjuster has clipped.
    Adjusted(AdjustedKey),
}

impl From<Key> for QueryKey {
    fn from(key: Key) -> Self {
        Self::Raw(key)
    }
}

impl From<AdjustedKey> for QueryKey {
    fn from(key: AdjustedKey) -> Self {
        Self::Adjusted(key)
    }
}

/// Clips keys to a lazily discovered, forward-moving frontier.
///
/// # Examples
///
/// ```
/// use histocache::{AdjustContext, KeyBoundAdjuster, Key};
///
/// let adjuster = KeyBoundAdjuster::from_fn(|_ctx| Ok(Some(Key::from_millis(100))));
///
/// assert_eq!(adjuster.adjust_key(Key::from_millis(150)), Key::from_millis(100));
/// assert_eq!(adjuster.adjust_key(Key::from_millis(50)), Key::from_millis(50));
///
/// // Inside a probe the key is deferred instead of clipped.
/// let nested = AdjustContext::root().nested();
/// assert_eq!(adjuster.adjust_key_in(nested, Key::from_millis(150)), Key::from_millis(150));
/// assert_eq!(adjuster.pending_removals(), vec![Key::from_millis(150)]);
/// ```
pub struct KeyBoundAdjuster {
    id: u64,
    probe: Box<dyn FrontierProbe>,
    highest_allowed_key: RwLock<Option<Key>>,
    recompute: Mutex<()>,
    keys_to_remove: DashSet<Key>,
    caches_for_clear: Mutex<Vec<Weak<dyn RegisteredCache>>>,
    parent: RwLock<Option<Weak<dyn RegisteredCache>>>,
}

impl fmt::Debug for KeyBoundAdjuster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBoundAdjuster")
            .field("id", &self.id)
            .field("highest_allowed_key", &*self.highest_allowed_key.read())
            .field("pending_removals", &self.keys_to_remove.len())
            .field("registered_caches", &self.caches_for_clear.lock().len())
            .finish_non_exhaustive()
    }
}

impl KeyBoundAdjuster {
    /// Creates an adjuster whose frontier is computed by `probe`.
    pub fn new(probe: impl FrontierProbe + 'static) -> Self {
        Self {
            id: NEXT_ADJUSTER_ID.fetch_add(1, Ordering::Relaxed),
            probe: Box::new(probe),
            highest_allowed_key: RwLock::new(None),
            recompute: Mutex::new(()),
            keys_to_remove: DashSet::new(),
            caches_for_clear: Mutex::new(Vec::new()),
            parent: RwLock::new(None),
        }
    }

    /// Creates an adjuster whose frontier is computed by a closure.
    pub fn from_fn<F>(probe: F) -> Self
    where
        F: Fn(AdjustContext) -> Result<Option<Key>> + Send + Sync + 'static,
    {
        Self::new(probe)
    }

    /// Returns the process-unique id of this adjuster.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the frontier, probing once if it is not known yet.
    #[must_use]
    pub fn highest_allowed_key(&self) -> Option<Key> {
        self.highest_allowed_key_in(AdjustContext::root())
    }

    /// Returns the frontier as seen from `ctx`.
    ///
    /// A nested context never probes.
    #[must_use]
    pub fn highest_allowed_key_in(&self, ctx: AdjustContext) -> Option<Key> {
        match self.cached_highest_allowed_key() {
            None if !ctx.is_adjusting() => self.update_cached(ctx.nested()),
            cached => cached,
        }
    }

    /// Returns the last known frontier without probing.
    #[must_use]
    pub fn cached_highest_allowed_key(&self) -> Option<Key> {
        *self.highest_allowed_key.read()
    }

    /// Clips `key` down to the freshly probed frontier.
    #[must_use]
    pub fn adjust_key(&self, key: Key) -> Key {
        self.adjust_key_in(AdjustContext::root(), key)
    }

    /// Clips `key` as seen from `ctx`.
    ///
    /// In a root context the frontier is recomputed and a key above it is
    /// clipped. In a nested context the key is returned unchanged and, if it
    /// lies above the cached frontier, remembered for removal from the parent
    /// cache when the frontier next advances.
    #[must_use]
    pub fn adjust_key_in(&self, ctx: AdjustContext, key: Key) -> Key {
        if ctx.is_adjusting() {
            if self.cached_highest_allowed_key().is_some_and(|frontier| key > frontier) {
                self.keys_to_remove.insert(key);
            }
            return key;
        }

        match self.update_cached(ctx.nested()) {
            Some(frontier) if key > frontier => frontier,
            _ => key,
        }
    }

    /// Tags `key` as adjusted by this adjuster without clipping it.
    #[must_use]
    pub fn new_already_adjusted_key(&self, key: Key) -> AdjustedKey {
        AdjustedKey { key, adjuster_id: self.id }
    }

    /// Adjusts `key` unless this adjuster already did.
    #[must_use]
    pub fn maybe_adjust_key(&self, key: impl Into<QueryKey>) -> AdjustedKey {
        self.maybe_adjust_key_in(AdjustContext::root(), key)
    }

    /// Adjusts `key` as seen from `ctx` unless this adjuster already did.
    #[must_use]
    pub fn maybe_adjust_key_in(&self, ctx: AdjustContext, key: impl Into<QueryKey>) -> AdjustedKey {
        match key.into() {
            QueryKey::Adjusted(adjusted) if adjusted.adjuster_id == self.id => adjusted,
            QueryKey::Adjusted(AdjustedKey { key, .. }) | QueryKey::Raw(key) => {
                self.new_already_adjusted_key(self.adjust_key_in(ctx, key))
            }
        }
    }

    /// Sets the cache pending keys are evicted from.
    pub fn bind_parent(&self, parent: Weak<dyn RegisteredCache>) {
        *self.parent.write() = Some(parent);
    }

    pub(crate) fn bind_parent_if_unbound(&self, parent: Weak<dyn RegisteredCache>) -> bool {
        let mut current = self.parent.write();
        if current.as_ref().is_some_and(|existing| existing.strong_count() > 0) {
            return false;
        }
        *current = Some(parent);
        true
    }

    /// Arranges for `cache` to be cleared once the frontier is known.
    ///
    /// If the frontier is already known the cache is cleared right away.
    /// Returns `false` if the cache was already registered.
    pub fn register_historical_cache(&self, cache: Weak<dyn RegisteredCache>) -> bool {
        let _recompute = self.recompute.lock();
        if self.cached_highest_allowed_key().is_some() {
            if let Some(cache) = cache.upgrade() {
                cache.clear();
            }
            return true;
        }

        let mut caches = self.caches_for_clear.lock();
        caches.retain(|registered| registered.strong_count() > 0);
        if caches.iter().any(|registered| registered.ptr_eq(&cache)) {
            return false;
        }
        caches.push(cache);
        true
    }

    /// Drops pending removals and clears every registered cache.
    ///
    /// Registered caches are forgotten afterwards. The frontier is kept.
    pub fn clear(&self) {
        self.keys_to_remove.clear();
        let caches = std::mem::take(&mut *self.caches_for_clear.lock());
        for cache in caches.iter().filter_map(Weak::upgrade) {
            cache.clear();
        }
    }

    /// Returns the keys waiting for removal, in ascending order.
    #[must_use]
    pub fn pending_removals(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.keys_to_remove.iter().map(|key| *key).collect();
        keys.sort_unstable();
        keys
    }

    /// Probes and applies a forward move. A probe without an answer leaves
    /// the last known frontier in place; before discovery nothing is clipped.
    fn update_cached(&self, ctx: AdjustContext) -> Option<Key> {
        let probed = match self.probe.highest_allowed_key(ctx) {
            Ok(Some(frontier)) => frontier,
            Ok(None) => return self.cached_highest_allowed_key(),
            Err(error) => {
                telemetry::record_probe_failure(self.id, &error);
                return self.cached_highest_allowed_key();
            }
        };

        let _recompute = self.recompute.lock();
        let previous = self.cached_highest_allowed_key();
        let activity = match previous {
            None => FrontierActivity::Discovered,
            Some(previous) if probed > previous => FrontierActivity::Advanced,
            Some(previous) => return Some(previous),
        };

        if activity == FrontierActivity::Discovered {
            self.clear();
        }
        *self.highest_allowed_key.write() = Some(probed);
        let evicted = self.evict_pending();
        telemetry::record_frontier(self.id, activity, probed, evicted);
        Some(probed)
    }

    fn evict_pending(&self) -> usize {
        let keys = self.pending_removals();
        for key in &keys {
            self.keys_to_remove.remove(key);
        }

        let parent = self.parent.read().as_ref().and_then(Weak::upgrade);
        if let Some(parent) = parent {
            for key in &keys {
                parent.remove(*key);
            }
        }
        keys.len()
    }
}
