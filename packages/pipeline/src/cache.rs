//! Time-bounded memoization of refresh results.
//!
//! Entries are keyed by the producing function and a SHA-256 fingerprint of
//! its serialized input, and expire after a fixed TTL. The most recently
//! stored value is kept separately so a failed refresh can fall back to it.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Identifies one memoized computation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    /// Name of the producing function.
    pub function: &'static str,
    /// Hex SHA-256 of the serialized input.
    pub fingerprint: String,
}

impl CacheKey {
    /// Builds the key for calling `function` with `input`.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if `input` cannot be serialized.
    pub fn new<T: Serialize + ?Sized>(
        function: &'static str,
        input: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            function,
            fingerprint: fingerprint(input)?,
        })
    }
}

/// Hex SHA-256 of the JSON serialization of `value`.
///
/// # Errors
///
/// Returns [`serde_json::Error`] if `value` cannot be serialized.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(value)?);
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// TTL cache of refresh results.
#[derive(Debug, Clone)]
pub struct RefreshCache<V> {
    ttl: Duration,
    entries: BTreeMap<CacheKey, Entry<V>>,
    last: Option<V>,
}

impl<V: Clone> RefreshCache<V> {
    /// Creates an empty cache whose entries live for `ttl`.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: BTreeMap::new(),
            last: None,
        }
    }

    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the fresh value for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// [`Self::get`] evaluated at `now`.
    #[must_use]
    pub fn get_at(&self, key: &CacheKey, now: Instant) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| now.saturating_duration_since(entry.stored_at) < self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Stores `value` under `key` and records it as the last known value.
    pub fn insert(&mut self, key: CacheKey, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    /// [`Self::insert`] stamped at `now`.
    pub fn insert_at(&mut self, key: CacheKey, value: V, now: Instant) {
        self.last = Some(value.clone());
        self.entries.insert(
            key,
            Entry {
                value,
                stored_at: now,
            },
        );
    }

    /// Most recently stored value, expired or not.
    #[must_use]
    pub const fn last(&self) -> Option<&V> {
        self.last.as_ref()
    }

    /// Drops every entry so the next lookup misses. The last known value is
    /// kept.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Drops entries older than the TTL at `now`. Returns how many were
    /// removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.stored_at) < ttl);
        before - self.entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
