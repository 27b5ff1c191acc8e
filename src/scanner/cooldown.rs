//! Alert dedup cache.

use std::collections::HashMap;

use time::{Duration, OffsetDateTime};

/// Suppresses repeat alerts for the same opportunity within a window.
///
/// Entries expire lazily on lookup; [`purge`](Self::purge) drops the rest.
#[derive(Debug, Clone)]
pub struct CooldownCache {
    window: Duration,
    expiries: HashMap<String, OffsetDateTime>,
}

impl CooldownCache {
    /// Cache with the given suppression window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            expiries: HashMap::new(),
        }
    }

    /// Whether `key` is suppressed at `now`.
    pub fn is_cooling(&self, key: &str, now: OffsetDateTime) -> bool {
        self.expiries.get(key).is_some_and(|expiry| *expiry > now)
    }

    /// Register `key` unless it is still cooling down.
    ///
    /// Returns `true` when the caller should emit.
    pub fn try_register(&mut self, key: &str, now: OffsetDateTime) -> bool {
        if self.is_cooling(key, now) {
            return false;
        }
        self.expiries.insert(key.to_string(), now + self.window);
        true
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge(&mut self, now: OffsetDateTime) -> usize {
        let before = self.expiries.len();
        self.expiries.retain(|_, expiry| *expiry > now);
        before - self.expiries.len()
    }

    /// Number of tracked keys, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    /// No keys tracked.
    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }
}
