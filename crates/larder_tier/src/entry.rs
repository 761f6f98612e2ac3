// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::ops::Deref;
use std::time::{Duration, Instant};

/// A cached value with its expiry and recency metadata.
///
/// An entry without an expiry never expires. An entry is expired once "now" reaches its
/// expiry instant; expired entries are never handed out and are removed the next time they
/// are touched.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
///
/// use larder_tier::CacheEntry;
///
/// let now = Instant::now();
/// let entry = CacheEntry::with_ttl("data", now, Duration::from_secs(60));
///
/// assert!(!entry.is_expired(now));
/// assert!(entry.is_expired(now + Duration::from_secs(60)));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
    last_accessed_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Creates an entry that never expires, accessed at `now`.
    pub fn new(value: V, now: Instant) -> Self {
        Self {
            value,
            expires_at: None,
            last_accessed_at: now,
        }
    }

    /// Creates an entry that expires `ttl` after `now`.
    ///
    /// A TTL too large to be represented as an instant means the entry never expires.
    pub fn with_ttl(value: V, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: now.checked_add(ttl),
            last_accessed_at: now,
        }
    }

    /// Creates an entry with an explicit expiry instant.
    pub fn with_expiry(value: V, now: Instant, expires_at: Option<Instant>) -> Self {
        Self {
            value,
            expires_at,
            last_accessed_at: now,
        }
    }

    /// Returns a reference to the cached value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the entry and returns the inner value.
    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }

    /// Returns the instant this entry expires at, `None` if it never expires.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Returns the instant of the last read or write of this entry.
    #[must_use]
    pub fn last_accessed_at(&self) -> Instant {
        self.last_accessed_at
    }

    /// Returns `true` if the entry has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Returns the time left before expiry, `None` if the entry never expires.
    #[must_use]
    pub fn remaining_ttl(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|expires_at| expires_at.saturating_duration_since(now))
    }

    /// Records an access at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.last_accessed_at = now;
    }
}

impl<V> Deref for CacheEntry<V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}
