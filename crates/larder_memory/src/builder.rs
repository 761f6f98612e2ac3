// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring local caches.

use std::hash::Hash;
use std::marker::PhantomData;
use std::time::Duration;

use tick::Clock;

use crate::tier::LocalCache;

/// Capacity used when [`LocalCacheBuilder::capacity`] is not called.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Builder for configuring a [`LocalCache`].
///
/// Configuration is immutable once the cache is built.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use larder_memory::LocalCache;
/// use tick::Clock;
///
/// let cache = LocalCache::<String, i32>::builder(Clock::new_frozen())
///     .capacity(500)
///     .default_ttl(Duration::from_secs(300))
///     .name("summaries")
///     .build();
///
/// assert_eq!(cache.capacity(), 500);
/// ```
#[derive(Debug)]
pub struct LocalCacheBuilder<K, V> {
    pub(crate) capacity: usize,
    pub(crate) default_ttl: Option<Duration>,
    pub(crate) name: Option<String>,
    pub(crate) clock: Clock,
    _phantom: PhantomData<(K, V)>,
}

impl<K, V> LocalCacheBuilder<K, V> {
    /// Creates a new builder with a capacity of [`DEFAULT_CAPACITY`] and no default TTL.
    ///
    /// The cache reads expiry and recency time from `clock`.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            default_ttl: None,
            name: None,
            clock,
            _phantom: PhantomData,
        }
    }

    /// Sets the maximum number of entries.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the TTL applied when `set` is called without one.
    ///
    /// Without a default TTL, such entries never expire and leave only through eviction.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Sets a name for the cache, used in log events.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the configured [`LocalCache`].
    #[must_use]
    pub fn build(self) -> LocalCache<K, V>
    where
        K: Hash + Eq + Clone,
    {
        LocalCache::from_builder(self)
    }
}
