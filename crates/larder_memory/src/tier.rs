// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory cache tier implementation.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use larder_tier::{CacheEntry, CacheTier, Error};
use parking_lot::Mutex;
use tick::Clock;
use tracing::Level;

use crate::builder::LocalCacheBuilder;
use crate::store::{EntryStore, Inserted};

const DEFAULT_NAME: &str = "local";

/// An in-process cache tier with strict LRU eviction and lazy TTL expiry.
///
/// Clones share the same entries. All bookkeeping happens under a single short lock; no I/O
/// and no awaiting happens while it is held.
///
/// # Examples
///
/// ```
/// use larder_memory::LocalCache;
/// use larder_tier::CacheTier;
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let cache = LocalCache::<String, i32>::new(Clock::new_frozen(), 2);
///
/// cache.set(&"a".to_string(), 1, None).await.unwrap();
/// cache.set(&"b".to_string(), 2, None).await.unwrap();
/// cache.get(&"a".to_string()).await.unwrap();
/// cache.set(&"c".to_string(), 3, None).await.unwrap();
///
/// // "b" was the least recently accessed entry
/// assert!(!cache.has(&"b".to_string()).await.unwrap());
/// assert!(cache.has(&"a".to_string()).await.unwrap());
/// # });
/// ```
#[derive(Debug)]
pub struct LocalCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

#[derive(Debug)]
struct Inner<K, V> {
    store: Mutex<EntryStore<K, V>>,
    default_ttl: Option<Duration>,
    name: Option<String>,
    clock: Clock,
}

impl<K, V> Clone for LocalCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> LocalCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Creates a cache holding at most `capacity` entries, with no default TTL.
    #[must_use]
    pub fn new(clock: Clock, capacity: usize) -> Self {
        Self::builder(clock).capacity(capacity).build()
    }

    /// Creates a new builder for a local cache that reads time from `clock`.
    #[must_use]
    pub fn builder(clock: Clock) -> LocalCacheBuilder<K, V> {
        LocalCacheBuilder::new(clock)
    }

    pub(crate) fn from_builder(builder: LocalCacheBuilder<K, V>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(EntryStore::new(builder.capacity)),
                default_ttl: builder.default_ttl,
                name: builder.name,
                clock: builder.clock,
            }),
        }
    }

    /// Returns the maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.store.lock().capacity()
    }

    /// Returns the TTL applied when `set` is called without one.
    #[must_use]
    pub fn default_ttl(&self) -> Option<Duration> {
        self.inner.default_ttl
    }

    /// Returns the name used in log events.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name.as_deref().unwrap_or(DEFAULT_NAME)
    }

    /// Removes every expired entry now and returns how many were removed.
    ///
    /// Expired entries are never returned either way; sweeping only releases their capacity
    /// early.
    pub fn purge_expired(&self) -> usize {
        let now = self.inner.clock.instant();
        self.inner.store.lock().purge_expired(now)
    }

    fn new_entry(&self, value: V, ttl: Option<Duration>) -> CacheEntry<V> {
        let now = self.inner.clock.instant();
        match ttl.or(self.inner.default_ttl) {
            Some(ttl) => CacheEntry::with_ttl(value, now, ttl),
            None => CacheEntry::new(value, now),
        }
    }
}

impl<K, V> CacheTier<K, V> for LocalCache<K, V>
where
    K: Clone + Hash + Eq + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Result<Option<V>, Error> {
        let now = self.inner.clock.instant();
        Ok(self.inner.store.lock().get(key, now).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &K, value: V, ttl: Option<Duration>) -> Result<(), Error> {
        let entry = self.new_entry(value, ttl);
        let inserted = self.inner.store.lock().insert(key.clone(), entry);

        if let Inserted::Evicted(_) = inserted {
            tracing::event!(
                name: "larder.memory.evicted",
                Level::DEBUG,
                cache.name = self.name(),
                cache.capacity = self.capacity(),
            );
        }
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<(), Error> {
        self.inner.store.lock().remove(key);
        Ok(())
    }

    async fn has(&self, key: &K) -> Result<bool, Error> {
        let now = self.inner.clock.instant();
        Ok(self.inner.store.lock().contains_live(key, now))
    }

    async fn clear(&self) -> Result<(), Error> {
        self.inner.store.lock().clear();
        Ok(())
    }

    fn len(&self) -> Option<u64> {
        Some(self.inner.store.lock().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(LocalCache<String, Vec<u8>>: Send, Sync, Clone);

    #[test]
    fn clones_share_entries() {
        futures::executor::block_on(async {
            let cache = LocalCache::<String, i32>::new(Clock::new_frozen(), 4);
            let clone = cache.clone();

            cache.set(&"a".to_string(), 1, None).await.unwrap();

            assert_eq!(clone.get(&"a".to_string()).await.unwrap(), Some(1));
        });
    }

    #[test]
    fn name_defaults_to_local() {
        let cache = LocalCache::<String, i32>::new(Clock::new_frozen(), 1);
        assert_eq!(cache.name(), "local");
        assert!(cache.default_ttl().is_none());
    }
}
