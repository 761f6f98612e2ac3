// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Dynamic cache tier wrapper for type erasure.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::tier::DynCacheTier;
use crate::{CacheTier, Error};

/// Extension trait for converting any `CacheTier` into a `DynamicCache`.
///
/// This trait is automatically implemented for all types that implement `CacheTier`.
///
/// # Examples
///
/// ```
/// use larder_tier::{CacheTier, DynamicCache, DynamicCacheExt};
///
/// fn erase<T>(tier: T) -> DynamicCache<String, i32>
/// where
///     T: CacheTier<String, i32> + 'static,
/// {
///     tier.into_dynamic()
/// }
/// ```
pub trait DynamicCacheExt<K, V>: Sized {
    /// Converts this cache tier into a `DynamicCache`.
    fn into_dynamic(self) -> DynamicCache<K, V>;
}

impl<K, V, T> DynamicCacheExt<K, V> for T
where
    T: CacheTier<K, V> + 'static,
{
    fn into_dynamic(self) -> DynamicCache<K, V> {
        DynamicCache::new(self)
    }
}

/// A clonable cache tier with type erasure.
///
/// `DynamicCache` wraps a trait object in an `Arc`, so every clone operates on the same
/// underlying tier. Use it to hold a tier chosen at runtime without leaking its concrete type
/// into the signatures of the code that uses it.
pub struct DynamicCache<K, V>(Arc<DynCacheTier<'static, K, V>>);

impl<K, V> DynamicCache<K, V> {
    /// Creates a new dynamic cache from any `CacheTier` implementation.
    pub fn new<T>(tier: T) -> Self
    where
        T: CacheTier<K, V> + 'static,
    {
        Self(DynCacheTier::new_arc(tier))
    }
}

impl<K, V> Debug for DynamicCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicCache").finish_non_exhaustive()
    }
}

impl<K, V> Clone for DynamicCache<K, V> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<K, V> CacheTier<K, V> for DynamicCache<K, V>
where
    K: Sync,
    V: Send,
{
    async fn get(&self, key: &K) -> Result<Option<V>, Error> {
        self.0.get(key).await
    }

    async fn set(&self, key: &K, value: V, ttl: Option<Duration>) -> Result<(), Error> {
        self.0.set(key, value, ttl).await
    }

    async fn delete(&self, key: &K) -> Result<(), Error> {
        self.0.delete(key).await
    }

    async fn has(&self, key: &K) -> Result<bool, Error> {
        self.0.has(key).await
    }

    async fn clear(&self) -> Result<(), Error> {
        self.0.clear().await
    }

    fn len(&self) -> Option<u64> {
        self.0.len()
    }

    fn is_empty(&self) -> Option<bool> {
        self.0.is_empty()
    }
}
