// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock cache implementation for testing.
//!
//! This module provides `MockCache`, a configurable in-memory cache that records all operations
//! and supports failure injection for testing error and fallback paths.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{CacheTier, Error};

/// Recorded cache operation with full context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp<K, V> {
    /// A get operation was performed with the given key.
    Get(K),
    /// A set operation was performed.
    Set {
        /// The key that was written.
        key: K,
        /// The value that was written.
        value: V,
        /// The TTL requested by the caller.
        ttl: Option<Duration>,
    },
    /// A delete operation was performed with the given key.
    Delete(K),
    /// A has operation was performed with the given key.
    Has(K),
    /// A clear operation was performed.
    Clear,
}

type FailPredicate<K, V> = Box<dyn Fn(&CacheOp<K, V>) -> bool + Send + Sync>;

/// A configurable mock cache for testing.
///
/// Values are stored in memory without expiry; requested TTLs are only recorded. Failing
/// operations return an [`Error::unavailable`] error, the same kind a network tier reports
/// when it cannot be reached.
///
/// # Examples
///
/// ```
/// use larder_tier::CacheTier;
/// use larder_tier::testing::{CacheOp, MockCache};
///
/// # futures::executor::block_on(async {
/// let cache = MockCache::<String, i32>::new();
///
/// cache.set(&"key".to_string(), 42, None).await.unwrap();
/// assert_eq!(cache.get(&"key".to_string()).await.unwrap(), Some(42));
///
/// cache.fail_when(|op| matches!(op, CacheOp::Get(k) if k == "forbidden"));
/// assert!(cache.get(&"forbidden".to_string()).await.is_err());
/// # });
/// ```
pub struct MockCache<K, V> {
    data: Arc<Mutex<HashMap<K, V>>>,
    operations: Arc<Mutex<Vec<CacheOp<K, V>>>>,
    fail_when: Arc<Mutex<Option<FailPredicate<K, V>>>>,
}

impl<K, V> std::fmt::Debug for MockCache<K, V>
where
    K: std::fmt::Debug,
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCache")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl<K, V> Clone for MockCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
        }
    }
}

impl<K, V> Default for MockCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MockCache<K, V> {
    /// Creates a new empty mock cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }
}

impl<K, V> MockCache<K, V>
where
    K: Eq + Hash,
{
    /// Returns the number of entries in the cache.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns true if the cache contains the given key.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.data.lock().contains_key(key)
    }
}

impl<K, V> MockCache<K, V>
where
    K: Clone,
    V: Clone,
{
    /// Sets a predicate that determines which operations fail.
    ///
    /// Failed operations are still recorded.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&CacheOp<K, V>) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<CacheOp<K, V>> {
        self.operations.lock().clone()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn record(&self, op: CacheOp<K, V>) -> Result<(), Error> {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        let name = match &op {
            CacheOp::Get(_) => "get",
            CacheOp::Set { .. } => "set",
            CacheOp::Delete(_) => "delete",
            CacheOp::Has(_) => "has",
            CacheOp::Clear => "clear",
        };
        self.operations.lock().push(op);

        if fail {
            Err(Error::unavailable(format!("mock: {name} failed")))
        } else {
            Ok(())
        }
    }
}

impl<K, V> CacheTier<K, V> for MockCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Result<Option<V>, Error> {
        self.record(CacheOp::Get(key.clone()))?;
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set(&self, key: &K, value: V, ttl: Option<Duration>) -> Result<(), Error> {
        self.record(CacheOp::Set {
            key: key.clone(),
            value: value.clone(),
            ttl,
        })?;
        self.data.lock().insert(key.clone(), value);
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<(), Error> {
        self.record(CacheOp::Delete(key.clone()))?;
        self.data.lock().remove(key);
        Ok(())
    }

    async fn has(&self, key: &K) -> Result<bool, Error> {
        self.record(CacheOp::Has(key.clone()))?;
        Ok(self.data.lock().contains_key(key))
    }

    async fn clear(&self) -> Result<(), Error> {
        self.record(CacheOp::Clear)?;
        self.data.lock().clear();
        Ok(())
    }

    fn len(&self) -> Option<u64> {
        Some(self.data.lock().len() as u64)
    }
}
