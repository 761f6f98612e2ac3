// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Distributed cache tier implementation.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use larder_tier::{CacheTier, Error};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tick::Clock;
use tracing::Level;

use crate::health::{HealthSnapshot, RemoteHealth};
use crate::store::RemoteStore;

/// Namespace used when [`DistributedCacheBuilder::namespace`] is not called.
pub const DEFAULT_NAMESPACE: &str = "larder";

/// A cache tier backed by a [`RemoteStore`].
///
/// Values are encoded as JSON and stored under `"{namespace}:{key}"`. Expiry and eviction are
/// delegated to the store's native policy, so reads do not refresh recency.
///
/// Store failures are absorbed by default: through [`CacheTier`], a failed `get` or `has` is a
/// miss and a failed `set`, `delete` or `clear` is a no-op. Every failure is logged and recorded
/// in [`health`][Self::health]. The `try_*` methods always return the error; enable
/// [`propagate_errors`][DistributedCacheBuilder::propagate_errors] to make the [`CacheTier`]
/// methods do the same.
///
/// # Examples
///
/// ```
/// use larder_remote::DistributedCache;
/// use larder_remote::testing::FakeRemoteStore;
/// use larder_tier::CacheTier;
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let clock = Clock::new_frozen();
/// let store = FakeRemoteStore::new(clock.clone());
/// let cache = DistributedCache::<String, u32, _>::builder(store.clone(), clock)
///     .namespace("summaries")
///     .build();
///
/// cache.set(&"doc-1".to_string(), 42, None).await.unwrap();
/// assert_eq!(cache.get(&"doc-1".to_string()).await.unwrap(), Some(42));
///
/// store.set_available(false);
/// // the outage surfaces as a miss
/// assert_eq!(cache.get(&"doc-1".to_string()).await.unwrap(), None);
/// assert_eq!(cache.health().consecutive_failures, 1);
/// # });
/// ```
#[derive(Debug)]
pub struct DistributedCache<K, V, S> {
    inner: Arc<Inner<S>>,
    _marker: PhantomData<fn() -> (K, V)>,
}

#[derive(Debug)]
struct Inner<S> {
    store: S,
    namespace: String,
    default_ttl: Option<Duration>,
    propagate_errors: bool,
    health: RemoteHealth,
    clock: Clock,
}

impl<K, V, S> Clone for DistributedCache<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _marker: PhantomData,
        }
    }
}

impl<K, V, S> DistributedCache<K, V, S>
where
    K: AsRef<str>,
    V: Serialize + DeserializeOwned,
    S: RemoteStore,
{
    /// Creates a cache over `store` with the default namespace, no default TTL and error
    /// absorption. Failures are timestamped with `clock`.
    #[must_use]
    pub fn new(store: S, clock: Clock) -> Self {
        Self::builder(store, clock).build()
    }

    /// Creates a new builder for a cache over `store`.
    #[must_use]
    pub fn builder(store: S, clock: Clock) -> DistributedCacheBuilder<K, V, S> {
        DistributedCacheBuilder::new(store, clock)
    }

    /// Returns the key prefix of this cache.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Returns the TTL applied when `set` is called without one.
    #[must_use]
    pub fn default_ttl(&self) -> Option<Duration> {
        self.inner.default_ttl
    }

    /// Returns `true` if the [`CacheTier`] methods return store errors instead of absorbing them.
    #[must_use]
    pub fn propagates_errors(&self) -> bool {
        self.inner.propagate_errors
    }

    /// Returns a snapshot of the failure counters.
    #[must_use]
    pub fn health(&self) -> HealthSnapshot {
        self.inner.health.snapshot()
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Runs the store's connectivity check.
    ///
    /// The outcome is recorded in [`health`][Self::health]. The caller bounds how long it may
    /// take.
    ///
    /// # Errors
    ///
    /// Returns the store error when the check fails.
    pub async fn probe(&self) -> Result<(), Error> {
        self.observe("probe", self.inner.store.probe()).await
    }

    /// Reads `key`, returning store and decoding errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the stored value cannot be decoded.
    pub async fn try_get(&self, key: &K) -> Result<Option<V>, Error> {
        let storage_key = self.storage_key(key);
        let Some(bytes) = self.observe("get", self.inner.store.get(&storage_key)).await? else {
            return Ok(None);
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|error| {
            tracing::event!(
                name: "larder.remote.decode_failed",
                Level::WARN,
                cache.namespace = %self.inner.namespace,
                error = %error,
            );
            Error::from_source(error)
        })
    }

    /// Writes `key`, returning store and encoding errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded or the store fails.
    pub async fn try_set(&self, key: &K, value: &V, ttl: Option<Duration>) -> Result<(), Error> {
        let bytes = serde_json::to_vec(value).map_err(Error::from_source)?;
        let storage_key = self.storage_key(key);
        let ttl = ttl.or(self.inner.default_ttl);
        self.observe("set", self.inner.store.set(&storage_key, bytes, ttl)).await
    }

    /// Removes `key`, returning store errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn try_delete(&self, key: &K) -> Result<(), Error> {
        let storage_key = self.storage_key(key);
        self.observe("delete", self.inner.store.delete(&storage_key)).await
    }

    /// Checks `key`, returning store errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn try_has(&self, key: &K) -> Result<bool, Error> {
        let storage_key = self.storage_key(key);
        self.observe("has", self.inner.store.exists(&storage_key)).await
    }

    /// Removes every key in this cache's namespace, returning store errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn try_clear(&self) -> Result<(), Error> {
        let prefix = self.prefix();
        self.observe("clear", self.inner.store.clear(&prefix)).await
    }

    fn prefix(&self) -> String {
        if self.inner.namespace.is_empty() {
            String::new()
        } else {
            format!("{}:", self.inner.namespace)
        }
    }

    fn storage_key(&self, key: &K) -> String {
        let mut storage_key = self.prefix();
        storage_key.push_str(key.as_ref());
        storage_key
    }

    async fn observe<T>(&self, operation: &'static str, future: impl Future<Output = Result<T, Error>>) -> Result<T, Error> {
        match future.await {
            Ok(value) => {
                self.inner.health.record_success();
                Ok(value)
            }
            Err(error) => {
                let consecutive = self.inner.health.record_failure(self.inner.clock.instant());
                tracing::event!(
                    name: "larder.remote.failed",
                    Level::WARN,
                    cache.operation = operation,
                    cache.namespace = %self.inner.namespace,
                    cache.consecutive_failures = consecutive,
                    cache.unavailable = error.is_unavailable(),
                    error = %error,
                );
                Err(error)
            }
        }
    }

    fn absorb<T>(&self, result: Result<T, Error>, fallback: T) -> Result<T, Error> {
        match result {
            Err(error) if self.inner.propagate_errors => Err(error),
            Err(_) => Ok(fallback),
            Ok(value) => Ok(value),
        }
    }
}

impl<K, V, S> CacheTier<K, V> for DistributedCache<K, V, S>
where
    K: AsRef<str> + Send + Sync,
    V: Serialize + DeserializeOwned + Send + Sync,
    S: RemoteStore,
{
    async fn get(&self, key: &K) -> Result<Option<V>, Error> {
        let result = self.try_get(key).await;
        self.absorb(result, None)
    }

    async fn set(&self, key: &K, value: V, ttl: Option<Duration>) -> Result<(), Error> {
        let result = self.try_set(key, &value, ttl).await;
        self.absorb(result, ())
    }

    async fn delete(&self, key: &K) -> Result<(), Error> {
        let result = self.try_delete(key).await;
        self.absorb(result, ())
    }

    async fn has(&self, key: &K) -> Result<bool, Error> {
        let result = self.try_has(key).await;
        self.absorb(result, false)
    }

    async fn clear(&self) -> Result<(), Error> {
        let result = self.try_clear().await;
        self.absorb(result, ())
    }
}

/// Builder for configuring a [`DistributedCache`].
#[derive(Debug)]
pub struct DistributedCacheBuilder<K, V, S> {
    store: S,
    namespace: String,
    default_ttl: Option<Duration>,
    propagate_errors: bool,
    clock: Clock,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, S> DistributedCacheBuilder<K, V, S> {
    /// Creates a builder over `store` with the [`DEFAULT_NAMESPACE`].
    ///
    /// `clock` timestamps the failures recorded in the tier's health.
    #[must_use]
    pub fn new(store: S, clock: Clock) -> Self {
        Self {
            store,
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_ttl: None,
            propagate_errors: false,
            clock,
            _marker: PhantomData,
        }
    }

    /// Sets the key prefix; an empty namespace stores keys verbatim.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the TTL applied when `set` is called without one.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// When enabled, the [`CacheTier`] methods return store errors instead of absorbing them.
    #[must_use]
    pub fn propagate_errors(mut self, enabled: bool) -> Self {
        self.propagate_errors = enabled;
        self
    }

    /// Builds the configured [`DistributedCache`].
    #[must_use]
    pub fn build(self) -> DistributedCache<K, V, S> {
        DistributedCache {
            inner: Arc::new(Inner {
                store: self.store,
                namespace: self.namespace,
                default_ttl: self.default_ttl,
                propagate_errors: self.propagate_errors,
                health: RemoteHealth::default(),
                clock: self.clock,
            }),
            _marker: PhantomData,
        }
    }
}
