// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tier selection with degraded mode and lazy promotion.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use larder_memory::LocalCache;
use larder_remote::{DistributedCache, RemoteStore};
use larder_tier::{CacheTier, Error};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tick::{Clock, FutureExt as _};

use crate::CacheMode;
use crate::telemetry::{self, DegradeReason};

/// Bound on every liveness probe unless configured otherwise.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Minimum time between re-probes in degraded mode unless configured otherwise.
pub const DEFAULT_REPROBE_INTERVAL: Duration = Duration::from_secs(30);

const DEFAULT_NAME: &str = "tiered";

/// The tier currently serving operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveTier {
    /// The in-process tier.
    Local,
    /// The network-backed tier.
    Distributed,
}

/// Placeholder store type for caches built without a distributed tier.
///
/// It has no values, so a `TieredCache<K, V, NoRemoteStore>` never routes to a distributed tier.
#[derive(Debug, Clone, Copy)]
pub enum NoRemoteStore {}

impl RemoteStore for NoRemoteStore {
    async fn probe(&self) -> Result<(), Error> {
        match *self {}
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, Error> {
        match *self {}
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> Result<(), Error> {
        match *self {}
    }

    async fn delete(&self, _key: &str) -> Result<(), Error> {
        match *self {}
    }

    async fn exists(&self, _key: &str) -> Result<bool, Error> {
        match *self {}
    }

    async fn clear(&self, _prefix: &str) -> Result<(), Error> {
        match *self {}
    }
}

/// A cache that serves from the distributed tier when it is reachable and from the local
/// tier otherwise.
///
/// - In [`CacheMode::Memory`] every operation goes to the local tier.
/// - In [`CacheMode::Distributed`] the distributed tier is probed within
///   [`probe_timeout`][TieredCacheBuilder::probe_timeout] before it is used. A failed probe
///   puts the cache in *degraded* mode: operations go to the local tier, and the next
///   operation after each [`reprobe_interval`][TieredCacheBuilder::reprobe_interval] probes
///   again. A successful re-probe promotes the cache back to the distributed tier.
///
/// A distributed operation that fails is retried on the local tier, so cache failures never
/// reach the caller. Whether such a failure also demotes the cache is controlled separately
/// by [`demote_on_error`][TieredCacheBuilder::demote_on_error].
///
/// Entries are never migrated: they expire in whichever tier wrote them. `delete` and
/// `clear` always reach the local tier as well, and a successful distributed `set` drops the
/// key from the local tier, so a later demotion cannot surface an entry that was deleted or
/// overwritten while the distributed tier was active.
///
/// # Examples
///
/// ```
/// use larder::{ActiveTier, TieredCache};
/// use larder_tier::CacheTier;
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let cache = TieredCache::<String, u32>::builder(Clock::new_frozen()).build().await;
///
/// cache.set(&"answer".to_string(), 42, None).await.unwrap();
/// assert_eq!(cache.get(&"answer".to_string()).await.unwrap(), Some(42));
/// assert_eq!(cache.active_tier(), ActiveTier::Local);
/// # });
/// ```
#[derive(Debug)]
pub struct TieredCache<K, V, S = NoRemoteStore> {
    inner: Arc<Inner<K, V, S>>,
}

#[derive(Debug)]
struct Inner<K, V, S> {
    name: String,
    mode: CacheMode,
    local: LocalCache<K, V>,
    distributed: Option<DistributedCache<K, V, S>>,
    probe_timeout: Duration,
    reprobe_interval: Option<Duration>,
    demote_on_error: bool,
    clock: Clock,
    state: Mutex<SelectorState>,
}

#[derive(Debug)]
struct SelectorState {
    degraded: bool,
    last_probe_at: Instant,
    probe_in_flight: bool,
}

impl<K, V, S> Clone for TieredCache<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> TieredCache<K, V, NoRemoteStore> {
    /// Creates a builder in [`CacheMode::Memory`] with no distributed tier.
    ///
    /// `clock` drives probe timeouts and re-probe intervals.
    #[must_use]
    pub fn builder(clock: Clock) -> TieredCacheBuilder<K, V, NoRemoteStore> {
        TieredCacheBuilder::new(clock)
    }
}

impl<K, V, S> TieredCache<K, V, S>
where
    K: Clone + Hash + Eq + AsRef<str> + Send + Sync,
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
    S: RemoteStore,
{
    /// Returns the configured mode.
    #[must_use]
    pub fn mode(&self) -> CacheMode {
        self.inner.mode
    }

    /// Returns `true` when distributed mode was requested but the local tier is serving.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.inner.state.lock().degraded
    }

    /// Returns the tier that currently serves operations.
    #[must_use]
    pub fn active_tier(&self) -> ActiveTier {
        if self.inner.mode == CacheMode::Memory || self.is_degraded() {
            ActiveTier::Local
        } else {
            ActiveTier::Distributed
        }
    }

    /// Returns the local tier.
    #[must_use]
    pub fn local(&self) -> &LocalCache<K, V> {
        &self.inner.local
    }

    /// Returns the distributed tier, if one was configured.
    #[must_use]
    pub fn distributed(&self) -> Option<&DistributedCache<K, V, S>> {
        self.inner.distributed.as_ref()
    }

    /// Probes the distributed tier now, regardless of the re-probe interval.
    ///
    /// Promotes the cache when the probe succeeds and demotes it when it fails. Returns
    /// `true` when the distributed tier is active afterwards. Always `false` in
    /// [`CacheMode::Memory`].
    pub async fn reprobe_now(&self) -> bool {
        if self.inner.mode == CacheMode::Memory {
            return false;
        }

        let healthy = match self.probe().await {
            Ok(()) => true,
            Err(reason) => {
                self.demote(reason);
                false
            }
        };

        let mut state = self.inner.state.lock();
        state.last_probe_at = self.inner.clock.instant();
        if healthy && state.degraded {
            state.degraded = false;
            telemetry::promoted(&self.inner.name);
        }
        healthy
    }

    async fn probe(&self) -> Result<(), DegradeReason> {
        let Some(distributed) = &self.inner.distributed else {
            return Err(DegradeReason::NotConfigured);
        };

        match distributed.probe().timeout(&self.inner.clock, self.inner.probe_timeout).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DegradeReason::ProbeFailed),
            Err(_) => Err(DegradeReason::ProbeTimedOut),
        }
    }

    fn demote(&self, reason: DegradeReason) {
        let mut state = self.inner.state.lock();
        state.last_probe_at = self.inner.clock.instant();
        if !state.degraded {
            state.degraded = true;
            telemetry::degraded(&self.inner.name, reason);
        }
    }

    /// Picks the tier for the next operation, re-probing first when one is due.
    async fn route(&self) -> Option<&DistributedCache<K, V, S>> {
        let distributed = self.inner.distributed.as_ref()?;
        if self.inner.mode == CacheMode::Memory {
            return None;
        }

        let guard = {
            let mut state = self.inner.state.lock();
            if !state.degraded {
                return Some(distributed);
            }
            let now = self.inner.clock.instant();
            let due = self
                .inner
                .reprobe_interval
                .is_some_and(|interval| now.saturating_duration_since(state.last_probe_at) >= interval);
            if !due || state.probe_in_flight {
                return None;
            }
            state.probe_in_flight = true;
            state.last_probe_at = now;
            ProbeInFlight { inner: &self.inner }
        };

        // probing happens outside the lock; the guard releases the slot even if the caller
        // abandons this future mid-probe
        let healthy = self.probe().await.is_ok();
        drop(guard);

        let mut state = self.inner.state.lock();
        state.last_probe_at = self.inner.clock.instant();
        if healthy {
            if state.degraded {
                state.degraded = false;
                telemetry::promoted(&self.inner.name);
            }
            Some(distributed)
        } else {
            None
        }
    }

    fn on_distributed_error(&self, operation: &'static str, error: &Error) {
        telemetry::fallback(&self.inner.name, operation, error);
        if self.inner.demote_on_error {
            self.demote(DegradeReason::OperationFailed);
        }
    }
}

struct ProbeInFlight<'a, K, V, S> {
    inner: &'a Inner<K, V, S>,
}

impl<K, V, S> Drop for ProbeInFlight<'_, K, V, S> {
    fn drop(&mut self) {
        self.inner.state.lock().probe_in_flight = false;
    }
}

impl<K, V, S> CacheTier<K, V> for TieredCache<K, V, S>
where
    K: Clone + Hash + Eq + AsRef<str> + Send + Sync,
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
    S: RemoteStore,
{
    async fn get(&self, key: &K) -> Result<Option<V>, Error> {
        if let Some(distributed) = self.route().await {
            match distributed.try_get(key).await {
                Ok(value) => return Ok(value),
                Err(error) => self.on_distributed_error("get", &error),
            }
        }
        self.inner.local.get(key).await
    }

    async fn set(&self, key: &K, value: V, ttl: Option<Duration>) -> Result<(), Error> {
        if let Some(distributed) = self.route().await {
            match distributed.try_set(key, &value, ttl).await {
                Ok(()) => return self.inner.local.delete(key).await,
                Err(error) => self.on_distributed_error("set", &error),
            }
        }
        self.inner.local.set(key, value, ttl).await
    }

    async fn delete(&self, key: &K) -> Result<(), Error> {
        if let Some(distributed) = self.route().await
            && let Err(error) = distributed.try_delete(key).await
        {
            self.on_distributed_error("delete", &error);
        }
        self.inner.local.delete(key).await
    }

    async fn has(&self, key: &K) -> Result<bool, Error> {
        if let Some(distributed) = self.route().await {
            match distributed.try_has(key).await {
                Ok(found) => return Ok(found),
                Err(error) => self.on_distributed_error("has", &error),
            }
        }
        self.inner.local.has(key).await
    }

    async fn clear(&self) -> Result<(), Error> {
        if let Some(distributed) = self.route().await
            && let Err(error) = distributed.try_clear().await
        {
            self.on_distributed_error("clear", &error);
        }
        self.inner.local.clear().await
    }

    fn len(&self) -> Option<u64> {
        match self.active_tier() {
            ActiveTier::Local => self.inner.local.len(),
            ActiveTier::Distributed => None,
        }
    }
}

/// Builder for configuring a [`TieredCache`].
#[derive(Debug)]
pub struct TieredCacheBuilder<K, V, S = NoRemoteStore> {
    name: Option<String>,
    mode: CacheMode,
    local: Option<LocalCache<K, V>>,
    distributed: Option<DistributedCache<K, V, S>>,
    probe_timeout: Duration,
    reprobe_interval: Option<Duration>,
    demote_on_error: bool,
    clock: Clock,
}

impl<K, V> TieredCacheBuilder<K, V, NoRemoteStore> {
    fn new(clock: Clock) -> Self {
        Self {
            name: None,
            mode: CacheMode::Memory,
            local: None,
            distributed: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            reprobe_interval: Some(DEFAULT_REPROBE_INTERVAL),
            demote_on_error: true,
            clock,
        }
    }

    /// Sets the distributed tier and switches to [`CacheMode::Distributed`].
    ///
    /// Call [`mode`][Self::mode] afterwards to keep a configured distributed tier unused.
    #[must_use]
    pub fn distributed<S>(self, distributed: DistributedCache<K, V, S>) -> TieredCacheBuilder<K, V, S> {
        TieredCacheBuilder {
            name: self.name,
            mode: CacheMode::Distributed,
            local: self.local,
            distributed: Some(distributed),
            probe_timeout: self.probe_timeout,
            reprobe_interval: self.reprobe_interval,
            demote_on_error: self.demote_on_error,
            clock: self.clock,
        }
    }
}

impl<K, V, S> TieredCacheBuilder<K, V, S> {
    /// Sets a name for the cache, used in log events.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the requested mode.
    ///
    /// [`CacheMode::Distributed`] without a distributed tier runs degraded for good.
    #[must_use]
    pub fn mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the local tier; defaults to a [`LocalCache`] with default settings on the
    /// builder's clock.
    #[must_use]
    pub fn local(mut self, local: LocalCache<K, V>) -> Self {
        self.local = Some(local);
        self
    }

    /// Sets the bound on each liveness probe. Defaults to [`DEFAULT_PROBE_TIMEOUT`].
    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the minimum time between re-probes in degraded mode.
    ///
    /// `None` disables promotion: once degraded, the cache stays on the local tier until
    /// [`TieredCache::reprobe_now`] succeeds. Defaults to [`DEFAULT_REPROBE_INTERVAL`].
    #[must_use]
    pub fn reprobe_interval(mut self, interval: Option<Duration>) -> Self {
        self.reprobe_interval = interval;
        self
    }

    /// Controls whether a failed distributed operation demotes the cache to degraded mode.
    ///
    /// The failed operation is retried on the local tier either way. Defaults to `true`.
    #[must_use]
    pub fn demote_on_error(mut self, enabled: bool) -> Self {
        self.demote_on_error = enabled;
        self
    }
}

impl<K, V, S> TieredCacheBuilder<K, V, S>
where
    K: Clone + Hash + Eq + AsRef<str> + Send + Sync,
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
    S: RemoteStore,
{
    /// Builds the cache, probing the distributed tier first in [`CacheMode::Distributed`].
    pub async fn build(self) -> TieredCache<K, V, S> {
        let clock = self.clock;
        let local = self.local.unwrap_or_else(|| LocalCache::builder(clock.clone()).build());
        let now = clock.instant();

        let cache = TieredCache {
            inner: Arc::new(Inner {
                name: self.name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
                mode: self.mode,
                local,
                distributed: self.distributed,
                probe_timeout: self.probe_timeout,
                reprobe_interval: self.reprobe_interval,
                demote_on_error: self.demote_on_error,
                clock,
                state: Mutex::new(SelectorState {
                    degraded: false,
                    last_probe_at: now,
                    probe_in_flight: false,
                }),
            }),
        };

        if cache.inner.mode == CacheMode::Distributed
            && let Err(reason) = cache.probe().await
        {
            cache.demote(reason);
        }
        cache
    }
}
