// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The single entry point for cached, rate-limited, circuit-protected calls.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use larder_tier::{CacheTier, DynamicCache};
use tick::{Clock, FutureExt as _};
use tracing::Level;

use crate::breaker::{BreakerSnapshot, CircuitBreakers};
use crate::config::ResilienceConfig;
use crate::error::ResilienceError;
use crate::limiter::RateLimiters;

/// How a call waits for a rate limiter token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Admission {
    /// Wait as long as it takes.
    #[default]
    Wait,
    /// Wait at most the given time, then fail with [`ResilienceError::RateLimitExceeded`].
    WaitFor(Duration),
    /// Fail with [`ResilienceError::RateLimitExceeded`] unless a token is available now.
    Reject,
}

/// Per-call settings for [`Resilience::call_with`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark::{Admission, CallOptions};
///
/// let options = CallOptions::new()
///     .admission(Admission::WaitFor(Duration::from_millis(200)))
///     .timeout(Duration::from_secs(5))
///     .ttl(Duration::from_secs(300));
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallOptions {
    admission: Admission,
    timeout: Option<Duration>,
    ttl: Option<Duration>,
}

impl CallOptions {
    /// Waits for a token, no timeout, and the service's cache TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how the call waits for a rate limiter token.
    #[must_use]
    pub fn admission(mut self, admission: Admission) -> Self {
        self.admission = admission;
        self
    }

    /// Bounds the upstream call. An elapsed timeout counts as a breaker failure.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the TTL of the cached result.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Cache, rate limiter and circuit breaker composed around a caller-supplied call.
///
/// For each call with a cache key, a service name and a compute function:
///
/// 1. A cache hit is returned at once. Hits never touch the limiter or the breaker.
/// 2. On a miss, a token is taken from the service's [`RateLimiter`][crate::RateLimiter],
///    following the call's [`Admission`].
/// 3. If the service's [`CircuitBreaker`][crate::CircuitBreaker] is open, the call fails with
///    [`ResilienceError::CircuitOpen`] and the compute function is not invoked.
/// 4. The compute function runs. Its outcome is recorded in the breaker. A success is cached
///    under the key with the service's TTL and returned; a failure is returned unchanged and
///    never cached.
///
/// A call that is dropped while computing records nothing in the breaker and caches nothing.
/// Cache errors are logged and treated as misses.
///
/// Limiters and breakers are created per service on first use and shared by every clone of
/// this value.
///
/// # Examples
///
/// ```
/// use bulwark::{Resilience, ResilienceConfig};
/// use larder_memory::LocalCache;
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let clock = Clock::new_frozen();
/// let resilience = Resilience::builder(LocalCache::<String, String>::new(clock.clone(), 1000), clock)
///     .config(ResilienceConfig::platform_defaults())
///     .build();
///
/// let summary = resilience
///     .call("doc-42", "inference", || async { Ok::<_, std::io::Error>("a short summary".to_string()) })
///     .await
///     .unwrap();
///
/// assert_eq!(summary, "a short summary");
/// # });
/// ```
#[derive(Debug)]
pub struct Resilience<V, C = DynamicCache<String, V>> {
    inner: Arc<Inner<C>>,
    _value: PhantomData<fn() -> V>,
}

#[derive(Debug)]
struct Inner<C> {
    cache: C,
    limiters: RateLimiters,
    breakers: CircuitBreakers,
    config: Arc<ResilienceConfig>,
    clock: Clock,
}

impl<V, C> Clone for Resilience<V, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _value: PhantomData,
        }
    }
}

impl<V, C> Resilience<V, C>
where
    V: Clone + Send + Sync,
    C: CacheTier<String, V>,
{
    /// Creates a wrapper over `cache` with the given configuration.
    ///
    /// `clock` drives token refill, recovery windows and timeouts.
    #[must_use]
    pub fn new(cache: C, config: ResilienceConfig, clock: Clock) -> Self {
        Self::builder(cache, clock).config(config).build()
    }

    /// Creates a builder for a wrapper over `cache` that reads time from `clock`.
    #[must_use]
    pub fn builder(cache: C, clock: Clock) -> ResilienceBuilder<V, C> {
        ResilienceBuilder {
            cache,
            config: ResilienceConfig::default(),
            clock,
            _value: PhantomData,
        }
    }

    /// Returns the cache.
    #[must_use]
    pub fn cache(&self) -> &C {
        &self.inner.cache
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ResilienceConfig {
        &self.inner.config
    }

    /// Returns the state and counters of the breaker for `service`.
    #[must_use]
    pub fn breaker_snapshot(&self, service: &str) -> BreakerSnapshot {
        self.inner.breakers.get(service).snapshot()
    }

    /// Returns the current token count of the limiter for `service`.
    #[must_use]
    pub fn available_tokens(&self, service: &str) -> f64 {
        self.inner.limiters.get(service).available_tokens()
    }

    /// Removes `key` from the cache. Failures are logged and otherwise ignored.
    pub async fn invalidate(&self, key: &str) {
        if let Err(error) = self.inner.cache.delete(&key.to_string()).await {
            cache_failed("delete", &error);
        }
    }

    /// Returns the cached value for `key`, or computes it through `service`'s limiter and
    /// breaker. Waits for a token as long as needed and does not bound the call.
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::CircuitOpen`] when the breaker rejects the call and
    /// [`ResilienceError::Upstream`] when `compute` fails.
    pub async fn call<E, F, Fut>(&self, key: &str, service: &str, compute: F) -> Result<V, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.call_with(key, service, CallOptions::default(), compute).await
    }

    /// Like [`call`][Self::call], with per-call admission, timeout and TTL.
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::RateLimitExceeded`] when no token is available within the
    /// admission policy, [`ResilienceError::CircuitOpen`] when the breaker rejects the call,
    /// [`ResilienceError::TimedOut`] when `compute` exceeds the timeout, and
    /// [`ResilienceError::Upstream`] when `compute` fails.
    pub async fn call_with<E, F, Fut>(
        &self,
        key: &str,
        service: &str,
        options: CallOptions,
        compute: F,
    ) -> Result<V, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let key = key.to_string();
        if let Some(value) = self.lookup(&key, service).await {
            return Ok(value);
        }

        self.admit(service, options.admission).await?;

        let breaker = self.inner.breakers.get(service);
        let permit = breaker.enter().map_err(|open| {
            rejected(service, "circuit_open");
            ResilienceError::CircuitOpen {
                service: service.to_string(),
                retry_after: open.retry_after(),
            }
        })?;

        let outcome = match options.timeout {
            Some(timeout) => {
                let Ok(outcome) = compute().timeout(&self.inner.clock, timeout).await else {
                    permit.failure();
                    tracing::event!(
                        name: "bulwark.call.timed_out",
                        Level::WARN,
                        service.name = service,
                        call.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    );
                    return Err(ResilienceError::TimedOut {
                        service: service.to_string(),
                        timeout,
                    });
                };
                outcome
            }
            None => compute().await,
        };

        match outcome {
            Ok(value) => {
                permit.success();
                self.store(&key, service, value.clone(), options.ttl).await;
                Ok(value)
            }
            Err(error) => {
                permit.failure();
                tracing::event!(
                    name: "bulwark.call.failed",
                    Level::WARN,
                    service.name = service,
                );
                Err(ResilienceError::Upstream(error))
            }
        }
    }

    async fn lookup(&self, key: &String, service: &str) -> Option<V> {
        match self.inner.cache.get(key).await {
            Ok(Some(value)) => {
                tracing::event!(name: "bulwark.call.hit", Level::DEBUG, service.name = service, cache.key = %key);
                Some(value)
            }
            Ok(None) => {
                tracing::event!(name: "bulwark.call.miss", Level::DEBUG, service.name = service, cache.key = %key);
                None
            }
            Err(error) => {
                cache_failed("get", &error);
                None
            }
        }
    }

    async fn admit<E>(&self, service: &str, admission: Admission) -> Result<(), ResilienceError<E>> {
        let limiter = self.inner.limiters.get(service);
        let admitted = match admission {
            Admission::Wait => {
                limiter.acquire().await;
                true
            }
            Admission::WaitFor(limit) => limiter.acquire().timeout(&self.inner.clock, limit).await.is_ok(),
            Admission::Reject => limiter.try_acquire(),
        };

        if admitted {
            return Ok(());
        }

        rejected(service, "rate_limited");
        Err(ResilienceError::RateLimitExceeded {
            service: service.to_string(),
            retry_after: limiter.wait_time(),
        })
    }

    async fn store(&self, key: &String, service: &str, value: V, ttl: Option<Duration>) {
        let ttl = ttl.or(self.inner.config.service(service).cache_ttl);
        if let Err(error) = self.inner.cache.set(key, value, ttl).await {
            cache_failed("set", &error);
        }
    }
}

fn rejected(service: &str, reason: &'static str) {
    tracing::event!(
        name: "bulwark.call.rejected",
        Level::DEBUG,
        service.name = service,
        call.reason = reason,
    );
}

fn cache_failed(operation: &'static str, error: &larder_tier::Error) {
    tracing::event!(
        name: "bulwark.cache.failed",
        Level::WARN,
        cache.operation = operation,
        error = %error,
        "cache operation failed, continuing without the cache"
    );
}

/// Builder for [`Resilience`].
#[derive(Debug)]
pub struct ResilienceBuilder<V, C> {
    cache: C,
    config: ResilienceConfig,
    clock: Clock,
    _value: PhantomData<fn() -> V>,
}

impl<V, C> ResilienceBuilder<V, C>
where
    V: Clone + Send + Sync,
    C: CacheTier<String, V>,
{
    /// Sets the per-service configuration. Defaults to [`ResilienceConfig::default`].
    #[must_use]
    pub fn config(mut self, config: ResilienceConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the wrapper.
    #[must_use]
    pub fn build(self) -> Resilience<V, C> {
        let clock = self.clock;
        let config = Arc::new(self.config);

        Resilience {
            inner: Arc::new(Inner {
                cache: self.cache,
                limiters: RateLimiters::new(Arc::clone(&config), clock.clone()),
                breakers: CircuitBreakers::new(Arc::clone(&config), clock.clone()),
                config,
                clock,
            }),
            _value: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use larder_tier::testing::{CacheOp, MockCache};
    use tracing_test::traced_test;

    use super::*;

    static_assertions::assert_impl_all!(Resilience<String>: Send, Sync, Clone);

    #[test]
    #[traced_test]
    fn cache_failures_are_absorbed_and_logged() {
        futures::executor::block_on(async {
            let cache = MockCache::<String, u32>::new();
            cache.fail_when(|op| matches!(op, CacheOp::Get(_) | CacheOp::Set { .. }));
            let resilience = Resilience::builder(cache.clone(), Clock::new_frozen()).build();

            let value = resilience.call("k", "auth", || async { Ok::<_, String>(7) }).await.unwrap();

            assert_eq!(value, 7);
            assert_eq!(cache.entry_count(), 0);
            assert!(logs_contain("continuing without the cache"));
        });
    }

    #[test]
    fn options_default_to_unbounded_wait() {
        let options = CallOptions::new();
        assert_eq!(options.admission, Admission::Wait);
        assert!(options.timeout.is_none());
        assert!(options.ttl.is_none());
    }
}
