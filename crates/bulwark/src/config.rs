// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Resolved configuration for limiters and breakers.
//!
//! Loading is left to the application; these types hold the values once resolved. With the
//! `serde` feature they deserialize from the usual configuration formats, with durations
//! written as integer milliseconds.

use std::collections::HashMap;
use std::time::Duration;

use tracing::Level;

/// Token refill rate used when none is configured or the configured one is unusable.
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 2.0;

/// Bucket capacity used when none is configured.
pub const DEFAULT_BURST_SIZE: u32 = 5;

/// Consecutive failures that open a breaker when none is configured.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Time an open breaker waits before admitting a trial call when none is configured.
pub const DEFAULT_HALF_OPEN_AFTER: Duration = Duration::from_secs(30);

/// Circuit breaker settings for one service.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BreakerOptions {
    /// Consecutive failures that open the circuit. Zero behaves like one.
    pub failure_threshold: u32,

    /// Time the circuit stays open before one trial call is admitted.
    #[cfg_attr(feature = "serde", serde(rename = "half_open_after_ms", with = "millis"))]
    pub half_open_after: Duration,
}

impl BreakerOptions {
    /// Creates breaker settings.
    #[must_use]
    pub fn new(failure_threshold: u32, half_open_after: Duration) -> Self {
        Self {
            failure_threshold,
            half_open_after,
        }
    }

    /// Returns the settings a breaker can run with, logging any correction.
    pub(crate) fn sanitized(self, service: &str) -> Self {
        if self.failure_threshold > 0 {
            return self;
        }

        corrected(service, "failure_threshold", "1");
        Self {
            failure_threshold: 1,
            ..self
        }
    }
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_HALF_OPEN_AFTER)
    }
}

/// Token bucket settings for one service.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RateLimiterOptions {
    /// Tokens added per second. Must be finite and positive.
    pub requests_per_second: f64,

    /// Maximum number of tokens, and the number available at start. Zero behaves like one.
    pub burst_size: u32,
}

impl RateLimiterOptions {
    /// Creates token bucket settings.
    #[must_use]
    pub fn new(requests_per_second: f64, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }

    /// Returns the settings a limiter can run with, logging any correction.
    pub(crate) fn sanitized(self, service: &str) -> Self {
        let mut options = self;

        if !options.requests_per_second.is_finite() || options.requests_per_second <= 0.0 {
            corrected(service, "requests_per_second", "2.0");
            options.requests_per_second = DEFAULT_REQUESTS_PER_SECOND;
        }

        if options.burst_size == 0 {
            corrected(service, "burst_size", "1");
            options.burst_size = 1;
        }

        options
    }
}

impl Default for RateLimiterOptions {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_SECOND, DEFAULT_BURST_SIZE)
    }
}

/// Everything configured for one protected service.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ServiceConfig {
    /// Breaker settings.
    pub breaker: BreakerOptions,

    /// Rate limiter settings.
    pub limiter: RateLimiterOptions,

    /// TTL for results cached on behalf of this service. `None` uses the cache's default.
    #[cfg_attr(feature = "serde", serde(rename = "cache_ttl_ms", with = "optional_millis"))]
    pub cache_ttl: Option<Duration>,
}

impl ServiceConfig {
    /// Creates a service configuration with no cache TTL.
    #[must_use]
    pub fn new(breaker: BreakerOptions, limiter: RateLimiterOptions) -> Self {
        Self {
            breaker,
            limiter,
            cache_ttl: None,
        }
    }

    /// Sets the TTL for cached results.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

/// Process-wide settings for every protected service.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark::ResilienceConfig;
///
/// let config = ResilienceConfig::platform_defaults().with_transition_logging(true);
///
/// assert_eq!(config.service("inference").breaker.failure_threshold, 3);
/// assert_eq!(config.service("auth").breaker.half_open_after, Duration::from_secs(10));
/// // services that are not listed use the defaults
/// assert_eq!(config.service("geocoding").limiter.burst_size, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResilienceConfig {
    /// Emit breaker transitions and rejections as log events. Never changes breaker behavior.
    pub log_transitions: bool,

    /// Settings for services without an entry in [`services`][Self::services].
    pub default_service: ServiceConfig,

    /// Settings by service name.
    pub services: HashMap<String, ServiceConfig>,
}

impl ResilienceConfig {
    /// Settings for the platform's three protected services.
    ///
    /// | Service      | Failure threshold | Half-open after |
    /// |--------------|-------------------|-----------------|
    /// | `inference`  | 3                 | 30 s            |
    /// | `auth`       | 5                 | 10 s            |
    /// | `extraction` | 5                 | 60 s            |
    ///
    /// The local inference service trips and recovers on a shorter fuse than the third-party
    /// extraction service. All three use the default rate limit.
    #[must_use]
    pub fn platform_defaults() -> Self {
        let service = |threshold, recovery_secs| {
            ServiceConfig::new(
                BreakerOptions::new(threshold, Duration::from_secs(recovery_secs)),
                RateLimiterOptions::default(),
            )
        };

        Self::default()
            .with_service("inference", service(3, 30))
            .with_service("auth", service(5, 10))
            .with_service("extraction", service(5, 60))
    }

    /// Adds or replaces the settings for `name`.
    #[must_use]
    pub fn with_service(mut self, name: impl Into<String>, config: ServiceConfig) -> Self {
        self.services.insert(name.into(), config);
        self
    }

    /// Sets [`log_transitions`][Self::log_transitions].
    #[must_use]
    pub fn with_transition_logging(mut self, enabled: bool) -> Self {
        self.log_transitions = enabled;
        self
    }

    /// Returns the settings for `name`, or the defaults when it has none.
    #[must_use]
    pub fn service(&self, name: &str) -> &ServiceConfig {
        self.services.get(name).unwrap_or(&self.default_service)
    }
}

fn corrected(service: &str, setting: &'static str, value: &'static str) {
    tracing::event!(
        name: "bulwark.config.corrected",
        Level::WARN,
        service.name = service,
        config.setting = setting,
        config.value = value,
        "invalid setting replaced"
    );
}

#[cfg(feature = "serde")]
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(feature = "serde")]
mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[expect(clippy::ref_option, reason = "signature is dictated by serde's `with` attribute")]
    pub(super) fn serialize<S: Serializer>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => serializer.serialize_some(&u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|millis| millis.map(Duration::from_millis))
    }
}
