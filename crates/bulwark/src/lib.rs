// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Per-service rate limiting and circuit breaking around cached calls.
//!
//! Each named service, such as `inference` or `auth`, gets its own [`RateLimiter`] and
//! [`CircuitBreaker`], created on first use from the service's entry in a
//! [`ResilienceConfig`]. The two can be used on their own, or composed with a cache through
//! [`Resilience`]:
//!
//! - a cache hit returns without consuming a token or consulting the breaker;
//! - a miss waits for a token, passes the breaker, runs the call and caches a success;
//! - failures reach the caller unchanged as [`ResilienceError::Upstream`] and are never cached.
//!
//! # Rate Limiting
//!
//! A [`RateLimiter`] is a token bucket holding up to `burst_size` tokens and refilling at
//! `requests_per_second`. With the defaults of 2 requests per second and a burst of 5, five
//! calls pass at once and the sixth must wait 500 ms.
//!
//! # Circuit Breaking
//!
//! A [`CircuitBreaker`] opens after `failure_threshold` consecutive failures and rejects calls
//! until `half_open_after` has passed. It then admits one trial call: success closes the
//! circuit, failure opens it again. Transitions are logged when
//! [`ResilienceConfig::log_transitions`] is set.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use bulwark::{Admission, CallOptions, Resilience, ResilienceConfig, ResilienceError};
//! use larder_memory::LocalCache;
//! use tick::Clock;
//!
//! # futures::executor::block_on(async {
//! let clock = Clock::new_frozen();
//! let cache = LocalCache::<String, u64>::new(clock.clone(), 100);
//! let resilience = Resilience::new(cache, ResilienceConfig::platform_defaults(), clock);
//! let options = CallOptions::new().admission(Admission::Reject).ttl(Duration::from_secs(60));
//!
//! let tokens = resilience
//!     .call_with("prompt-7", "inference", options, || async { Ok::<_, std::io::Error>(512) })
//!     .await
//!     .unwrap();
//! assert_eq!(tokens, 512);
//!
//! // Served from the cache; the upstream call is not made again.
//! let cached: Result<u64, ResilienceError<std::io::Error>> = resilience
//!     .call("prompt-7", "inference", || async { Err(std::io::Error::other("not called")) })
//!     .await;
//! assert_eq!(cached.unwrap(), 512);
//! # });
//! ```
//!
//! # Features
//!
//! - `serde`: deserializes [`ResilienceConfig`] and its parts. Durations are in milliseconds.

mod breaker;
pub mod config;
mod error;
mod limiter;
mod registry;
mod resilience;

#[doc(inline)]
pub use breaker::{BreakerOpen, BreakerPermit, BreakerSnapshot, CircuitBreaker, CircuitBreakers, CircuitState};
#[doc(inline)]
pub use config::{BreakerOptions, RateLimiterOptions, ResilienceConfig, ServiceConfig};
#[doc(inline)]
pub use error::{RateLimitExceeded, ResilienceError};
#[doc(inline)]
pub use limiter::{RateLimiter, RateLimiters};
#[doc(inline)]
pub use resilience::{Admission, CallOptions, Resilience, ResilienceBuilder};
