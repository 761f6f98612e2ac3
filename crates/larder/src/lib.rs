// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Cache tier selection with a bounded liveness probe, degraded mode and periodic promotion.
//!
//! A [`TieredCache`] hides whether a value lives in the process or on a shared store. It is
//! configured with a [`CacheMode`]:
//!
//! - [`CacheMode::Memory`] serves everything from a [`LocalCache`], a bounded LRU with TTLs.
//! - [`CacheMode::Distributed`] serves from a [`DistributedCache`] while the store answers its
//!   liveness probe, and from the local tier while it does not.
//!
//! # Degraded Mode
//!
//! The first probe runs in [`TieredCacheBuilder::build`] and is bounded by
//! [`probe_timeout`][TieredCacheBuilder::probe_timeout], so an unreachable store never stalls
//! start-up. When it fails, the cache is *degraded*: the local tier serves every operation and
//! a WARN event `larder.tier.degraded` is emitted once. While degraded, the first operation
//! after each [`reprobe_interval`][TieredCacheBuilder::reprobe_interval] probes again; success
//! promotes the cache back to the distributed tier and emits `larder.tier.promoted`.
//!
//! A distributed operation that fails at runtime is retried on the local tier and logged as
//! `larder.tier.fallback`. Callers never see cache errors from a tiered cache.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use larder::{CacheMode, TieredCache};
//! use larder_memory::LocalCache;
//! use larder_tier::CacheTier;
//! use tick::Clock;
//!
//! # futures::executor::block_on(async {
//! let clock = Clock::new_frozen();
//! let mode: CacheMode = "memory".parse().unwrap();
//! let cache = TieredCache::<String, String>::builder(clock.clone())
//!     .mode(mode)
//!     .local(LocalCache::builder(clock).capacity(100).default_ttl(Duration::from_secs(60)).build())
//!     .build()
//!     .await;
//!
//! cache.set(&"greeting".to_string(), "hello".to_string(), None).await.unwrap();
//! assert_eq!(cache.get(&"greeting".to_string()).await.unwrap().as_deref(), Some("hello"));
//! # });
//! ```
//!
//! # Features
//!
//! - `redis`: enables [`larder_remote::RedisStore`].
//! - `test-util`: enables the fake store and controllable clock used in tests.

mod mode;
mod selector;
mod telemetry;

#[doc(inline)]
pub use mode::{CacheMode, ParseCacheModeError};
#[doc(inline)]
pub use selector::{
    ActiveTier, DEFAULT_PROBE_TIMEOUT, DEFAULT_REPROBE_INTERVAL, NoRemoteStore, TieredCache, TieredCacheBuilder,
};

#[doc(no_inline)]
pub use larder_memory::LocalCache;
#[doc(no_inline)]
pub use larder_remote::{DistributedCache, RemoteStore};
#[doc(no_inline)]
pub use larder_tier::{CacheTier, Error};
