// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Network-backed cache tier.
//!
//! [`DistributedCache`] implements the same [`CacheTier`][larder_tier::CacheTier] contract as
//! the local tier on top of a [`RemoteStore`], for deployments where several processes must
//! observe the same entries.
//!
//! # Failure Handling
//!
//! A distributed tier is an optimization, never a dependency: by default, store failures
//! become misses and no-ops. Each failure is logged at WARN as `larder.remote.failed` and
//! counted in [`RemoteHealth`] for callers that want to observe the tier's condition. Falling
//! back to the local tier is the tier selector's job: it demotes on a failed liveness probe
//! and, optionally, on a failed operation, and never consults [`RemoteHealth`].
//!
//! # Features
//!
//! - `redis`: [`RedisStore`], a [`RemoteStore`] over a Redis connection manager.
//! - `test-util`: [`testing::FakeRemoteStore`], an in-memory store with a switchable outage.

mod health;
#[cfg(feature = "redis")]
mod redis_store;
mod store;
#[cfg(any(feature = "test-util", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing;
pub mod tier;

#[doc(inline)]
pub use health::{HealthSnapshot, RemoteHealth};
#[cfg(feature = "redis")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
#[doc(inline)]
pub use redis_store::RedisStore;
#[doc(inline)]
pub use store::RemoteStore;
#[doc(inline)]
pub use tier::{DistributedCache, DistributedCacheBuilder};
