// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! In-process cache tier with strict LRU eviction and lazy TTL expiry.
//!
//! This crate provides [`LocalCache`], a bounded in-memory [`CacheTier`][larder_tier::CacheTier].
//! Use [`LocalCacheBuilder`] to configure capacity, default TTL and the clock the cache reads
//! time from.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use larder_memory::LocalCache;
//! use larder_tier::CacheTier;
//! use tick::Clock;
//!
//! # futures::executor::block_on(async {
//! let cache = LocalCache::<String, i32>::builder(Clock::new_frozen())
//!     .capacity(1000)
//!     .default_ttl(Duration::from_secs(300))
//!     .build();
//!
//! cache.set(&"key".to_string(), 42, None).await.unwrap();
//! assert_eq!(cache.get(&"key".to_string()).await.unwrap(), Some(42));
//! # });
//! ```
//!
//! # Eviction and Expiry
//!
//! - **Strict LRU**: every `get` and `set` marks the entry as most recently accessed; `has`
//!   does not. When a new key would exceed the capacity, the least-recently-accessed entry is
//!   evicted.
//! - **Lazy expiry**: there is no background sweeper. An expired entry is never returned, and
//!   is removed when it is read, evicted, or swept by [`LocalCache::purge_expired`]. Until then
//!   it still counts towards [`LocalCache::len`].

pub mod builder;
mod store;
pub mod tier;

#[doc(inline)]
pub use builder::LocalCacheBuilder;
#[doc(inline)]
pub use tier::LocalCache;
