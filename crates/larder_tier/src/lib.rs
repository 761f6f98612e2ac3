// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Cache entry store and the capability set shared by every cache tier.
//!
//! This crate defines the [`CacheTier`] trait that the local and distributed caches implement,
//! along with [`CacheEntry`] for storing a value with its expiry and recency metadata, and the
//! [`Error`] type for fallible tier operations.
//!
//! # Overview
//!
//! Callers are written against [`CacheTier`] only: `get`, `set`, `delete`, `has` and `clear`.
//! Which concrete tier sits behind it (in-process, network-backed, or a selector switching
//! between the two) is decided once at construction.
//!
//! # Implementing a Cache Tier
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::RwLock;
//! use std::time::Duration;
//!
//! use larder_tier::{CacheTier, Error};
//!
//! struct SimpleCache<K, V>(RwLock<HashMap<K, V>>);
//!
//! impl<K, V> CacheTier<K, V> for SimpleCache<K, V>
//! where
//!     K: Clone + Eq + std::hash::Hash + Send + Sync,
//!     V: Clone + Send + Sync,
//! {
//!     async fn get(&self, key: &K) -> Result<Option<V>, Error> {
//!         Ok(self.0.read().unwrap().get(key).cloned())
//!     }
//!
//!     async fn set(&self, key: &K, value: V, _ttl: Option<Duration>) -> Result<(), Error> {
//!         self.0.write().unwrap().insert(key.clone(), value);
//!         Ok(())
//!     }
//!
//!     async fn delete(&self, key: &K) -> Result<(), Error> {
//!         self.0.write().unwrap().remove(key);
//!         Ok(())
//!     }
//!
//!     async fn has(&self, key: &K) -> Result<bool, Error> {
//!         Ok(self.0.read().unwrap().contains_key(key))
//!     }
//!
//!     async fn clear(&self) -> Result<(), Error> {
//!         self.0.write().unwrap().clear();
//!         Ok(())
//!     }
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! Enable the `dynamic-cache` feature (on by default) for [`DynamicCache`], which wraps any
//! `CacheTier` in a clonable, type-erased container.

mod entry;
pub mod error;
#[cfg(any(feature = "test-util", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing;
pub(crate) mod tier;

#[cfg(any(test, feature = "dynamic-cache"))]
mod dynamic;

#[cfg(any(test, feature = "dynamic-cache"))]
#[doc(inline)]
pub use dynamic::{DynamicCache, DynamicCacheExt};
#[doc(inline)]
pub use entry::CacheEntry;
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use tier::CacheTier;
