// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The capability set every cache tier implements.

use std::time::Duration;

use crate::Error;

/// Trait for cache tier implementations.
///
/// The contract is identical across tiers:
///
/// - `get` returns the value of a live entry, never one whose expiry has passed.
/// - `set` inserts or overwrites. A `ttl` of `None` applies the tier's default TTL.
/// - `delete` removes the entry if present and succeeds when it is absent.
/// - `has` checks for a live entry without counting as an access.
/// - `clear` removes every entry.
///
/// Only `len` and `is_empty` have default implementations:
/// - `len`: Returns `None` (not all tiers track size)
/// - `is_empty`: Delegates to `len`
#[cfg_attr(
    any(test, feature = "dynamic-cache"),
    dynosaur::dynosaur(pub(crate) DynCacheTier = dyn(box) CacheTier, bridge(none))
)]
pub trait CacheTier<K, V>: Send + Sync {
    /// Gets the value of a live entry, returning an error if the operation fails.
    fn get(&self, key: &K) -> impl Future<Output = Result<Option<V>, Error>> + Send;

    /// Inserts or overwrites an entry, returning an error if the operation fails.
    ///
    /// `None` applies the tier's default TTL.
    fn set(&self, key: &K, value: V, ttl: Option<Duration>) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes an entry, returning an error if the operation fails.
    fn delete(&self, key: &K) -> impl Future<Output = Result<(), Error>> + Send;

    /// Checks whether a live entry exists without touching its recency.
    fn has(&self, key: &K) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Clears all entries, returning an error if the operation fails.
    fn clear(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Returns the number of entries, if supported.
    ///
    /// Entries that have expired but were not yet touched are still counted.
    fn len(&self) -> Option<u64> {
        None
    }

    /// Returns `true` if the cache contains no entries.
    ///
    /// Returns `None` for implementations that don't track size.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }
}
