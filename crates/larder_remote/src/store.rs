// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The network key/value collaborator behind a distributed cache.

use std::time::Duration;

use larder_tier::Error;

/// A network key/value store with native per-key expiry.
///
/// Implementations own the connection and its parameters. Errors that mean the store could
/// not be reached should be reported with [`Error::unavailable`].
pub trait RemoteStore: Send + Sync {
    /// Bounded-time connectivity check; callers impose the bound.
    fn probe(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Reads the raw value stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, Error>> + Send;

    /// Writes `value` under `key`, expiring after `ttl` when one is given.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes `key`; succeeds when it is absent.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Checks whether `key` holds an unexpired value.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Removes every key starting with `prefix`.
    fn clear(&self, prefix: &str) -> impl Future<Output = Result<(), Error>> + Send;
}
