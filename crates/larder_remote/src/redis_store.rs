// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Redis-backed [`RemoteStore`].

use std::time::Duration;

use larder_tier::Error;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};

use crate::store::RemoteStore;

const SCAN_BATCH: usize = 100;

/// A [`RemoteStore`] backed by Redis.
///
/// Uses a multiplexed [`ConnectionManager`] that reconnects on its own; cloning the store
/// shares the connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Wraps an existing connection manager.
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Opens a connection manager for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the first connection attempt fails.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = Client::open(url).map_err(to_error)?;
        let connection = ConnectionManager::new(client).await.map_err(to_error)?;
        Ok(Self::new(connection))
    }
}

impl RemoteStore for RedisStore {
    async fn probe(&self) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await.map_err(to_error)?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(Error::unavailable(format!("unexpected PING reply: {pong}")))
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let mut conn = self.connection.clone();
        redis::cmd("GET").arg(key).query_async(&mut conn).await.map_err(to_error)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            // PX rejects zero
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            cmd.arg("PX").arg(millis);
        }

        let _: () = cmd.query_async(&mut conn).await.map_err(to_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        let _: u64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await.map_err(to_error)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        let mut conn = self.connection.clone();
        redis::cmd("EXISTS").arg(key).query_async(&mut conn).await.map_err(to_error)
    }

    async fn clear(&self, prefix: &str) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;

        // SCAN instead of KEYS so the server is never blocked
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(to_error)?;

            if !keys.is_empty() {
                let _: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await.map_err(to_error)?;
            }

            cursor = next_cursor;
            if cursor == 0 {
                return Ok(());
            }
        }
    }
}

fn to_error(error: RedisError) -> Error {
    if error.is_io_error() || error.is_connection_refusal() || error.is_connection_dropped() || error.is_timeout() {
        Error::unavailable(error)
    } else {
        Error::from_source(error)
    }
}
