// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory [`RemoteStore`] for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use larder_tier::Error;
use parking_lot::Mutex;
use tick::Clock;

use crate::store::RemoteStore;

/// A fake network store with native expiry and a switchable outage.
///
/// Clones share the same data and switches, so a test keeps one clone to steer the store
/// while the cache owns another.
///
/// - [`set_available(false)`][Self::set_available] makes every operation, including the
///   probe, fail with [`Error::unavailable`].
/// - [`set_hanging(true)`][Self::set_hanging] makes the probe never complete, as a
///   black-holed connection would.
#[derive(Debug, Clone)]
pub struct FakeRemoteStore {
    state: Arc<State>,
}

#[derive(Debug)]
struct State {
    data: Mutex<HashMap<String, (Vec<u8>, Option<Instant>)>>,
    available: AtomicBool,
    hanging: AtomicBool,
    probes: AtomicUsize,
    clock: Clock,
}

impl FakeRemoteStore {
    /// Creates an available store that expires keys on `clock`.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            state: Arc::new(State {
                data: Mutex::new(HashMap::new()),
                available: AtomicBool::new(true),
                hanging: AtomicBool::new(false),
                probes: AtomicUsize::new(0),
                clock,
            }),
        }
    }

    /// Switches the simulated outage on or off.
    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::SeqCst);
    }

    /// When enabled, probes never complete.
    pub fn set_hanging(&self, hanging: bool) {
        self.state.hanging.store(hanging, Ordering::SeqCst);
    }

    /// Number of probes received so far.
    #[must_use]
    pub fn probe_count(&self) -> usize {
        self.state.probes.load(Ordering::SeqCst)
    }

    /// Raw stored keys, expired ones included.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.data.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn ensure_available(&self, operation: &str) -> Result<(), Error> {
        if self.state.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::unavailable(format!("fake store: {operation} refused")))
        }
    }

    fn live_value(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.state.clock.instant();
        let mut data = self.state.data.lock();
        let expired = data.get(key)?.1.is_some_and(|expires_at| now >= expires_at);
        if expired {
            data.remove(key);
            return None;
        }
        data.get(key).map(|(value, _)| value.clone())
    }
}

impl RemoteStore for FakeRemoteStore {
    async fn probe(&self) -> Result<(), Error> {
        self.state.probes.fetch_add(1, Ordering::SeqCst);
        if self.state.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.ensure_available("probe")
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        self.ensure_available("get")?;
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), Error> {
        self.ensure_available("set")?;
        let expires_at = ttl.and_then(|ttl| self.state.clock.instant().checked_add(ttl));
        self.state.data.lock().insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.ensure_available("delete")?;
        self.state.data.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        self.ensure_available("exists")?;
        Ok(self.live_value(key).is_some())
    }

    async fn clear(&self, prefix: &str) -> Result<(), Error> {
        self.ensure_available("clear")?;
        self.state.data.lock().retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}
