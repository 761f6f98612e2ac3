// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

/// Failure bookkeeping of a distributed cache.
///
/// Updated by every store operation, whether or not its error reaches the caller.
#[derive(Debug, Default)]
pub struct RemoteHealth {
    total_failures: AtomicU64,
    consecutive_failures: AtomicU64,
    last_failure_at: Mutex<Option<Instant>>,
}

/// Point-in-time copy of [`RemoteHealth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct HealthSnapshot {
    /// Failures since the cache was created.
    pub total_failures: u64,
    /// Failures since the last successful operation.
    pub consecutive_failures: u64,
    /// When the most recent failure happened.
    pub last_failure_at: Option<Instant>,
}

impl HealthSnapshot {
    /// Returns `true` when the last operation succeeded (or none failed yet).
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }
}

impl RemoteHealth {
    pub(crate) fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, now: Instant) -> u64 {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_failure_at.lock() = Some(now);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            total_failures: self.total_failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_failure_at: *self.last_failure_at.lock(),
        }
    }
}
