// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Log events emitted by the tier selector.

use larder_tier::Error;
use tracing::Level;

pub(crate) const DEGRADED: &str = "larder.tier.degraded";
pub(crate) const PROMOTED: &str = "larder.tier.promoted";
pub(crate) const FALLBACK: &str = "larder.tier.fallback";

/// Why the selector switched to the local tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DegradeReason {
    ProbeFailed,
    ProbeTimedOut,
    OperationFailed,
    NotConfigured,
}

impl DegradeReason {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::ProbeFailed => "probe_failed",
            Self::ProbeTimedOut => "probe_timed_out",
            Self::OperationFailed => "operation_failed",
            Self::NotConfigured => "not_configured",
        }
    }
}

pub(crate) fn degraded(cache_name: &str, reason: DegradeReason) {
    tracing::event!(
        name: DEGRADED,
        Level::WARN,
        cache.name = cache_name,
        cache.reason = reason.as_str(),
        "distributed cache tier unavailable, running on the local tier"
    );
}

pub(crate) fn promoted(cache_name: &str) {
    tracing::event!(
        name: PROMOTED,
        Level::INFO,
        cache.name = cache_name,
        "distributed cache tier reachable again, promoted back from the local tier"
    );
}

pub(crate) fn fallback(cache_name: &str, operation: &'static str, error: &Error) {
    tracing::event!(
        name: FALLBACK,
        Level::WARN,
        cache.name = cache_name,
        cache.operation = operation,
        error = %error,
    );
}
