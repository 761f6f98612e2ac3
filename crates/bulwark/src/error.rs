// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// A token was not available and the caller chose not to wait for one.
///
/// Returned by [`RateLimiter::check`][crate::RateLimiter::check].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded, retry after {wait:?}")]
pub struct RateLimitExceeded {
    wait: Duration,
}

impl RateLimitExceeded {
    pub(crate) fn new(wait: Duration) -> Self {
        Self { wait }
    }

    /// Time until the next token becomes available.
    #[must_use]
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// [`wait`][Self::wait] in whole milliseconds.
    #[must_use]
    pub fn wait_ms(&self) -> u64 {
        u64::try_from(self.wait.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Why a protected call did not produce a value.
///
/// Limiter and breaker conditions are distinct from the upstream's own failures so callers can
/// pick a different retry policy for each. Cache failures never appear here; they are logged
/// and treated as misses.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ResilienceError<E> {
    /// No token was available within the caller's admission policy.
    #[error("rate limit exceeded for service '{service}', retry after {retry_after:?}")]
    RateLimitExceeded {
        /// The protected service.
        service: String,
        /// Time until the next token becomes available.
        retry_after: Duration,
    },

    /// The service's circuit is open; the call was not attempted.
    #[error("circuit open for service '{service}', retry after {retry_after:?}")]
    CircuitOpen {
        /// The protected service.
        service: String,
        /// Time until the breaker admits a trial call. Zero while another trial call is in flight.
        retry_after: Duration,
    },

    /// The call did not complete within the caller's timeout. Recorded as a failure.
    #[error("call to service '{service}' timed out after {timeout:?}")]
    TimedOut {
        /// The protected service.
        service: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The call itself failed. The error is passed through unchanged.
    #[error(transparent)]
    Upstream(E),
}

impl<E> ResilienceError<E> {
    /// Returns `true` for [`ResilienceError::RateLimitExceeded`].
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    /// Returns `true` for [`ResilienceError::CircuitOpen`].
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Returns `true` for [`ResilienceError::TimedOut`].
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Returns `true` for [`ResilienceError::Upstream`].
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }

    /// Suggested delay before retrying, for limiter and breaker rejections.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after, .. } | Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            Self::TimedOut { .. } | Self::Upstream(_) => None,
        }
    }

    /// Returns the upstream error, if the call itself failed.
    #[must_use]
    pub fn into_upstream(self) -> Option<E> {
        match self {
            Self::Upstream(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("upstream said no")]
    struct Refused;

    #[test]
    fn upstream_error_is_transparent() {
        let error = ResilienceError::Upstream(Refused);

        assert_eq!(error.to_string(), "upstream said no");
        assert!(error.is_upstream());
        assert_eq!(error.retry_after(), None);
        assert_eq!(error.into_upstream(), Some(Refused));
    }

    #[test]
    fn rejections_carry_retry_after() {
        let error = ResilienceError::<Refused>::CircuitOpen {
            service: "inference".to_string(),
            retry_after: Duration::from_secs(12),
        };

        assert!(error.is_circuit_open());
        assert!(!error.is_rate_limited());
        assert_eq!(error.retry_after(), Some(Duration::from_secs(12)));
        assert_eq!(error.to_string(), "circuit open for service 'inference', retry after 12s");
        assert!(error.into_upstream().is_none());
    }

    #[test]
    fn rate_limit_exceeded_reports_whole_millis() {
        let error = RateLimitExceeded::new(Duration::from_millis(500));

        assert_eq!(error.wait_ms(), 500);
        assert_eq!(error.to_string(), "rate limit exceeded, retry after 500ms");
    }
}
