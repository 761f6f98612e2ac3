// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Token bucket rate limiting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tick::Clock;
use tracing::Level;

use crate::config::{RateLimiterOptions, ResilienceConfig};
use crate::error::RateLimitExceeded;
use crate::registry::Registry;

// Absorbs rounding when a refill lands a hair below a whole token.
const TOKEN_EPSILON: f64 = 1e-9;

const DEFAULT_NAME: &str = "default";

/// A token bucket that refills continuously at a fixed rate.
///
/// The bucket starts full with `burst_size` tokens. Tokens are added lazily, whenever the
/// limiter is used, as `elapsed_seconds * requests_per_second`, capped at `burst_size`. Each
/// admitted request consumes one token. Refill and consumption happen under one short lock, so
/// concurrent callers never consume the same token.
///
/// [`acquire`][Self::acquire] waits for a token and never fails. [`try_acquire`][Self::try_acquire]
/// and [`check`][Self::check] return immediately. Waiting callers are not queued; they race for
/// each refilled token.
///
/// # Examples
///
/// ```
/// use bulwark::{RateLimiter, RateLimiterOptions};
/// use tick::Clock;
///
/// let limiter = RateLimiter::new(RateLimiterOptions::new(2.0, 5), Clock::new_frozen());
///
/// for _ in 0..5 {
///     assert!(limiter.try_acquire());
/// }
///
/// let exceeded = limiter.check().unwrap_err();
/// assert!(exceeded.wait_ms() > 0 && exceeded.wait_ms() <= 500);
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    requests_per_second: f64,
    burst_size: f64,
    bucket: Mutex<Bucket>,
    clock: Clock,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, requests_per_second: f64, burst_size: f64) {
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = elapsed.mul_add(requests_per_second, self.tokens).min(burst_size);
        self.last_refill = now;
    }
}

impl RateLimiter {
    /// Creates a full limiter that measures refill time on `clock`.
    ///
    /// A rate that is not finite and positive is replaced with the default of 2 per second,
    /// and a burst size of zero with one. Both corrections are logged.
    #[must_use]
    pub fn new(options: RateLimiterOptions, clock: Clock) -> Self {
        Self::named(DEFAULT_NAME, options, clock)
    }

    pub(crate) fn named(name: &str, options: RateLimiterOptions, clock: Clock) -> Self {
        let options = options.sanitized(name);
        let burst_size = f64::from(options.burst_size);
        let now = clock.instant();

        Self {
            name: name.to_string(),
            requests_per_second: options.requests_per_second,
            burst_size,
            bucket: Mutex::new(Bucket {
                tokens: burst_size,
                last_refill: now,
            }),
            clock,
        }
    }

    /// Returns the service this limiter protects.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the effective settings, after any correction.
    #[must_use]
    pub fn options(&self) -> RateLimiterOptions {
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "the burst size was converted from a u32"
        )]
        let burst_size = self.burst_size as u32;
        RateLimiterOptions::new(self.requests_per_second, burst_size)
    }

    /// Waits until a token is available, then consumes it.
    ///
    /// Dropping the returned future before it completes consumes nothing.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.take() {
                Ok(()) => return,
                Err(wait) => wait,
            };

            tracing::event!(
                name: "bulwark.limiter.waiting",
                Level::DEBUG,
                service.name = %self.name,
                limiter.wait_ms = duration_millis(wait),
            );
            self.clock.delay(wait).await;
        }
    }

    /// Consumes a token if one is available, without waiting.
    pub fn try_acquire(&self) -> bool {
        self.take().is_ok()
    }

    /// Consumes a token if one is available, or reports how long until one will be.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitExceeded`] carrying the wait time when the bucket is empty.
    pub fn check(&self) -> Result<(), RateLimitExceeded> {
        self.take().map_err(RateLimitExceeded::new)
    }

    /// Milliseconds until at least one token is available; zero if one is available now.
    ///
    /// Computed as `ceil((1 - tokens) / requests_per_second * 1000)`.
    #[must_use]
    pub fn wait_time_ms(&self) -> u64 {
        duration_millis(self.wait_time())
    }

    /// Time until at least one token is available, in whole milliseconds.
    #[must_use]
    pub fn wait_time(&self) -> Duration {
        let tokens = self.available_tokens();
        self.wait_for(tokens)
    }

    /// Current fractional token count.
    #[must_use]
    pub fn available_tokens(&self) -> f64 {
        let now = self.clock.instant();
        let mut bucket = self.bucket.lock();
        bucket.refill(now, self.requests_per_second, self.burst_size);
        bucket.tokens
    }

    /// Refills the bucket to `burst_size` and restarts the refill clock.
    pub fn reset(&self) {
        let now = self.clock.instant();
        let mut bucket = self.bucket.lock();
        bucket.tokens = self.burst_size;
        bucket.last_refill = now;
    }

    fn take(&self) -> Result<(), Duration> {
        let now = self.clock.instant();
        let mut bucket = self.bucket.lock();
        bucket.refill(now, self.requests_per_second, self.burst_size);

        if bucket.tokens + TOKEN_EPSILON >= 1.0 {
            bucket.tokens = (bucket.tokens - 1.0).max(0.0);
            Ok(())
        } else {
            Err(self.wait_for(bucket.tokens))
        }
    }

    fn wait_for(&self, tokens: f64) -> Duration {
        if tokens + TOKEN_EPSILON >= 1.0 {
            return Duration::ZERO;
        }

        let millis = ((1.0 - tokens) / self.requests_per_second * 1000.0).ceil();
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "millis is positive and the cast saturates"
        )]
        let millis = millis as u64;
        Duration::from_millis(millis)
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// One [`RateLimiter`] per service, created on first use.
///
/// Each limiter is configured from [`ResilienceConfig::service`] and lives as long as the
/// registry.
#[derive(Debug)]
pub struct RateLimiters {
    registry: Registry<RateLimiter>,
    config: Arc<ResilienceConfig>,
    clock: Clock,
}

impl RateLimiters {
    /// Creates an empty registry whose limiters measure time on `clock`.
    #[must_use]
    pub fn new(config: Arc<ResilienceConfig>, clock: Clock) -> Self {
        Self {
            registry: Registry::new(),
            config,
            clock,
        }
    }

    /// Returns the limiter for `service`, creating it on first reference.
    #[must_use]
    pub fn get(&self, service: &str) -> Arc<RateLimiter> {
        self.registry.get_or_create(service, || {
            RateLimiter::named(service, self.config.service(service).limiter, self.clock.clone())
        })
    }

    /// Returns the limiter for `service` if it has been created.
    #[must_use]
    pub fn existing(&self, service: &str) -> Option<Arc<RateLimiter>> {
        self.registry.get(service)
    }

    /// Names of the services that have a limiter, sorted.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        self.registry.names()
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use tick::ClockControl;

    use super::*;

    static_assertions::assert_impl_all!(RateLimiter: Send, Sync);
    static_assertions::assert_impl_all!(RateLimiters: Send, Sync);

    fn controlled(requests_per_second: f64, burst_size: u32) -> (ClockControl, RateLimiter) {
        let control = ClockControl::new();
        let limiter = RateLimiter::new(RateLimiterOptions::new(requests_per_second, burst_size), control.to_clock());
        (control, limiter)
    }

    #[test]
    fn burst_then_wait_for_refill() {
        let (control, limiter) = controlled(2.0, 5);

        for attempt in 0..5 {
            assert!(limiter.try_acquire(), "attempt {attempt} should be admitted");
        }
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.wait_time_ms(), 500);

        control.advance_millis(499);
        assert!(!limiter.try_acquire());

        control.advance_millis(1);
        assert!(limiter.try_acquire());
    }

    #[test]
    fn refill_is_capped_at_burst_size() {
        let (control, limiter) = controlled(2.0, 5);
        limiter.try_acquire();

        control.advance(Duration::from_secs(3600));

        assert!((limiter.available_tokens() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn available_tokens_are_fractional() {
        let (control, limiter) = controlled(2.0, 1);
        assert!(limiter.try_acquire());

        control.advance_millis(250);

        assert!((limiter.available_tokens() - 0.5).abs() < 1e-9);
        assert_eq!(limiter.wait_time(), Duration::from_millis(250));
    }

    #[test]
    fn check_reports_wait_time() {
        let (_control, limiter) = controlled(4.0, 1);
        limiter.check().unwrap();

        let exceeded = limiter.check().unwrap_err();

        assert_eq!(exceeded.wait(), Duration::from_millis(250));
    }

    #[test]
    fn reset_is_idempotent() {
        let (control, limiter) = controlled(2.0, 3);
        for _ in 0..3 {
            limiter.try_acquire();
        }

        limiter.reset();
        let once = limiter.available_tokens();
        limiter.reset();

        assert!((limiter.available_tokens() - once).abs() < f64::EPSILON);
        assert_eq!(limiter.wait_time_ms(), 0);

        control.advance_millis(100);
        assert!((limiter.available_tokens() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn acquire_waits_for_the_next_token() {
        let control = ClockControl::new().auto_advance_timers(true);
        let limiter = RateLimiter::new(RateLimiterOptions::new(2.0, 1), control.to_clock());
        let watch = control.to_clock().stopwatch();

        futures::executor::block_on(async {
            limiter.acquire().await;
            limiter.acquire().await;
        });

        assert_eq!(watch.elapsed(), Duration::from_millis(500));
    }

    #[test]
    fn abandoned_acquire_consumes_nothing() {
        let (control, limiter) = controlled(1.0, 1);
        limiter.try_acquire();

        let mut waiting = Box::pin(limiter.acquire());
        assert!((&mut waiting).now_or_never().is_none());
        drop(waiting);

        control.advance(Duration::from_secs(1));
        assert!((limiter.available_tokens() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn concurrent_callers_never_share_a_token() {
        let (_control, limiter) = controlled(1.0, 50);
        let admitted = std::sync::atomic::AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..20 {
                        if limiter.try_acquire() {
                            admitted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.into_inner(), 50);
    }

    #[test]
    fn invalid_options_are_corrected() {
        let limiter = RateLimiter::new(RateLimiterOptions::new(f64::NAN, 0), Clock::new_frozen());
        assert_eq!(limiter.options(), RateLimiterOptions::new(2.0, 1));
    }

    #[test]
    fn registry_shares_limiters_per_service() {
        let config = ResilienceConfig::default().with_service(
            "auth",
            crate::ServiceConfig::new(crate::BreakerOptions::default(), RateLimiterOptions::new(10.0, 20)),
        );
        let limiters = RateLimiters::new(Arc::new(config), Clock::new_frozen());

        let auth = limiters.get("auth");
        assert!(Arc::ptr_eq(&auth, &limiters.get("auth")));
        assert_eq!(auth.options(), RateLimiterOptions::new(10.0, 20));
        assert_eq!(auth.name(), "auth");

        assert!(limiters.existing("inference").is_none());
        assert_eq!(limiters.get("inference").options(), RateLimiterOptions::default());
        assert_eq!(limiters.services(), vec!["auth".to_string(), "inference".to_string()]);
    }
}
