// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Consecutive-failure circuit breaking.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tick::Clock;
use tracing::Level;

use crate::config::{BreakerOptions, ResilienceConfig};
use crate::registry::Registry;

/// The state of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls are rejected without being attempted.
    Open,
    /// One trial call may pass through to test whether the service recovered.
    HalfOpen,
}

impl CircuitState {
    /// Returns the state name used in log events.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-in-time view of a breaker, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct BreakerSnapshot {
    /// The stored state. An open breaker whose recovery window has elapsed still reports
    /// [`CircuitState::Open`] until the next call attempt moves it to half-open.
    pub state: CircuitState,
    /// Failures since the last success while closed.
    pub consecutive_failures: u32,
    /// When the circuit last opened, if it is open or half-open.
    pub opened_at: Option<Instant>,
    /// Call attempts rejected since the breaker was created.
    pub rejected: u64,
    /// Times the circuit opened, including re-opening after a failed trial call.
    pub trips: u64,
}

/// Rejection from [`CircuitBreaker::enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerOpen {
    retry_after: Duration,
}

impl BreakerOpen {
    /// Time until the breaker admits a trial call. Zero while another trial call is in flight.
    #[must_use]
    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Probe,
}

#[derive(Debug)]
enum State {
    Closed,
    Open { opened_at: Instant },
    HalfOpen { opened_at: Instant, probe_in_flight: bool },
}

#[derive(Debug)]
struct Core {
    state: State,
    consecutive_failures: u32,
    rejected: u64,
    trips: u64,
    // bumped whenever the circuit is opened or reset; permits from an older cycle settle nothing
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Opened,
    HalfOpened,
    Closed,
    Reopened,
    Rejected,
}

impl Core {
    fn enter(&mut self, now: Instant, half_open_after: Duration) -> (Result<Mode, BreakerOpen>, Option<Transition>) {
        match &mut self.state {
            State::Closed => (Ok(Mode::Normal), None),
            State::Open { opened_at } => {
                let opened_at = *opened_at;
                let open_for = now.saturating_duration_since(opened_at);
                if open_for >= half_open_after {
                    self.state = State::HalfOpen {
                        opened_at,
                        probe_in_flight: true,
                    };
                    (Ok(Mode::Probe), Some(Transition::HalfOpened))
                } else {
                    self.rejected = self.rejected.saturating_add(1);
                    let retry_after = half_open_after.saturating_sub(open_for);
                    (Err(BreakerOpen { retry_after }), Some(Transition::Rejected))
                }
            }
            State::HalfOpen { probe_in_flight, .. } => {
                if *probe_in_flight {
                    self.rejected = self.rejected.saturating_add(1);
                    let retry_after = Duration::ZERO;
                    (Err(BreakerOpen { retry_after }), Some(Transition::Rejected))
                } else {
                    *probe_in_flight = true;
                    (Ok(Mode::Probe), None)
                }
            }
        }
    }

    fn exit(
        &mut self,
        success: bool,
        mode: Mode,
        generation: u64,
        now: Instant,
        failure_threshold: u32,
    ) -> Option<Transition> {
        if generation != self.generation {
            return None;
        }

        match self.state {
            State::Closed => {
                if success {
                    self.consecutive_failures = 0;
                    return None;
                }

                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures >= failure_threshold {
                    self.open(now);
                    Some(Transition::Opened)
                } else {
                    None
                }
            }
            State::HalfOpen { .. } if mode == Mode::Probe => {
                if success {
                    self.state = State::Closed;
                    self.consecutive_failures = 0;
                    Some(Transition::Closed)
                } else {
                    self.open(now);
                    Some(Transition::Reopened)
                }
            }
            State::Open { .. } | State::HalfOpen { .. } => None,
        }
    }

    fn abandon(&mut self, mode: Mode, generation: u64) {
        if mode == Mode::Probe
            && generation == self.generation
            && let State::HalfOpen { probe_in_flight, .. } = &mut self.state
        {
            *probe_in_flight = false;
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = State::Open { opened_at: now };
        self.trips = self.trips.saturating_add(1);
        self.generation = self.generation.wrapping_add(1);
    }

    fn reset(&mut self) -> bool {
        let changed = !matches!(self.state, State::Closed);
        self.state = State::Closed;
        self.consecutive_failures = 0;
        self.generation = self.generation.wrapping_add(1);
        changed
    }

    fn snapshot(&self) -> BreakerSnapshot {
        let (state, opened_at) = match self.state {
            State::Closed => (CircuitState::Closed, None),
            State::Open { opened_at } => (CircuitState::Open, Some(opened_at)),
            State::HalfOpen { opened_at, .. } => (CircuitState::HalfOpen, Some(opened_at)),
        };

        BreakerSnapshot {
            state,
            consecutive_failures: self.consecutive_failures,
            opened_at,
            rejected: self.rejected,
            trips: self.trips,
        }
    }
}

/// Stops calling a failing service for a while.
///
/// | State       | On success                 | On failure                                     |
/// |-------------|----------------------------|------------------------------------------------|
/// | closed      | reset consecutive failures | count it; open at `failure_threshold`          |
/// | open        | not attempted              | not attempted                                  |
/// | half-open   | close                      | open again                                     |
///
/// An open circuit moves to half-open on the first call attempt after `half_open_after`. Half-open
/// admits exactly one trial call at a time; other callers are rejected as if the circuit were
/// still open.
///
/// Each call takes a [`BreakerPermit`] from [`enter`][Self::enter] and reports its outcome
/// through it. A permit dropped without an outcome, for example because the caller was cancelled,
/// records nothing and frees the half-open slot. Opening or resetting the circuit starts a new
/// cycle: outcomes reported through permits issued before it are ignored, and their trial slot
/// can no longer be freed.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark::{BreakerOptions, CircuitBreaker, CircuitState};
/// use tick::Clock;
///
/// let breaker = CircuitBreaker::new("auth", BreakerOptions::new(2, Duration::from_secs(10)), Clock::new_frozen());
///
/// for _ in 0..2 {
///     breaker.enter().unwrap().failure();
/// }
///
/// assert_eq!(breaker.state(), CircuitState::Open);
/// assert!(breaker.enter().is_err());
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    options: BreakerOptions,
    log_transitions: bool,
    core: Mutex<Core>,
    clock: Clock,
}

impl CircuitBreaker {
    /// Creates a closed breaker that measures the recovery window on `clock`, without
    /// transition logging.
    ///
    /// A `failure_threshold` of zero is treated as one.
    #[must_use]
    pub fn new(name: impl Into<String>, options: BreakerOptions, clock: Clock) -> Self {
        let name = name.into();
        let options = options.sanitized(&name);

        Self {
            name,
            options,
            log_transitions: false,
            core: Mutex::new(Core {
                state: State::Closed,
                consecutive_failures: 0,
                rejected: 0,
                trips: 0,
                generation: 0,
            }),
            clock,
        }
    }

    /// Emits transitions and rejections as log events.
    #[must_use]
    pub fn with_transition_logging(mut self, enabled: bool) -> Self {
        self.log_transitions = enabled;
        self
    }

    /// Returns the service this breaker protects.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the effective settings, after any correction.
    #[must_use]
    pub fn options(&self) -> BreakerOptions {
        self.options
    }

    /// Returns the stored state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.core.lock().snapshot().state
    }

    /// Returns the failures counted since the last success while closed.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.core.lock().consecutive_failures
    }

    /// Returns the breaker's state and counters.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        self.core.lock().snapshot()
    }

    /// Asks to make a call.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerOpen`] when the circuit is open, or half-open with a trial call already
    /// in flight.
    pub fn enter(&self) -> Result<BreakerPermit<'_>, BreakerOpen> {
        let now = self.clock.instant();
        let (admitted, transition, generation) = {
            let mut core = self.core.lock();
            let (admitted, transition) = core.enter(now, self.options.half_open_after);
            (admitted, transition, core.generation)
        };
        self.emit(transition);

        admitted.map(|mode| BreakerPermit {
            breaker: self,
            mode,
            generation,
            settled: false,
        })
    }

    /// Runs `operation` if the breaker admits it and records its outcome.
    ///
    /// # Errors
    ///
    /// Returns `Err(None)` when the breaker rejects the call, and `Err(Some(error))` when the
    /// operation fails.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, Option<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.enter().map_err(|_open| None)?;
        match operation().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(error) => {
                permit.failure();
                Err(Some(error))
            }
        }
    }

    /// Forces the circuit closed and clears the failure count.
    ///
    /// Outcomes of calls admitted before the reset are ignored.
    pub fn reset(&self) {
        let changed = self.core.lock().reset();
        if changed {
            self.emit(Some(Transition::Closed));
        }
    }

    /// Forces the circuit open, starting a new recovery window now.
    pub fn force_open(&self) {
        let now = self.clock.instant();
        self.core.lock().open(now);
        self.emit(Some(Transition::Opened));
    }

    fn exit(&self, success: bool, mode: Mode, generation: u64) {
        let now = self.clock.instant();
        let transition = self
            .core
            .lock()
            .exit(success, mode, generation, now, self.options.failure_threshold);
        self.emit(transition);
    }

    fn abandon(&self, mode: Mode, generation: u64) {
        self.core.lock().abandon(mode, generation);
    }

    fn emit(&self, transition: Option<Transition>) {
        if !self.log_transitions {
            return;
        }

        match transition {
            None => {}
            Some(Transition::Opened) => tracing::event!(
                name: "bulwark.breaker.opened",
                Level::WARN,
                service.name = %self.name,
                breaker.state = CircuitState::Open.as_str(),
                breaker.failure_threshold = self.options.failure_threshold,
                breaker.half_open_after_ms = duration_millis(self.options.half_open_after),
                "circuit opened"
            ),
            Some(Transition::HalfOpened) => tracing::event!(
                name: "bulwark.breaker.half_open",
                Level::INFO,
                service.name = %self.name,
                breaker.state = CircuitState::HalfOpen.as_str(),
                "circuit half-open, admitting a trial call"
            ),
            Some(Transition::Closed) => tracing::event!(
                name: "bulwark.breaker.closed",
                Level::INFO,
                service.name = %self.name,
                breaker.state = CircuitState::Closed.as_str(),
                "circuit closed"
            ),
            Some(Transition::Reopened) => tracing::event!(
                name: "bulwark.breaker.reopened",
                Level::WARN,
                service.name = %self.name,
                breaker.state = CircuitState::Open.as_str(),
                "trial call failed, circuit opened again"
            ),
            Some(Transition::Rejected) => tracing::event!(
                name: "bulwark.breaker.rejected",
                Level::WARN,
                service.name = %self.name,
                breaker.state = CircuitState::Open.as_str(),
                "call rejected by open circuit"
            ),
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Admission to make one call through a [`CircuitBreaker`].
///
/// Report the outcome with [`success`][Self::success] or [`failure`][Self::failure]. Dropping the
/// permit without either records nothing. Once the circuit has been opened or reset since the
/// permit was issued, its outcome is ignored.
#[derive(Debug)]
#[must_use = "a permit records nothing unless its outcome is reported"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    mode: Mode,
    generation: u64,
    settled: bool,
}

impl BreakerPermit<'_> {
    /// Returns `true` if this is the half-open trial call.
    #[must_use]
    pub fn is_probe(&self) -> bool {
        self.mode == Mode::Probe
    }

    /// Records that the call succeeded.
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.exit(true, self.mode, self.generation);
    }

    /// Records that the call failed. Timeouts count as failures.
    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.exit(false, self.mode, self.generation);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon(self.mode, self.generation);
        }
    }
}

/// One [`CircuitBreaker`] per service, created on first use.
///
/// Breakers are configured from [`ResilienceConfig::service`] and log transitions when
/// [`ResilienceConfig::log_transitions`] is set.
#[derive(Debug)]
pub struct CircuitBreakers {
    registry: Registry<CircuitBreaker>,
    config: Arc<ResilienceConfig>,
    clock: Clock,
}

impl CircuitBreakers {
    /// Creates an empty registry whose breakers measure time on `clock`.
    #[must_use]
    pub fn new(config: Arc<ResilienceConfig>, clock: Clock) -> Self {
        Self {
            registry: Registry::new(),
            config,
            clock,
        }
    }

    /// Returns the breaker for `service`, creating it on first reference.
    #[must_use]
    pub fn get(&self, service: &str) -> Arc<CircuitBreaker> {
        self.registry.get_or_create(service, || {
            CircuitBreaker::new(service, self.config.service(service).breaker, self.clock.clone())
                .with_transition_logging(self.config.log_transitions)
        })
    }

    /// Returns the breaker for `service` if it has been created.
    #[must_use]
    pub fn existing(&self, service: &str) -> Option<Arc<CircuitBreaker>> {
        self.registry.get(service)
    }

    /// Names of the services that have a breaker, sorted.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        self.registry.names()
    }
}
