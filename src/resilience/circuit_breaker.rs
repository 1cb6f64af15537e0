//! Circuit breaker guarding the database.
//!
//! # States
//! - Closed: normal operation, failures are counted
//! - Open: database assumed down, callers fail fast
//! - Half-Open: not stored; an Open breaker whose recovery window elapsed
//!   lets exactly one caller probe the database
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= threshold
//! Open → Closed: recovery window elapsed and the probe succeeds
//! Open → Open: probe fails (failure bookkeeping refreshed)
//! ```
//!
//! # Design Decisions
//! - One process-wide breaker (single database)
//! - All transitions happen under one mutex, so concurrent failures never
//!   under-count and the circuit never opens twice
//! - A plain success only resets the counter; only a probe closes the circuit
//! - Single probe in Half-Open (prevents hammering a recovering database)

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::DbError;
use crate::observability::metrics;

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    /// Open, but the recovery window elapsed and a probe may run.
    HalfOpen,
}

impl CircuitState {
    pub fn name(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    is_open: bool,
    last_failure_time: Option<Instant>,
    probe_in_flight: bool,
    times_opened: u64,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            consecutive_failures: 0,
            is_open: false,
            last_failure_time: None,
            probe_in_flight: false,
            times_opened: 0,
        }
    }
}

/// Outcome of asking the breaker whether an operation may proceed.
#[derive(Debug)]
pub enum Admission<'a> {
    /// Circuit closed, proceed normally.
    Closed,
    /// Recovery window elapsed; the holder must probe and resolve the permit.
    Probe(ProbePermit<'a>),
    /// Fail fast.
    Rejected { failures: u32, retry_after: Duration },
}

impl Admission<'_> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Admission::Rejected { .. })
    }
}

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub recovery_time_secs: f64,
    /// Seconds until a probe becomes eligible; zero when not open.
    pub retry_after_secs: f64,
    pub times_opened: u64,
}

/// Process-wide circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    failure_threshold: u32,
    recovery_time: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_time: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::closed()),
            failure_threshold: failure_threshold.max(1),
            recovery_time,
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn recovery_time(&self) -> Duration {
        self.recovery_time
    }

    // The state is consistent between statements, so a panic elsewhere
    // while holding the lock leaves nothing half-written.
    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remaining(&self, state: &BreakerState, now: Instant) -> Duration {
        match state.last_failure_time {
            Some(at) => (at + self.recovery_time).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Decide whether an operation may proceed.
    pub fn admit(&self) -> Admission<'_> {
        let mut state = self.lock();
        if !state.is_open {
            return Admission::Closed;
        }

        let remaining = self.remaining(&state, Instant::now());
        if remaining.is_zero() && !state.probe_in_flight {
            state.probe_in_flight = true;
            tracing::info!(
                consecutive_failures = state.consecutive_failures,
                "Circuit recovery window elapsed, probing database"
            );
            return Admission::Probe(ProbePermit { breaker: self });
        }

        metrics::record_circuit_rejection();
        Admission::Rejected {
            failures: state.consecutive_failures,
            retry_after: remaining,
        }
    }

    /// Record a failure. Returns true if this failure opened the circuit.
    pub fn record_failure(&self) -> bool {
        let mut state = self.lock();
        self.fail_locked(&mut state)
    }

    fn fail_locked(&self, state: &mut BreakerState) -> bool {
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure_time = Some(Instant::now());
        metrics::record_consecutive_failures(state.consecutive_failures);

        if state.is_open || state.consecutive_failures < self.failure_threshold {
            tracing::debug!(
                consecutive_failures = state.consecutive_failures,
                threshold = self.failure_threshold,
                "Database failure recorded"
            );
            return false;
        }

        state.is_open = true;
        state.times_opened += 1;
        tracing::warn!(
            consecutive_failures = state.consecutive_failures,
            recovery_time = ?self.recovery_time,
            "Circuit transitioning from Closed to Open"
        );
        metrics::record_circuit_open(true);
        true
    }

    /// Record a success. Resets the failure counter; does not close an open
    /// circuit.
    pub fn record_success(&self) {
        let mut state = self.lock();
        if state.consecutive_failures > 0 {
            tracing::debug!(
                previous_failures = state.consecutive_failures,
                "Database success, resetting failure counter"
            );
        }
        state.consecutive_failures = 0;
        metrics::record_consecutive_failures(0);
    }

    /// Force the breaker back to Closed.
    pub fn reset(&self) {
        let mut state = self.lock();
        let times_opened = state.times_opened;
        *state = BreakerState::closed();
        state.times_opened = times_opened;
        metrics::record_circuit_open(false);
        metrics::record_consecutive_failures(0);
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_open
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn state(&self) -> CircuitState {
        let state = self.lock();
        self.state_locked(&state, Instant::now())
    }

    fn state_locked(&self, state: &BreakerState, now: Instant) -> CircuitState {
        if !state.is_open {
            CircuitState::Closed
        } else if self.remaining(state, now).is_zero() {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.lock();
        let now = Instant::now();
        let retry_after = if state.is_open {
            self.remaining(&state, now)
        } else {
            Duration::ZERO
        };

        CircuitSnapshot {
            state: self.state_locked(&state, now),
            consecutive_failures: state.consecutive_failures,
            failure_threshold: self.failure_threshold,
            recovery_time_secs: self.recovery_time.as_secs_f64(),
            retry_after_secs: retry_after.as_secs_f64(),
            times_opened: state.times_opened,
        }
    }
}

/// Exclusive right to probe an open circuit.
///
/// Dropping the permit without resolving it frees the probe slot and leaves
/// the circuit open.
#[derive(Debug)]
pub struct ProbePermit<'a> {
    breaker: &'a CircuitBreaker,
}

impl ProbePermit<'_> {
    /// The probe succeeded: close the circuit.
    pub fn succeed(self) {
        let mut state = self.breaker.lock();
        state.consecutive_failures = 0;
        state.is_open = false;
        tracing::info!("Circuit transitioning from Open to Closed");
        metrics::record_circuit_open(false);
        metrics::record_consecutive_failures(0);
    }

    /// The probe failed: stay open and restart the recovery window.
    pub fn fail(self) -> DbError {
        let mut state = self.breaker.lock();
        self.breaker.fail_locked(&mut state);
        tracing::warn!(
            consecutive_failures = state.consecutive_failures,
            "Circuit probe failed, staying Open"
        );
        DbError::CircuitOpen {
            failures: state.consecutive_failures,
            retry_after: self.breaker.recovery_time,
        }
    }
}

impl Drop for ProbePermit<'_> {
    fn drop(&mut self) {
        self.breaker.lock().probe_in_flight = false;
    }
}
