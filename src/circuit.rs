//! Delivery circuit breaker.

use std::time::{Duration, Instant};

use crate::constants::{CIRCUIT_FAILURE_THRESHOLD, CIRCUIT_RESET_TIMEOUT};

/// Where the breaker currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Deliveries flow normally.
    Closed,
    /// Deliveries are suppressed until the reset timeout elapses.
    Open,
    /// One probe delivery is allowed; its outcome decides the next state.
    HalfOpen,
}

/// Suspends delivery after repeated failures so a struggling endpoint is
/// not hammered further.
///
/// Closed → (threshold consecutive failures) → Open → (reset timeout) →
/// HalfOpen → success closes, failure re-opens for another full timeout.
#[derive(Debug)]
pub(crate) struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        CircuitBreaker::new(CIRCUIT_FAILURE_THRESHOLD, CIRCUIT_RESET_TIMEOUT)
    }
}

impl CircuitBreaker {
    pub(crate) fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        CircuitBreaker {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            failure_threshold,
            reset_timeout,
        }
    }

    /// Whether a flush may proceed right now.
    ///
    /// An expired open interval transitions to half-open and admits the
    /// caller as the probe.
    pub(crate) fn allow(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let expired = self
                    .opened_at
                    .map_or(true, |opened| opened.elapsed() >= self.reset_timeout);
                if expired {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub(crate) fn record_success(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    pub(crate) fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        match self.state {
            CircuitState::HalfOpen => self.open(),
            CircuitState::Closed if self.consecutive_failures >= self.failure_threshold => {
                self.open()
            }
            _ => {}
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
    }
}
