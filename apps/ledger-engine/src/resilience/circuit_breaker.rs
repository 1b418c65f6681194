//! Circuit breaker for the market data source.
//!
//! Stops hammering a failing price source and gives it time to recover.
//!
//! # State Machine
//!
//! ```text
//! CLOSED → OPEN (consecutive failures >= threshold)
//! OPEN → HALF_OPEN (cooldown elapsed)
//! HALF_OPEN → CLOSED (probe succeeds)
//! HALF_OPEN → OPEN (probe fails; cooldown restarts)
//! ```
//!
//! Time comes from an injected [`Clock`], so every transition can be driven
//! from tests without sleeping.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ledger_engine::domain::shared::SystemClock;
//! use ledger_engine::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let breaker = CircuitBreaker::new("prices", CircuitBreakerConfig::default(), Arc::new(SystemClock));
//!
//! if let Some(_permit) = breaker.try_acquire() {
//!     // make the call, then report it
//!     breaker.record_success();
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::shared::{Clock, Timestamp};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitBreakerState {
    /// Circuit is closed, calls flow normally.
    Closed,
    /// Circuit is open, calls are rejected.
    Open,
    /// Cooldown elapsed; a single probe call is allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit (default: 5).
    pub failure_threshold: u32,
    /// Time to stay `OPEN` before probing (default: 60s).
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Permission to make one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPermit {
    /// Circuit closed; a normal call.
    Normal,
    /// The single half-open probe.
    Probe,
}

/// Consecutive-failure circuit breaker.
pub struct CircuitBreaker {
    /// Name for logging.
    name: String,
    /// Configuration.
    config: CircuitBreakerConfig,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Current state.
    state: RwLock<CircuitBreakerState>,
    /// When the circuit last opened.
    opened_at: RwLock<Option<Timestamp>>,
    /// Failures since the last success.
    consecutive_failures: AtomicU32,
    /// Whether the half-open probe has been handed out.
    probe_in_flight: AtomicBool,
    /// Total calls counter (for metrics).
    total_calls: AtomicU64,
    /// Total failures counter (for metrics).
    total_failures: AtomicU64,
    /// Calls refused while open (for metrics).
    rejected_calls: AtomicU64,
    /// State transitions counter (for metrics).
    state_transitions: AtomicU64,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.current_state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            state: RwLock::new(CircuitBreakerState::Closed),
            opened_at: RwLock::new(None),
            consecutive_failures: AtomicU32::new(0),
            probe_in_flight: AtomicBool::new(false),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
            state_transitions: AtomicU64::new(0),
        }
    }

    /// Get the breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn current_state(&self) -> CircuitBreakerState {
        *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Get the current state, applying any time-based transition first.
    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        self.check_state_transition();
        self.current_state()
    }

    /// Ask to make a call.
    ///
    /// Returns `None` while open, and while half-open once the probe has been
    /// handed out. Every permit must be followed by
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure). A probe abandoned before
    /// its outcome is known goes back through
    /// [`release_probe`](Self::release_probe).
    #[must_use]
    pub fn try_acquire(&self) -> Option<CallPermit> {
        self.check_state_transition();

        let permit = match self.current_state() {
            CircuitBreakerState::Closed => Some(CallPermit::Normal),
            CircuitBreakerState::Open => None,
            CircuitBreakerState::HalfOpen => self
                .probe_in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
                .then_some(CallPermit::Probe),
        };

        if permit.is_none() {
            self.rejected_calls.fetch_add(1, Ordering::Relaxed);
        }
        permit
    }

    /// Time left before an open circuit allows a probe.
    #[must_use]
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        if self.current_state() != CircuitBreakerState::Open {
            return None;
        }
        let opened = (*self
            .opened_at
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner))?;
        let elapsed = self.clock.now().saturating_since(opened);
        Some(self.config.cooldown.saturating_sub(elapsed))
    }

    /// Return an unused probe permit so the next caller can probe.
    ///
    /// The circuit stays `HALF_OPEN`; nothing is counted as a call.
    pub fn release_probe(&self) {
        if self.current_state() == CircuitBreakerState::HalfOpen
            && self.probe_in_flight.swap(false, Ordering::AcqRel)
        {
            tracing::debug!(name = %self.name, "Abandoned probe released");
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        match self.current_state() {
            CircuitBreakerState::Closed => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            CircuitBreakerState::HalfOpen => self.transition_to_closed(),
            CircuitBreakerState::Open => {
                tracing::debug!(name = %self.name, "Late success recorded while circuit is OPEN");
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        match self.current_state() {
            CircuitBreakerState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition_to_open();
                }
            }
            CircuitBreakerState::HalfOpen => self.transition_to_open(),
            CircuitBreakerState::Open => {
                tracing::debug!(name = %self.name, "Late failure recorded while circuit is OPEN");
            }
        }
    }

    /// Check for the time-based transition (`OPEN` -> `HALF_OPEN`).
    fn check_state_transition(&self) {
        if self.current_state() == CircuitBreakerState::Open
            && let Some(opened) = *self
                .opened_at
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
            && self.clock.now().saturating_since(opened) >= self.config.cooldown
        {
            self.transition_to_half_open();
        }
    }

    /// Transition to `OPEN` state.
    fn transition_to_open(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = *state;

        if previous != CircuitBreakerState::Open {
            *state = CircuitBreakerState::Open;
            drop(state);

            *self
                .opened_at
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(self.clock.now());
            self.probe_in_flight.store(false, Ordering::Release);

            self.state_transitions.fetch_add(1, Ordering::Relaxed);

            tracing::warn!(
                name = %self.name,
                from = %previous,
                to = "OPEN",
                consecutive_failures = self.consecutive_failures.load(Ordering::Relaxed),
                cooldown_secs = self.config.cooldown.as_secs(),
                "Circuit breaker opened"
            );
        }
    }

    /// Transition to `HALF_OPEN` state.
    fn transition_to_half_open(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = *state;

        if previous == CircuitBreakerState::Open {
            *state = CircuitBreakerState::HalfOpen;
            drop(state);

            self.probe_in_flight.store(false, Ordering::Release);
            self.state_transitions.fetch_add(1, Ordering::Relaxed);

            tracing::info!(
                name = %self.name,
                from = %previous,
                to = "HALF_OPEN",
                "Circuit breaker probing"
            );
        }
    }

    /// Transition to `CLOSED` state.
    fn transition_to_closed(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = *state;

        if previous != CircuitBreakerState::Closed {
            *state = CircuitBreakerState::Closed;
            drop(state);

            *self
                .opened_at
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
            self.consecutive_failures.store(0, Ordering::Relaxed);
            self.probe_in_flight.store(false, Ordering::Release);

            self.state_transitions.fetch_add(1, Ordering::Relaxed);

            tracing::info!(
                name = %self.name,
                from = %previous,
                to = "CLOSED",
                "Circuit breaker closed"
            );
        }
    }

    /// Get metrics for this circuit breaker.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: self.state(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
            opened_at: *self
                .opened_at
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        }
    }

    /// Force the circuit breaker to open (for testing or emergency).
    pub fn force_open(&self) {
        self.transition_to_open();
    }

    /// Force the circuit breaker to close (for testing or recovery).
    pub fn force_close(&self) {
        self.transition_to_closed();
    }
}

/// Metrics for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitBreakerState,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Total calls recorded.
    pub total_calls: u64,
    /// Total failures recorded.
    pub total_failures: u64,
    /// Calls refused without reaching the source.
    pub rejected_calls: u64,
    /// Number of state transitions.
    pub state_transitions: u64,
    /// When the circuit last opened, while not closed.
    pub opened_at: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::ManualClock;

    fn breaker(threshold: u32) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Timestamp::parse("2026-01-05T15:00:00Z").unwrap(),
        ));
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(60),
        };
        (CircuitBreaker::new("test", config, clock.clone()), clock)
    }

    fn fail(b: &CircuitBreaker, times: u32) {
        for _ in 0..times {
            assert!(b.try_acquire().is_some());
            b.record_failure();
        }
    }

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.cooldown, Duration::from_secs(60));
    }

    #[test]
    fn test_initial_state_is_closed() {
        let (b, _) = breaker(5);
        assert_eq!(b.state(), CircuitBreakerState::Closed);
        assert_eq!(b.try_acquire(), Some(CallPermit::Normal));
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let (b, _) = breaker(3);
        fail(&b, 2);
        assert_eq!(b.state(), CircuitBreakerState::Closed);
        fail(&b, 1);
        assert_eq!(b.state(), CircuitBreakerState::Open);
        assert_eq!(b.try_acquire(), None);
        assert_eq!(b.remaining_cooldown(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let (b, _) = breaker(3);
        fail(&b, 2);
        b.record_success();
        fail(&b, 2);
        assert_eq!(b.state(), CircuitBreakerState::Closed);
        assert_eq!(b.metrics().consecutive_failures, 2);
    }

    #[test]
    fn test_half_open_grants_exactly_one_probe() {
        let (b, clock) = breaker(1);
        fail(&b, 1);

        clock.advance(Duration::from_secs(59));
        assert_eq!(b.try_acquire(), None);

        clock.advance(Duration::from_secs(1));
        assert_eq!(b.state(), CircuitBreakerState::HalfOpen);
        assert_eq!(b.try_acquire(), Some(CallPermit::Probe));
        assert_eq!(b.try_acquire(), None);
        assert_eq!(b.try_acquire(), None);
    }

    #[test]
    fn test_probe_success_closes() {
        let (b, clock) = breaker(1);
        fail(&b, 1);
        clock.advance(Duration::from_secs(60));
        assert_eq!(b.try_acquire(), Some(CallPermit::Probe));
        b.record_success();
        assert_eq!(b.state(), CircuitBreakerState::Closed);
        assert_eq!(b.try_acquire(), Some(CallPermit::Normal));
        assert!(b.metrics().opened_at.is_none());
    }

    #[test]
    fn test_probe_failure_reopens_and_restarts_cooldown() {
        let (b, clock) = breaker(1);
        fail(&b, 1);
        clock.advance(Duration::from_secs(90));
        assert_eq!(b.try_acquire(), Some(CallPermit::Probe));
        b.record_failure();

        assert_eq!(b.state(), CircuitBreakerState::Open);
        assert_eq!(b.remaining_cooldown(), Some(Duration::from_secs(60)));
        clock.advance(Duration::from_secs(30));
        assert_eq!(b.try_acquire(), None);
        clock.advance(Duration::from_secs(30));
        assert_eq!(b.try_acquire(), Some(CallPermit::Probe));
    }

    #[test]
    fn test_released_probe_can_be_taken_again() {
        let (b, clock) = breaker(1);
        fail(&b, 1);
        clock.advance(Duration::from_secs(60));
        assert_eq!(b.try_acquire(), Some(CallPermit::Probe));
        assert_eq!(b.try_acquire(), None);

        b.release_probe();
        assert_eq!(b.state(), CircuitBreakerState::HalfOpen);
        assert_eq!(b.metrics().total_calls, 1);
        assert_eq!(b.try_acquire(), Some(CallPermit::Probe));
    }

    #[test]
    fn test_release_outside_half_open_is_ignored() {
        let (b, _) = breaker(1);
        b.release_probe();
        assert_eq!(b.state(), CircuitBreakerState::Closed);
        assert_eq!(b.try_acquire(), Some(CallPermit::Normal));
    }

    #[test]
    fn test_metrics_count_calls_and_rejections() {
        let (b, _) = breaker(2);
        fail(&b, 2);
        let _ = b.try_acquire();
        let m = b.metrics();
        assert_eq!(m.state, CircuitBreakerState::Open);
        assert_eq!(m.total_calls, 2);
        assert_eq!(m.total_failures, 2);
        assert_eq!(m.rejected_calls, 1);
        assert_eq!(m.state_transitions, 1);
    }

    #[test]
    fn test_force_open_and_close() {
        let (b, _) = breaker(5);
        b.force_open();
        assert_eq!(b.state(), CircuitBreakerState::Open);
        b.force_close();
        assert_eq!(b.state(), CircuitBreakerState::Closed);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitBreakerState::HalfOpen.to_string(), "HALF_OPEN");
        assert_eq!(
            serde_json::to_string(&CircuitBreakerState::Open).unwrap(),
            "\"OPEN\""
        );
    }
}
