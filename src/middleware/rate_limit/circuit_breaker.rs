//! Consecutive-failure circuit breaker fronting the external rate-limit
//! backend (§3 CircuitState, §4.5).
//!
//! This is deliberately a *count* model — "opens after `threshold`
//! consecutive failures" — rather than a percentage-of-requests model.
//! A consecutive-failure count fits a breaker guarding a single external
//! dependency (the rate-limit store), where a run of failures in a row
//! is the meaningful signal, better than a ratio computed over a mixed
//! stream of calls would.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Protects a flaky external call behind a failure counter. Shared across
/// requests behind a `Mutex`, matching §5's shared-resource policy for
/// the circuit breaker.
pub struct CircuitBreaker {
    threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            threshold,
            recovery_timeout,
            inner: Mutex::new(Inner { state: CircuitState::Closed, consecutive_failures: 0, opened_at: None }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(5, Duration::from_secs(30))
    }

    /// Whether a call should be attempted right now. Once `recovery_timeout`
    /// has elapsed since the circuit opened, this returns `true` once to
    /// allow a trial call (half-open probe); the caller must report the
    /// outcome via [`record_success`]/[`record_failure`].
    pub fn allow_request(&self) -> bool {
        let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
        match guard.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = guard.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                elapsed >= self.recovery_timeout
            }
        }
    }

    pub fn record_success(&self) {
        let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
        guard.consecutive_failures = 0;
        guard.state = CircuitState::Closed;
        guard.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
        guard.consecutive_failures += 1;
        if guard.consecutive_failures >= self.threshold {
            guard.state = CircuitState::Open;
            guard.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker mutex poisoned").state
    }
}
