//! Per‑service circuit breaker.
//!
//! A three‑state machine gating calls to one backend service:
//!
//! ```text
//! Closed    -> Open:      failures / (failures + successes) > threshold
//! Open      -> HalfOpen:  a check arrives more than `timeout` after the last failure
//! HalfOpen  -> Closed:    any success
//! HalfOpen  -> Open:      failure ratio crosses the threshold again
//! ```
//!
//! Every operation runs under one mutex so a transition is atomic with the
//! read that triggered it.
use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Point‑in‑time copy of a breaker's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub threshold: f64,
    pub last_failure: Option<Instant>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u64,
    success_count: u64,
    last_failure: Option<Instant>,
    threshold: f64,
}

impl BreakerState {
    fn reset_counters(&mut self) {
        self.failure_count = 0;
        self.success_count = 0;
    }

    fn failure_ratio_exceeded(&self) -> bool {
        let total = self.failure_count + self.success_count;
        total > 0 && self.failure_count as f64 / total as f64 > self.threshold
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    timeout: Duration,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker for `name` that opens when the failure ratio
    /// exceeds `threshold` and probes again after `timeout`.
    pub fn new(name: impl Into<String>, threshold: f64, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                threshold,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn threshold(&self) -> f64 {
        self.lock().threshold
    }

    /// Replace the failure ratio threshold; counters and state are kept.
    pub fn set_threshold(&self, threshold: f64) {
        self.lock().threshold = threshold;
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            threshold: inner.threshold,
            last_failure: inner.last_failure,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.success_count += 1;
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.reset_counters();
            tracing::info!(service = %self.name, "Circuit breaker closed after successful probe");
        }
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(now);
        if inner.state != CircuitState::Open && inner.failure_ratio_exceeded() {
            tracing::warn!(
                service = %self.name,
                failures = inner.failure_count,
                successes = inner.success_count,
                threshold = inner.threshold,
                "Circuit breaker opened"
            );
            inner.state = CircuitState::Open;
        }
    }

    /// Whether a call to the service may proceed right now.
    pub fn can_execute(&self) -> bool {
        self.can_execute_at(Instant::now())
    }

    /// Same as [`CircuitBreaker::can_execute`] with an explicit clock reading.
    ///
    /// An open breaker whose timeout has elapsed moves to half‑open, clears
    /// its counters and admits the caller as a probe.
    pub fn can_execute_at(&self, now: Instant) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure
                    .is_some_and(|last| now.saturating_duration_since(last) > self.timeout);
                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.reset_counters();
                    tracing::info!(service = %self.name, "Circuit breaker half-open, probing");
                }
                cooled_down
            }
        }
    }
}
