use super::{handle_transient_http_error, Operation, OutcomePredicate, Policy};
use crate::clock::{system_clock, Clock};
use crate::types::Outcome;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub break_duration_ms: u64,
    pub consecutive_failures: u32,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub break_duration: Duration,
    should_break: Arc<OutcomePredicate>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 1,
            break_duration: Duration::from_secs(30),
            should_break: Arc::new(handle_transient_http_error),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of consecutive failures that opens the circuit
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open before admitting a probe
    pub fn with_break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = duration;
        self
    }

    /// Outcomes counted as failures. Everything else counts as success,
    /// except cancellation which counts as neither.
    pub fn break_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Outcome) -> bool + Send + Sync + 'static,
    {
        self.should_break = Arc::new(predicate);
        self
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("break_duration", &self.break_duration)
            .finish_non_exhaustive()
    }
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed.
    Normal,
    /// The single half-open trial call.
    Probe,
}

#[derive(Debug)]
struct State {
    circuit: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Consecutive-failure circuit breaker.
///
/// - Counts consecutive failures while closed
/// - Opens for `break_duration` once the threshold is reached
/// - Then admits exactly one probe; its outcome closes or reopens the circuit
///
/// The state lock is held only for check-and-transition, never across the
/// inner call.
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

/// Releases an unfinished probe if the call future is dropped mid-flight.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe();
        }
    }
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(State {
                circuit: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| {
            Error::runtime_with_context(
                "CircuitBreaker poisoned",
                ErrorContext::new().with_source("circuit_breaker"),
            )
        })
    }

    /// Transitions after the call keep working on a poisoned lock; only
    /// admission reports it.
    fn lock_recovered(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!(source = "circuit_breaker", "recovering poisoned breaker state");
            PoisonError::into_inner(poisoned)
        })
    }

    fn remaining_ms(&self, st: &State, now: Instant) -> u64 {
        st.opened_at
            .map(|at| (at + self.cfg.break_duration).saturating_duration_since(now))
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Check-and-transition. Rejects with [`Error::CircuitOpen`] while open or
    /// while another call holds the half-open probe.
    pub fn allow(&self) -> Result<Admission> {
        let mut st = self.lock()?;
        let now = self.clock.now();
        match st.circuit {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let remaining_ms = self.remaining_ms(&st, now);
                let elapsed = st
                    .opened_at
                    .map_or(true, |at| now >= at + self.cfg.break_duration);
                if !elapsed {
                    return Err(Error::CircuitOpen { remaining_ms });
                }
                st.circuit = CircuitState::HalfOpen;
                st.probe_in_flight = true;
                info!(state = "half_open", "circuit breaker admitting probe");
                Ok(Admission::Probe)
            }
            CircuitState::HalfOpen => {
                if st.probe_in_flight {
                    return Err(Error::CircuitOpen { remaining_ms: 0 });
                }
                st.probe_in_flight = true;
                Ok(Admission::Probe)
            }
        }
    }

    pub fn on_success(&self, admission: Admission) {
        let mut st = self.lock_recovered();
        match (st.circuit, admission) {
            (CircuitState::Closed, _) => st.consecutive_failures = 0,
            (CircuitState::HalfOpen, Admission::Probe) => {
                st.circuit = CircuitState::Closed;
                st.consecutive_failures = 0;
                st.opened_at = None;
                st.probe_in_flight = false;
                info!(state = "closed", "circuit breaker closed after successful probe");
            }
            // Late results from calls admitted before the circuit opened.
            _ => {}
        }
    }

    pub fn on_failure(&self, admission: Admission) {
        let now = self.clock.now();
        let mut st = self.lock_recovered();
        match (st.circuit, admission) {
            (CircuitState::Closed, _) => {
                st.consecutive_failures = st.consecutive_failures.saturating_add(1);
                if st.consecutive_failures >= self.cfg.failure_threshold {
                    st.circuit = CircuitState::Open;
                    st.opened_at = Some(now);
                    info!(
                        state = "open",
                        consecutive_failures = st.consecutive_failures,
                        break_ms = self.cfg.break_duration.as_millis() as u64,
                        "circuit breaker opened"
                    );
                }
            }
            (CircuitState::HalfOpen, Admission::Probe) => {
                st.circuit = CircuitState::Open;
                st.opened_at = Some(now);
                st.probe_in_flight = false;
                st.consecutive_failures = st.consecutive_failures.saturating_add(1);
                info!(state = "open", "circuit breaker reopened after failed probe");
            }
            _ => {}
        }
    }

    /// Give up a probe without judging it (cancelled or dropped call).
    fn release_probe(&self) {
        let mut st = self.lock_recovered();
        if st.circuit == CircuitState::HalfOpen {
            st.probe_in_flight = false;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.snapshot().state
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let now = self.clock.now();
        let break_duration_ms = self.cfg.break_duration.as_millis() as u64;
        let st = self.lock_recovered();
        let open_remaining_ms = match st.circuit {
            CircuitState::Open => Some(self.remaining_ms(&st, now)).filter(|ms| *ms > 0),
            _ => None,
        };
        CircuitBreakerSnapshot {
            state: st.circuit,
            failure_threshold: self.cfg.failure_threshold,
            break_duration_ms,
            consecutive_failures: st.consecutive_failures,
            open_remaining_ms,
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("cfg", &self.cfg)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Errors that say something about the remote side. Cancellation, policy
/// rejections from inner stages and local faults do not.
fn reached_dependency(e: &Error) -> bool {
    matches!(e, Error::Transport(_) | Error::Timeout { .. })
}

#[async_trait]
impl Policy for CircuitBreaker {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    async fn execute(&self, operation: &Operation, cancel: &CancellationToken) -> Outcome {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let admission = match self.allow() {
            Ok(admission) => admission,
            Err(e) => {
                warn!(error_class = e.class(), "circuit breaker rejected call");
                return Err(e);
            }
        };

        let mut guard = ProbeGuard {
            breaker: self,
            armed: admission == Admission::Probe,
        };
        let outcome = operation().await;
        guard.armed = false;

        match &outcome {
            // No verdict about the dependency: leave the count alone and free
            // the probe slot.
            Err(e) if !reached_dependency(e) => {
                debug!(
                    error_class = e.class(),
                    "circuit breaker ignoring outcome that never reached the transport"
                );
                if admission == Admission::Probe {
                    self.release_probe();
                }
            }
            o if (self.cfg.should_break)(o) => self.on_failure(admission),
            _ => self.on_success(admission),
        }
        outcome
    }
}
