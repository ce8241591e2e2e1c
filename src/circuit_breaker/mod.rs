//! # Circuit Breaker Registry
//!
//! One state machine per upstream connector, created lazily on first use and
//! never persisted.
//!
//! ```text
//!   CLOSED --(failures >= threshold)--> OPEN --(reset timeout)--> HALF_OPEN
//!     ^                                  ^                           |
//!     |                                  +-------(trial fails)-------+
//!     +----------------------(trial succeeds)------------------------+
//! ```
//!
//! Admission hands out a [`Permit`]. The caller reports the outcome through
//! the permit; a permit dropped without an outcome is a cancelled call and
//! counts as neither success nor failure.

use crate::domain::{CircuitBreakerPolicy, ConnectorId};
use crate::observability::MetricsRecorder;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Calls are rejected without a network attempt
    Open,
    /// A single trial call is in flight
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Rejection returned while the circuit is open or a trial is in flight
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Circuit open for connector {connector_id}")]
pub struct CircuitOpen {
    pub connector_id: ConnectorId,
    /// Time until the next trial may be attempted
    pub retry_after: Duration,
}

/// Outcome of a guarded call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    last_transition: Instant,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_transition: Instant::now(),
        }
    }
}

/// Point-in-time view of one connector's circuit
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub connector_id: ConnectorId,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Milliseconds since the last state transition
    pub since_transition_ms: u64,
}

/// Registry of per-connector circuits
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    circuits: DashMap<ConnectorId, Arc<Mutex<Circuit>>>,
    metrics: MetricsRecorder,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn circuit(&self, connector_id: &ConnectorId) -> Arc<Mutex<Circuit>> {
        self.circuits
            .entry(connector_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Circuit::new())))
            .clone()
    }

    /// Ask to make one call to `connector_id`.
    ///
    /// In OPEN state the first caller after the reset timeout wins the
    /// transition to HALF_OPEN and receives the trial permit; everyone else
    /// is rejected until the trial reports back.
    pub fn try_acquire(
        &self,
        connector_id: &ConnectorId,
        policy: &CircuitBreakerPolicy,
    ) -> Result<Permit<'_>, CircuitOpen> {
        if !policy.enabled {
            return Ok(Permit::disabled(connector_id.clone()));
        }

        let circuit = self.circuit(connector_id);
        let mut guard = lock(&circuit);
        let reset_timeout = policy.reset_timeout();
        let state = guard.state;

        match state {
            CircuitState::Closed => {
                drop(guard);
                Ok(Permit::new(self, connector_id.clone(), policy.clone(), circuit, false, None))
            }
            CircuitState::Open => {
                let elapsed = guard.last_transition.elapsed();
                if elapsed >= reset_timeout {
                    let opened_at = guard.last_transition;
                    self.transition(&mut guard, connector_id, CircuitState::HalfOpen);
                    drop(guard);
                    info!(connector_id = %connector_id, "Circuit breaker admitting trial call");
                    Ok(Permit::new(
                        self,
                        connector_id.clone(),
                        policy.clone(),
                        circuit,
                        true,
                        Some(opened_at),
                    ))
                } else {
                    let retry_after = reset_timeout - elapsed;
                    debug!(
                        connector_id = %connector_id,
                        remaining_ms = retry_after.as_millis() as u64,
                        "Circuit breaker is open, rejecting call"
                    );
                    self.metrics.record_breaker_rejection(connector_id.as_str());
                    Err(CircuitOpen { connector_id: connector_id.clone(), retry_after })
                }
            }
            CircuitState::HalfOpen => {
                debug!(connector_id = %connector_id, "Trial call in flight, rejecting call");
                self.metrics.record_breaker_rejection(connector_id.as_str());
                Err(CircuitOpen { connector_id: connector_id.clone(), retry_after: reset_timeout })
            }
        }
    }

    /// Current state of a connector's circuit; unknown connectors are closed
    pub fn state(&self, connector_id: &ConnectorId) -> CircuitState {
        self.circuits
            .get(connector_id)
            .map(|c| lock(c.value()).state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Snapshot of every known circuit, ordered by connector id
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let mut out: Vec<CircuitSnapshot> = self
            .circuits
            .iter()
            .map(|entry| {
                let circuit = lock(entry.value());
                CircuitSnapshot {
                    connector_id: entry.key().clone(),
                    state: circuit.state,
                    consecutive_failures: circuit.consecutive_failures,
                    since_transition_ms: circuit.last_transition.elapsed().as_millis() as u64,
                }
            })
            .collect();
        out.sort_by(|a, b| a.connector_id.cmp(&b.connector_id));
        out
    }

    fn transition(&self, circuit: &mut Circuit, connector_id: &ConnectorId, to: CircuitState) {
        let from = circuit.state;
        circuit.state = to;
        circuit.last_transition = Instant::now();
        self.metrics.record_breaker_transition(
            connector_id.as_str(),
            &from.to_string(),
            &to.to_string(),
        );
    }

    fn complete(
        &self,
        circuit: &Mutex<Circuit>,
        connector_id: &ConnectorId,
        policy: &CircuitBreakerPolicy,
        trial: bool,
        outcome: CallOutcome,
    ) {
        let mut guard = lock(circuit);
        let state = guard.state;

        match outcome {
            CallOutcome::Success => {
                guard.consecutive_failures = 0;
                if trial && state == CircuitState::HalfOpen {
                    self.transition(&mut guard, connector_id, CircuitState::Closed);
                    info!(
                        connector_id = %connector_id,
                        "Circuit breaker closed after successful trial"
                    );
                }
            }
            CallOutcome::Failure => {
                guard.consecutive_failures = guard.consecutive_failures.saturating_add(1);
                let failures = guard.consecutive_failures;
                match state {
                    CircuitState::HalfOpen if trial => {
                        self.transition(&mut guard, connector_id, CircuitState::Open);
                        warn!(
                            connector_id = %connector_id,
                            "Circuit breaker re-opened after failed trial"
                        );
                    }
                    CircuitState::Closed if failures >= policy.failure_threshold => {
                        self.transition(&mut guard, connector_id, CircuitState::Open);
                        warn!(
                            connector_id = %connector_id,
                            failures = failures,
                            threshold = policy.failure_threshold,
                            "Circuit breaker opened"
                        );
                    }
                    _ => {}
                }
            }
        }
    }

    /// A trial that ended without an outcome puts the circuit back to OPEN
    /// with its original transition time, so the next caller may trial at once.
    fn cancel_trial(
        &self,
        circuit: &Mutex<Circuit>,
        connector_id: &ConnectorId,
        opened_at: Option<Instant>,
    ) {
        let mut guard = lock(circuit);
        if guard.state == CircuitState::HalfOpen {
            guard.state = CircuitState::Open;
            if let Some(at) = opened_at {
                guard.last_transition = at;
            }
            debug!(connector_id = %connector_id, "Trial call cancelled, circuit remains open");
        }
    }
}

/// A poisoned circuit lock only means another request panicked mid-update;
/// the plain-data state inside is still usable.
fn lock(circuit: &Mutex<Circuit>) -> MutexGuard<'_, Circuit> {
    circuit.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Admission ticket for one call.
///
/// Report the result with [`Permit::record`]. Dropping the permit without
/// recording releases it with no effect on the failure count.
#[must_use = "a permit must be recorded or it counts as a cancelled call"]
pub struct Permit<'a> {
    registry: Option<&'a CircuitBreakerRegistry>,
    connector_id: ConnectorId,
    policy: CircuitBreakerPolicy,
    circuit: Option<Arc<Mutex<Circuit>>>,
    trial: bool,
    opened_at: Option<Instant>,
    recorded: bool,
}

impl<'a> Permit<'a> {
    fn new(
        registry: &'a CircuitBreakerRegistry,
        connector_id: ConnectorId,
        policy: CircuitBreakerPolicy,
        circuit: Arc<Mutex<Circuit>>,
        trial: bool,
        opened_at: Option<Instant>,
    ) -> Self {
        Self {
            registry: Some(registry),
            connector_id,
            policy,
            circuit: Some(circuit),
            trial,
            opened_at,
            recorded: false,
        }
    }

    fn disabled(connector_id: ConnectorId) -> Self {
        Self {
            registry: None,
            connector_id,
            policy: CircuitBreakerPolicy { enabled: false, ..Default::default() },
            circuit: None,
            trial: false,
            opened_at: None,
            recorded: false,
        }
    }

    /// Whether this permit is the single HALF_OPEN trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record(mut self, outcome: CallOutcome) {
        self.recorded = true;
        if let (Some(registry), Some(circuit)) = (self.registry, self.circuit.as_ref()) {
            registry.complete(circuit, &self.connector_id, &self.policy, self.trial, outcome);
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.recorded || !self.trial {
            return;
        }
        if let (Some(registry), Some(circuit)) = (self.registry, self.circuit.as_ref()) {
            registry.cancel_trial(circuit, &self.connector_id, self.opened_at);
        }
    }
}

impl std::fmt::Debug for Permit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("connector_id", &self.connector_id)
            .field("trial", &self.trial)
            .finish_non_exhaustive()
    }
}
