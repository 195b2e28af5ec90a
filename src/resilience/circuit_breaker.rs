//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: reset timeout elapsed (checked on acquire), or the
//!                   health prober reports the backend reachable again
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (timer restarts)
//! ```
//!
//! # Design Decisions
//! - The state lives on one actor task; handles talk to it over a channel,
//!   so only that task ever transitions the state
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial in Half-Open; a trial permit dropped without an outcome
//!   frees the slot
//! - Only transient failures count; domain errors are successful calls

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::retries::Transient;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn metric_value(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

/// A call was short-circuited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circuit breaker is open")]
pub struct CircuitOpen;

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub since_transition_ms: u64,
}

/// How a permitted call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Abandoned,
}

#[derive(Debug)]
enum Command {
    Acquire(oneshot::Sender<Result<CallPermit, CircuitOpen>>),
    Record { trial: bool, outcome: Outcome },
    Snapshot(oneshot::Sender<CircuitSnapshot>),
}

/// The state machine proper. Owned by the actor task.
#[derive(Debug)]
struct Machine {
    state: CircuitState,
    consecutive_failures: u32,
    changed_at: Instant,
    trial_in_flight: bool,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl Machine {
    fn new(config: &CircuitBreakerConfig, now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            changed_at: now,
            trial_in_flight: false,
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout(),
        }
    }

    /// Returns whether the granted call is the half-open trial.
    fn acquire(&mut self, now: Instant) -> Result<bool, CircuitOpen> {
        if self.state == CircuitState::Open
            && now.duration_since(self.changed_at) >= self.reset_timeout
        {
            self.transition(CircuitState::HalfOpen, now);
        }

        match self.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => Err(CircuitOpen),
            CircuitState::HalfOpen if self.trial_in_flight => Err(CircuitOpen),
            CircuitState::HalfOpen => {
                self.trial_in_flight = true;
                Ok(true)
            }
        }
    }

    fn record(&mut self, trial: bool, outcome: Outcome, now: Instant) {
        match (self.state, trial, outcome) {
            (CircuitState::Closed, false, Outcome::Success) => self.consecutive_failures = 0,
            (CircuitState::Closed, false, Outcome::Failure) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    self.transition(CircuitState::Open, now);
                }
            }
            (CircuitState::HalfOpen, true, Outcome::Success) => {
                self.transition(CircuitState::Closed, now);
            }
            (CircuitState::HalfOpen, true, Outcome::Failure) => {
                self.consecutive_failures += 1;
                self.transition(CircuitState::Open, now);
            }
            (CircuitState::HalfOpen, true, Outcome::Abandoned) => self.trial_in_flight = false,
            // Outcomes of calls admitted before the last transition.
            _ => {}
        }
    }

    fn backend_reachable(&mut self, now: Instant) {
        if self.state == CircuitState::Open {
            tracing::info!("Backend reported reachable, allowing a trial call early");
            self.transition(CircuitState::HalfOpen, now);
        }
    }

    fn transition(&mut self, to: CircuitState, now: Instant) {
        let from = self.state;
        self.state = to;
        self.changed_at = now;
        self.trial_in_flight = false;
        if to == CircuitState::Closed {
            self.consecutive_failures = 0;
        }

        match to {
            CircuitState::Open => tracing::warn!(
                ?from,
                failures = self.consecutive_failures,
                reset_timeout = ?self.reset_timeout,
                "Circuit opened"
            ),
            _ => tracing::info!(?from, ?to, "Circuit state changed"),
        }
        metrics::record_circuit_state(to.metric_value());
    }

    fn snapshot(&self, now: Instant) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            failure_threshold: self.failure_threshold,
            reset_timeout_ms: self.reset_timeout.as_millis() as u64,
            since_transition_ms: now.duration_since(self.changed_at).as_millis() as u64,
        }
    }
}

/// Handle to a circuit breaker. Cheap to clone; all clones share one state.
///
/// The actor task exits once every handle and permit has been dropped.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<CircuitState>,
}

impl CircuitBreaker {
    /// Spawn the breaker's actor task on the current runtime.
    ///
    /// `backend_available` is the health prober's flag for the backend; when
    /// it turns true while the circuit is open, a trial is allowed at once.
    pub fn spawn(
        config: &CircuitBreakerConfig,
        backend_available: Option<watch::Receiver<bool>>,
    ) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        let (publisher, state) = watch::channel(CircuitState::Closed);
        let machine = Machine::new(config, Instant::now());

        tokio::spawn(run_actor(
            machine,
            inbox,
            commands.downgrade(),
            publisher,
            backend_available,
        ));

        Self { commands, state }
    }

    /// Last published state. May still read `Open` after the reset timeout
    /// until the next acquire moves it on.
    pub fn state(&self) -> CircuitState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<CircuitState> {
        self.state.clone()
    }

    /// Ask for permission to make one call.
    pub async fn acquire(&self) -> Result<CallPermit, CircuitOpen> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Acquire(reply))
            .map_err(|_| CircuitOpen)?;
        response.await.map_err(|_| CircuitOpen)?
    }

    /// Current counters and state, after any pending outcomes are applied.
    pub async fn snapshot(&self) -> Option<CircuitSnapshot> {
        let (reply, response) = oneshot::channel();
        self.commands.send(Command::Snapshot(reply)).ok()?;
        response.await.ok()
    }

    /// Run `call` under the breaker, recording a single outcome for it.
    pub async fn call<T, E, F, Fut>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient,
    {
        let permit = self.acquire().await.map_err(|_| BreakerError::Open)?;
        let result = call().await;
        match &result {
            Err(e) if e.is_transient() => permit.failure(),
            _ => permit.success(),
        }
        result.map_err(BreakerError::Inner)
    }
}

/// Error from [`CircuitBreaker::call`].
#[derive(Debug)]
pub enum BreakerError<E> {
    /// Short-circuited; the call was not made.
    Open,
    /// The call was made and failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open => write!(f, "{}", CircuitOpen),
            BreakerError::Inner(e) => write!(f, "{}", e),
        }
    }
}

/// Permission for one call. Report the outcome with [`success`] or
/// [`failure`]; dropping it unreported counts as abandoned.
///
/// [`success`]: CallPermit::success
/// [`failure`]: CallPermit::failure
#[derive(Debug)]
pub struct CallPermit {
    commands: mpsc::UnboundedSender<Command>,
    trial: bool,
    settled: bool,
}

impl CallPermit {
    /// Whether this is the single half-open trial call.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settle(Outcome::Success);
    }

    pub fn failure(mut self) {
        self.settle(Outcome::Failure);
    }

    fn settle(&mut self, outcome: Outcome) {
        if !self.settled {
            self.settled = true;
            let _ = self.commands.send(Command::Record {
                trial: self.trial,
                outcome,
            });
        }
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        self.settle(Outcome::Abandoned);
    }
}

async fn run_actor(
    mut machine: Machine,
    mut inbox: mpsc::UnboundedReceiver<Command>,
    myself: mpsc::WeakUnboundedSender<Command>,
    publisher: watch::Sender<CircuitState>,
    mut backend_available: Option<watch::Receiver<bool>>,
) {
    loop {
        tokio::select! {
            command = inbox.recv() => {
                let Some(command) = command else { break };
                let now = Instant::now();
                match command {
                    Command::Acquire(reply) => {
                        let granted = machine.acquire(now);
                        let answer = match (granted, myself.upgrade()) {
                            (Ok(trial), Some(commands)) => Ok(CallPermit {
                                commands,
                                trial,
                                settled: false,
                            }),
                            (Ok(_), None) | (Err(_), _) => Err(CircuitOpen),
                        };
                        // An unread permit is dropped here and reports itself abandoned.
                        let _ = reply.send(answer);
                    }
                    Command::Record { trial, outcome } => machine.record(trial, outcome, now),
                    Command::Snapshot(reply) => {
                        let _ = reply.send(machine.snapshot(now));
                    }
                }
            }
            reachable = availability_change(&mut backend_available) => {
                match reachable {
                    Some(true) => machine.backend_reachable(Instant::now()),
                    Some(false) => {}
                    None => backend_available = None,
                }
            }
        }

        publisher.send_if_modified(|published| {
            if *published != machine.state {
                *published = machine.state;
                true
            } else {
                false
            }
        });
    }

    tracing::debug!("Circuit breaker actor stopped");
}

/// Next value of the availability flag; `None` once its publisher is gone.
async fn availability_change(rx: &mut Option<watch::Receiver<bool>>) -> Option<bool> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}
