// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Tracker for long-running daemon operations.
//!
//! An operation is submitted once and then its readiness is polled on a
//! fixed interval until it is ready, it times out, or the tracker is
//! cancelled. The tracker exposes its phase and elapsed time so the UI can
//! render progress without blocking.
//!
//! ```text
//! Idle -> Submitting -> Waiting -> Succeeded
//!             |            |
//!             +------------+-----> Failed
//! ```
//!
//! * Submission errors fail the attempt immediately and polling never starts.
//! * Errors returned by readiness checks are transient. They are counted and
//!   the next tick tries again.
//! * Ticks are serialized. A check is awaited before the next tick is taken
//!   and missed ticks are skipped, so checks never overlap.
//! * Every attempt carries a generation number. Results produced by an
//!   attempt that was cancelled or superseded are dropped.

use crate::backend::BackendErr;
use crate::settings;
use async_trait::async_trait;
use log::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use triomphe::Arc;

mod locks;
pub mod progress;

pub use locks::*;
pub use progress::ProgressKind;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
const EVENT_CAPACITY: usize = 16;

/// A daemon operation that is requested once and then polled until ready.
#[async_trait]
pub trait PollableOperation: Send + Sync + 'static {
    /// What the submission returns, usually a transaction or operation id.
    type Receipt: Clone + fmt::Debug + Send + Sync + 'static;

    /// Payload delivered on completion.
    type Outcome: Clone + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> ProgressKind;

    /// Short human readable description used in logs.
    fn label(&self) -> String;

    /// Key of the daemon resource this operation waits on. At most one
    /// tracker per key can be active in a [`ResourceLocks`] registry.
    fn resource_key(&self) -> Option<String> {
        None
    }

    /// Issues the state-changing request. Called exactly once per attempt.
    async fn submit(&self) -> Result<Self::Receipt, BackendErr>;

    /// Returns `Some` once the awaited condition holds.
    async fn check(&self, receipt: &Self::Receipt) -> Result<Option<Self::Outcome>, BackendErr>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Time between readiness checks.
    pub interval: Duration,

    /// Maximum time to wait after submission. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl TrackerConfig {
    pub fn bounded(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout: Some(timeout),
        }
    }

    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
        }
    }

    /// Waits for transaction confirmations and chain progress.
    pub fn confirmations(settings: &settings::Tracker) -> Self {
        Self::from_secs(
            settings.poll_interval_secs,
            settings.confirmation_timeout_secs,
        )
    }

    /// Waits for freshly registered identities.
    pub fn identities(settings: &settings::Tracker) -> Self {
        Self::from_secs(settings.poll_interval_secs, settings.identity_timeout_secs)
    }

    /// Waits for conversions and incoming funds.
    pub fn conversions(settings: &settings::Tracker) -> Self {
        Self::from_secs(
            settings.poll_interval_secs,
            settings.conversion_timeout_secs,
        )
    }

    /// A timeout of 0 means unbounded.
    fn from_secs(interval_secs: u64, timeout_secs: u64) -> Self {
        let interval = Duration::from_secs(interval_secs);
        match timeout_secs {
            0 => Self::unbounded(interval),
            secs => Self::bounded(interval, Duration::from_secs(secs)),
        }
    }

    fn normalized(mut self) -> Self {
        if self.interval < MIN_POLL_INTERVAL {
            warn!("Poll interval {:?} is too small, using {:?}", self.interval, MIN_POLL_INTERVAL);
            self.interval = MIN_POLL_INTERVAL;
        }
        self
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::bounded(DEFAULT_POLL_INTERVAL, DEFAULT_CONFIRMATION_TIMEOUT)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Submitting,
    Waiting,
    Succeeded,
    Failed,
}

impl Phase {
    /// Submitting or waiting.
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Submitting | Phase::Waiting)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum TrackerErr {
    /// The request was rejected. Holds the daemon's message.
    #[error("{0}")]
    Submission(String),

    #[error("gave up after waiting {waited_secs} seconds")]
    Timeout { waited_secs: u64 },

    #[error("the operation is already in progress")]
    AlreadyRunning,

    #[error("another operation is already waiting on {0}")]
    ResourceBusy(String),

    #[error("the operation was cancelled")]
    Cancelled,

    #[error("the operation has not been started")]
    NotStarted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackerEvent<T> {
    Succeeded(T),
    Failed(TrackerErr),
    Cancelled,
}

/// Snapshot of a tracker, recomputed on every call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackerStatus<R, T> {
    pub kind: ProgressKind,
    pub phase: Phase,
    pub elapsed_ms: u64,

    /// `elapsed_ms` as shown to the user, e.g. `1m 05s`.
    pub elapsed_text: String,
    pub polls: u32,
    pub transient_errors: u32,
    pub last_transient_error: Option<String>,
    pub message: String,
    pub receipt: Option<R>,
    pub outcome: Option<T>,
    pub error: Option<TrackerErr>,
}

struct State<R, T> {
    phase: Phase,
    generation: u64,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    polls: u32,
    transient_errors: u32,
    last_transient_error: Option<String>,
    receipt: Option<R>,
    outcome: Option<T>,
    error: Option<TrackerErr>,
    claim: Option<ResourceClaim>,
    task: Option<JoinHandle<()>>,
}

impl<R, T> State<R, T> {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            generation: 0,
            started_at: None,
            finished_at: None,
            polls: 0,
            transient_errors: 0,
            last_transient_error: None,
            receipt: None,
            outcome: None,
            error: None,
            claim: None,
            task: None,
        }
    }

    fn reset(&mut self) {
        self.started_at = None;
        self.finished_at = None;
        self.polls = 0;
        self.transient_errors = 0;
        self.last_transient_error = None;
        self.receipt = None;
        self.outcome = None;
        self.error = None;
    }

    fn elapsed(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(started_at), Some(finished_at)) => progress::elapsed(started_at, finished_at),
            (Some(started_at), None) => progress::elapsed(started_at, Instant::now()),
            _ => Duration::ZERO,
        }
    }
}

struct Shared<O: PollableOperation> {
    op: O,
    config: TrackerConfig,
    state: Mutex<State<O::Receipt, O::Outcome>>,
    events: broadcast::Sender<TrackerEvent<O::Outcome>>,
}

impl<O: PollableOperation> Shared<O> {
    /// Applies `f` if `generation` is still the current, active attempt.
    fn update(&self, generation: u64, f: impl FnOnce(&mut State<O::Receipt, O::Outcome>)) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation || !state.phase.is_active() {
            return false;
        }

        f(&mut state);
        true
    }

    /// Moves the attempt to its terminal phase and emits the completion
    /// event. Only the first call for an attempt has any effect.
    fn finish(&self, generation: u64, result: Result<O::Outcome, TrackerErr>) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation || !state.phase.is_active() {
            return false;
        }

        state.finished_at = Some(Instant::now());
        state.claim = None;
        state.task = None;

        let event = match result {
            Ok(outcome) => {
                state.phase = Phase::Succeeded;
                state.outcome = Some(outcome.clone());
                TrackerEvent::Succeeded(outcome)
            }
            Err(err) => {
                state.phase = Phase::Failed;
                state.error = Some(err.clone());
                TrackerEvent::Failed(err)
            }
        };

        // Nobody listening is fine
        let _ = self.events.send(event);
        true
    }

    fn time_out(&self, generation: u64, started_at: Instant) {
        let waited_secs = progress::elapsed(started_at, Instant::now()).as_secs();
        warn!("{}: no confirmation after {waited_secs}s, giving up", self.op.label());
        self.finish(generation, Err(TrackerErr::Timeout { waited_secs }));
    }
}

/// Drives one attempt: submit, then poll until ready, timed out or superseded.
async fn drive<O: PollableOperation>(shared: Arc<Shared<O>>, generation: u64) {
    let label = shared.op.label();
    debug!("{label}: submitting");

    let receipt = match shared.op.submit().await {
        Ok(receipt) => receipt,
        Err(err) => {
            warn!("{label}: submission failed: {err}");
            shared.finish(generation, Err(TrackerErr::Submission(err.user_message())));
            return;
        }
    };

    let started_at = Instant::now();
    // Timeouts past the end of the clock never fire
    let deadline = shared
        .config
        .timeout
        .and_then(|timeout| started_at.checked_add(timeout));
    let waiting = shared.update(generation, |state| {
        state.phase = Phase::Waiting;
        state.started_at = Some(started_at);
        state.receipt = Some(receipt.clone());
    });

    if !waiting {
        return;
    }

    info!(
        "{label}: submitted {receipt:?}, checking every {:?}",
        shared.config.interval
    );

    let mut ticker = time::interval(shared.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        match deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = ticker.tick() => {}
                    _ = time::sleep_until(deadline) => {
                        shared.time_out(generation, started_at);
                        return;
                    }
                }
            }
            None => {
                ticker.tick().await;
            }
        }

        let checked = match deadline {
            Some(deadline) => match time::timeout_at(deadline, shared.op.check(&receipt)).await {
                Ok(checked) => checked,
                Err(_) => {
                    shared.time_out(generation, started_at);
                    return;
                }
            },
            None => shared.op.check(&receipt).await,
        };

        match checked {
            Ok(Some(outcome)) => {
                shared.update(generation, |state| state.polls += 1);
                if shared.finish(generation, Ok(outcome)) {
                    info!("{label}: ready");
                }
                return;
            }
            Ok(None) => {
                if !shared.update(generation, |state| state.polls += 1) {
                    return;
                }
            }
            Err(err) => {
                debug!("{label}: check failed, retrying on next tick: {err}");
                let counted = shared.update(generation, |state| {
                    state.polls += 1;
                    state.transient_errors += 1;
                    state.last_transient_error = Some(err.to_string());
                });

                if !counted {
                    return;
                }
            }
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                shared.time_out(generation, started_at);
                return;
            }
        }
    }
}

/// Tracks one pollable operation. Must be used from within a Tokio runtime.
///
/// Dropping the tracker cancels it.
pub struct Tracker<O: PollableOperation> {
    shared: Arc<Shared<O>>,
    locks: ResourceLocks,
}

impl<O: PollableOperation> Tracker<O> {
    /// Creates a tracker guarded by the process-wide [`ResourceLocks`].
    pub fn new(op: O, config: TrackerConfig) -> Self {
        Self::with_locks(op, config, ResourceLocks::global())
    }

    pub fn with_locks(op: O, config: TrackerConfig, locks: ResourceLocks) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                op,
                config: config.normalized(),
                state: Mutex::new(State::new()),
                events,
            }),
            locks,
        }
    }

    pub fn operation(&self) -> &O {
        &self.shared.op
    }

    pub fn config(&self) -> TrackerConfig {
        self.shared.config
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.lock().phase
    }

    /// Time spent waiting in the current attempt.
    pub fn elapsed(&self) -> Duration {
        self.shared.state.lock().elapsed()
    }

    /// Starts a fresh attempt. Also used to retry after a failure.
    pub fn start(&self) -> Result<(), TrackerErr> {
        let mut state = self.shared.state.lock();
        if state.phase.is_active() {
            return Err(TrackerErr::AlreadyRunning);
        }

        let claim = match (state.claim.take(), self.shared.op.resource_key()) {
            (Some(claim), _) => Some(claim),
            (None, Some(key)) => Some(self.locks.claim(&key)?),
            (None, None) => None,
        };

        if let Some(stale) = state.task.take() {
            stale.abort();
        }

        state.reset();
        state.generation += 1;
        state.phase = Phase::Submitting;
        state.claim = claim;

        let generation = state.generation;
        state.task = Some(tokio::spawn(drive(self.shared.clone(), generation)));
        Ok(())
    }

    /// Stops polling. Safe to call any number of times, in any phase.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        state.generation += 1;
        state.claim = None;

        if let Some(task) = state.task.take() {
            task.abort();
        }

        if state.phase.is_active() {
            debug!("{}: cancelled", self.shared.op.label());
            state.phase = Phase::Idle;
            state.started_at = None;
            let _ = self.shared.events.send(TrackerEvent::Cancelled);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent<O::Outcome>> {
        self.shared.events.subscribe()
    }

    /// Waits for the current attempt to finish.
    pub async fn wait(&self) -> Result<O::Outcome, TrackerErr> {
        let mut events = self.shared.events.subscribe();

        {
            let state = self.shared.state.lock();
            match state.phase {
                Phase::Idle => return Err(TrackerErr::NotStarted),
                Phase::Succeeded => {
                    if let Some(outcome) = state.outcome.clone() {
                        return Ok(outcome);
                    }
                }
                Phase::Failed => {
                    if let Some(err) = state.error.clone() {
                        return Err(err);
                    }
                }
                Phase::Submitting | Phase::Waiting => {}
            }
        }

        loop {
            match events.recv().await {
                Ok(TrackerEvent::Succeeded(outcome)) => return Ok(outcome),
                Ok(TrackerEvent::Failed(err)) => return Err(err),
                Ok(TrackerEvent::Cancelled) | Err(RecvError::Closed) => {
                    return Err(TrackerErr::Cancelled)
                }
                Err(RecvError::Lagged(_)) => continue,
            }
        }
    }

    pub fn status(&self) -> TrackerStatus<O::Receipt, O::Outcome> {
        let kind = self.shared.op.kind();
        let state = self.shared.state.lock();
        let elapsed = state.elapsed();
        let message = match state.phase {
            Phase::Idle => String::new(),
            Phase::Submitting => "Submitting...".to_owned(),
            Phase::Waiting => progress::status_message(kind, elapsed).to_owned(),
            Phase::Succeeded => "Done".to_owned(),
            Phase::Failed => state
                .error
                .as_ref()
                .map(|err| err.to_string())
                .unwrap_or_default(),
        };

        TrackerStatus {
            kind,
            phase: state.phase,
            elapsed_ms: elapsed.as_millis() as u64,
            elapsed_text: progress::format_elapsed(elapsed),
            polls: state.polls,
            transient_errors: state.transient_errors,
            last_transient_error: state.last_transient_error.clone(),
            message,
            receipt: state.receipt.clone(),
            outcome: state.outcome.clone(),
            error: state.error.clone(),
        }
    }
}

impl<O: PollableOperation> Drop for Tracker<O> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<O: PollableOperation> fmt::Debug for Tracker<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Tracker")
            .field("operation", &self.shared.op.label())
            .field("phase", &state.phase)
            .field("generation", &state.generation)
            .finish()
    }
}
