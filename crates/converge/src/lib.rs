//! Corral convergence driver.
//!
//! [`await_state`] polls a refresh function until the observed lifecycle state reaches a target
//! set. It stops early when the object enters `error` or a state outside the expected sets, when
//! the deadline passes, or when the caller cancels. [`retry`] holds the fixed-delay conflict
//! retry used around side actions.

#![forbid(unsafe_code)]

use std::future::Future;
use std::time::Duration;

use corral_core::{EngineError, EngineResult, RemoteObject};
use metrics::{counter, histogram};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod retry;

pub use retry::{retry_conflict, ConflictRetry};

/// Synthetic state for an object the control plane no longer returns.
pub const REMOVED: &str = "removed";
/// Terminal failure state.
pub const ERROR: &str = "error";

/// States an object passes through on its way to `active` after a create.
pub const CREATE_PENDING: &[&str] = &["initializing", "configuring", "provisioning", "updating", "waiting", "active"];
/// States an object may report while a replace settles.
pub const UPDATE_PENDING: &[&str] = &["active", "updating", "configuring", "provisioning"];

/// What to wait for and how patiently.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceTarget {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    /// Wait before the first poll.
    pub delay: Duration,
    /// Wait after the first pending poll; also the floor for every later wait.
    pub min_timeout: Duration,
    /// Ceiling for the linearly growing wait.
    pub max_interval: Duration,
    pub timeout: Duration,
    /// Consecutive not-found reads tolerated when the target is not `removed`.
    pub not_found_tolerance: u32,
}

impl ConvergenceTarget {
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            delay: Duration::from_secs(1),
            min_timeout: Duration::from_secs(3),
            max_interval: Duration::from_secs(10),
            timeout,
            not_found_tolerance: 20,
        }
    }

    pub fn active_after_create(timeout: Duration) -> Self { Self::new(CREATE_PENDING, &["active"], timeout) }

    pub fn active_after_update(timeout: Duration) -> Self { Self::new(UPDATE_PENDING, &["active"], timeout) }

    pub fn removed(timeout: Duration) -> Self { Self::new(&["removing"], &[REMOVED], timeout) }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_intervals(mut self, min_timeout: Duration, max_interval: Duration) -> Self {
        self.min_timeout = min_timeout;
        self.max_interval = max_interval;
        self
    }

    pub fn with_not_found_tolerance(mut self, n: u32) -> Self {
        self.not_found_tolerance = n;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.target.is_empty() {
            return Err(EngineError::validation("convergence target set is empty"));
        }
        if self.timeout.is_zero() {
            return Err(EngineError::validation("convergence deadline must be positive"));
        }
        if self.min_timeout.is_zero() {
            return Err(EngineError::validation("minimum poll interval must be positive"));
        }
        Ok(())
    }

    pub fn expects_removal(&self) -> bool { self.target.iter().any(|s| s == REMOVED) }

    /// Wait after `pending_polls` consecutive pending observations.
    pub fn interval(&self, pending_polls: u32) -> Duration {
        self.min_timeout
            .saturating_mul(pending_polls.max(1))
            .min(self.max_interval)
            .max(self.min_timeout)
    }

    fn expected(&self) -> Vec<String> { self.pending.iter().chain(self.target.iter()).cloned().collect() }
}

/// One refresh result: the object plus the lifecycle state it reports.
#[derive(Debug, Clone)]
pub struct Observed<T> {
    pub object: T,
    pub state: String,
    pub message: String,
}

impl<T: RemoteObject> Observed<T> {
    pub fn of(object: T) -> Self {
        let state = object.state().to_string();
        let message = object.meta().transitioning_message.clone();
        Self { object, state, message }
    }
}

/// Poll `refresh` until the observed state is in `target.target`.
///
/// Returns `Ok(None)` when the object is gone and the target includes `removed`.
pub async fn await_state<T, F, Fut>(
    id: &str,
    target: &ConvergenceTarget,
    cancel: &CancellationToken,
    mut refresh: F,
) -> EngineResult<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<Observed<T>>>,
{
    target.validate()?;
    let started = Instant::now();
    let deadline = started + target.timeout;
    let mut last_state = String::new();
    let mut not_found = 0u32;
    let mut pending_polls = 0u32;
    let mut wait = target.delay;

    loop {
        let next = (Instant::now() + wait).min(deadline);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(id, &last_state)),
            _ = sleep_until(next) => {}
        }
        if Instant::now() >= deadline {
            counter!("converge_timeouts_total", 1u64);
            warn!(id, last_state = %last_state, timeout_s = target.timeout.as_secs(), "convergence deadline passed");
            return Err(EngineError::Timeout { id: id.to_string(), last_state });
        }

        counter!("converge_polls_total", 1u64);
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(id, &last_state)),
            r = refresh() => r,
        };

        match polled {
            Ok(obs) => {
                not_found = 0;
                debug!(id, state = %obs.state, poll = pending_polls + 1, "observed state");
                if target.target.iter().any(|s| *s == obs.state) {
                    histogram!("converge_wait_ms", started.elapsed().as_secs_f64() * 1000.0);
                    info!(id, state = %obs.state, elapsed_ms = started.elapsed().as_millis() as u64, "converged");
                    return Ok(Some(obs.object));
                }
                if obs.state == ERROR {
                    let message = if obs.message.is_empty() { ERROR.to_string() } else { obs.message };
                    return Err(EngineError::FailedState { id: id.to_string(), message });
                }
                if !target.pending.iter().any(|s| *s == obs.state) {
                    return Err(EngineError::UnexpectedState {
                        id: id.to_string(),
                        state: obs.state,
                        expected: target.expected(),
                    });
                }
                last_state = obs.state;
            }
            Err(e) if e.is_absent() => {
                if target.expects_removal() {
                    histogram!("converge_wait_ms", started.elapsed().as_secs_f64() * 1000.0);
                    info!(id, "object is gone");
                    return Ok(None);
                }
                not_found += 1;
                if not_found > target.not_found_tolerance {
                    return Err(e);
                }
                debug!(id, not_found, "not visible yet");
            }
            Err(e) => return Err(e),
        }

        pending_polls += 1;
        wait = target.interval(pending_polls);
    }
}

fn cancelled(id: &str, last_state: &str) -> EngineError {
    counter!("converge_cancelled_total", 1u64);
    EngineError::Cancelled { id: id.to_string(), last_state: last_state.to_string() }
}
