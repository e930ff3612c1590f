use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use corral_converge::{await_state, ConvergenceTarget, Observed};
use corral_core::{EngineError, EngineResult, RemoteError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Refresh double: replays `states` (the last one repeats) and counts polls with their times.
#[derive(Clone)]
struct Script {
    steps: Arc<Vec<Result<&'static str, RemoteError>>>,
    polls: Arc<AtomicU32>,
    at: Arc<Mutex<Vec<Instant>>>,
}

impl Script {
    fn new(steps: Vec<Result<&'static str, RemoteError>>) -> Self {
        Self { steps: Arc::new(steps), polls: Arc::new(AtomicU32::new(0)), at: Arc::new(Mutex::new(Vec::new())) }
    }

    fn states(states: &[&'static str]) -> Self { Self::new(states.iter().map(|s| Ok(*s)).collect()) }

    fn refresh(&self) -> impl FnMut() -> std::future::Ready<EngineResult<Observed<u32>>> + '_ {
        move || {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            self.at.lock().unwrap().push(Instant::now());
            let step = self.steps.get(n as usize).or_else(|| self.steps.last()).cloned().unwrap();
            std::future::ready(match step {
                Ok(state) => Ok(Observed { object: n, state: state.to_string(), message: format!("msg {}", n) }),
                Err(e) => Err(e.into()),
            })
        }
    }

    fn polls(&self) -> u32 { self.polls.load(Ordering::SeqCst) }

    fn gaps(&self) -> Vec<Duration> {
        let at = self.at.lock().unwrap();
        at.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

fn create_target(timeout_s: u64) -> ConvergenceTarget {
    ConvergenceTarget::new(&["initializing", "configuring"], &["active"], Duration::from_secs(timeout_s))
}

#[tokio::test(start_paused = true)]
async fn converges_with_growing_waits() {
    let script = Script::states(&["initializing", "configuring", "configuring", "active"]);
    let started = Instant::now();
    let got = await_state("c-1", &create_target(600), &CancellationToken::new(), script.refresh()).await.unwrap();
    assert_eq!(got, Some(3));
    assert_eq!(script.polls(), 4);
    // first poll after the 1s delay, then 3s, 6s, 9s
    assert_eq!(script.gaps(), vec![Duration::from_secs(3), Duration::from_secs(6), Duration::from_secs(9)]);
    assert!(started.elapsed() >= Duration::from_secs(19));
}

#[tokio::test(start_paused = true)]
async fn polls_never_come_faster_than_min_timeout() {
    let script = Script::states(&["configuring"]);
    let target = create_target(120);
    let err = await_state("c-1", &target, &CancellationToken::new(), script.refresh()).await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }));
    assert!(script.gaps().iter().all(|g| *g >= target.min_timeout));
    assert!(script.gaps().iter().all(|g| *g <= target.max_interval));
    // 1 + 3 + 6 + 9 + 10 * 10 = 119, so at most 15 polls fit in two minutes
    assert!(script.polls() <= 15, "{} polls", script.polls());
}

#[tokio::test(start_paused = true)]
async fn timeout_carries_last_state() {
    let script = Script::states(&["provisioning"]);
    let target = ConvergenceTarget::new(&["provisioning"], &["active"], Duration::from_secs(30));
    match await_state("c-9", &target, &CancellationToken::new(), script.refresh()).await.unwrap_err() {
        EngineError::Timeout { id, last_state } => {
            assert_eq!(id, "c-9");
            assert_eq!(last_state, "provisioning");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn error_state_is_a_distinct_failure() {
    let script = Script::states(&["configuring", "error"]);
    match await_state("c-1", &create_target(600), &CancellationToken::new(), script.refresh()).await.unwrap_err() {
        EngineError::FailedState { id, message } => {
            assert_eq!(id, "c-1");
            assert_eq!(message, "msg 1");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn state_outside_both_sets_stops_the_wait() {
    let script = Script::states(&["updating"]);
    match await_state("p-1", &create_target(600), &CancellationToken::new(), script.refresh()).await.unwrap_err() {
        EngineError::UnexpectedState { state, expected, .. } => {
            assert_eq!(state, "updating");
            assert_eq!(expected, vec!["initializing", "configuring", "active"]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(script.polls(), 1);
}

#[tokio::test(start_paused = true)]
async fn not_found_is_success_when_waiting_for_removal() {
    let script = Script::new(vec![Ok("removing"), Err(RemoteError::not_found("gone"))]);
    let target = ConvergenceTarget::removed(Duration::from_secs(60));
    let got = await_state("p-1", &target, &CancellationToken::new(), script.refresh()).await.unwrap();
    assert_eq!(got, None);
    assert_eq!(script.polls(), 2);
}

#[tokio::test(start_paused = true)]
async fn not_found_after_create_is_tolerated_up_to_a_bound() {
    let script = Script::new(vec![Err(RemoteError::not_found("not yet")), Err(RemoteError::not_found("not yet")), Ok("active")]);
    let got = await_state("np-1", &create_target(600), &CancellationToken::new(), script.refresh()).await.unwrap();
    assert_eq!(got, Some(2));

    let gone = Script::new(vec![Err(RemoteError::not_found("never"))]);
    let target = create_target(600).with_not_found_tolerance(2);
    let err = await_state("np-1", &target, &CancellationToken::new(), gone.refresh()).await.unwrap_err();
    assert!(err.is_absent());
    assert_eq!(gone.polls(), 3);
}

#[tokio::test(start_paused = true)]
async fn other_remote_errors_propagate_unchanged() {
    let script = Script::new(vec![Err(RemoteError::from_status(500, "boom"))]);
    let err = await_state("c-1", &create_target(600), &CancellationToken::new(), script.refresh()).await.unwrap_err();
    assert_eq!(err.remote().and_then(|r| r.status), Some(500));
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_polling_immediately() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let script = Script::states(&["configuring"]);
    let err = await_state("c-1", &create_target(600), &cancel, script.refresh()).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled { .. }));
    assert_eq!(script.polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_wait_reports_last_state() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });
    let script = Script::states(&["configuring"]);
    match await_state("c-1", &create_target(600), &cancel, script.refresh()).await.unwrap_err() {
        EngineError::Cancelled { last_state, .. } => assert_eq!(last_state, "configuring"),
        other => panic!("unexpected {other:?}"),
    }
    // polls at 1s and 4s; the next one would have been at 10s
    assert_eq!(script.polls(), 2);
}

#[tokio::test(start_paused = true)]
async fn invalid_target_never_polls() {
    let script = Script::states(&["active"]);
    let target = ConvergenceTarget::new(&["configuring"], &[], Duration::from_secs(10));
    let err = await_state("c-1", &target, &CancellationToken::new(), script.refresh()).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(script.polls(), 0);
}
