//! Fixed-delay retry for operations the control plane may reject with a conflict.

use std::future::Future;
use std::time::Duration;

use corral_core::{EngineError, EngineResult};
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConflictRetry {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ConflictRetry {
    fn default() -> Self { Self { attempts: 3, delay: Duration::from_secs(3) } }
}

/// Run `operation` until it succeeds, fails with something other than a conflict, or the
/// attempts run out. The operation is expected to re-read whatever it acts on.
pub async fn retry_conflict<F, Fut, T>(
    policy: &ConflictRetry,
    cancel: &CancellationToken,
    operation_name: &str,
    mut operation: F,
) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let max = policy.attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_conflict() && attempt < max => {
                counter!("conflict_retries_total", 1u64, "op" => operation_name.to_string());
                warn!(operation = %operation_name, attempt, error = %e, delay_ms = policy.delay.as_millis() as u64, "conflict, retrying");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(EngineError::Cancelled { id: operation_name.to_string(), last_state: "conflict".into() });
                    }
                    _ = tokio::time::sleep(policy.delay) => {}
                }
            }
            Err(e) => {
                if e.is_conflict() {
                    error!(operation = %operation_name, attempt, error = %e, "conflict persisted after max retries");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::RemoteError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn conflict() -> EngineError { RemoteError::conflict("object has been modified").into() }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_conflicts() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let started = tokio::time::Instant::now();
        let out = retry_conflict(&ConflictRetry::default(), &CancellationToken::new(), "set_psp", || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 { Err(conflict()) } else { Ok("done") }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, "done");
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let err = retry_conflict::<_, _, ()>(&ConflictRetry::default(), &CancellationToken::new(), "op", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(conflict())
            }
        })
        .await
        .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let err = retry_conflict::<_, _, ()>(&ConflictRetry::default(), &CancellationToken::new(), "op", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::other("boom").into())
            }
        })
        .await
        .unwrap_err();
        assert!(!err.is_conflict());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_the_delay() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = retry_conflict::<_, _, ()>(&ConflictRetry::default(), &cancel, "op", || async { Err(conflict()) })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled { .. }));
    }
}
