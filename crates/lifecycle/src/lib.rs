//! Corral lifecycle orchestrators.
//!
//! One [`Orchestrator`] per resource kind composes the mapper, the gateway and the convergence
//! driver into create/read/update/delete sequences. Every call takes an explicit [`Context`];
//! there is no global client.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use corral_converge::{await_state, retry_conflict, ConvergenceTarget, Observed};
use corral_core::{EngineError, EngineResult, Record, RemoteObject, ResourceKind};
use corral_gateway::{typed, RemoteGateway};
use metrics::counter;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod auth;
pub mod cluster;
pub mod lookup;
pub mod project;
pub mod settings;
pub mod standard;

pub use auth::AuthConfigOrchestrator;
pub use cluster::ClusterOrchestrator;
pub use lookup::lookup;
pub use project::ProjectOrchestrator;
pub use settings::{EngineSettings, SettingsError};
pub use standard::StandardOrchestrator;

/// Everything one orchestration call needs.
#[derive(Clone)]
pub struct Context {
    pub gateway: Arc<dyn RemoteGateway>,
    pub cancel: CancellationToken,
    pub settings: EngineSettings,
}

impl Context {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self { gateway, cancel: CancellationToken::new(), settings: EngineSettings::default() }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn gw(&self) -> &dyn RemoteGateway { self.gateway.as_ref() }

    pub fn target(&self, pending: &[&str], target: &[&str], timeout: Duration) -> ConvergenceTarget {
        self.settings.target(pending, target, timeout)
    }
}

/// Create/read/update/delete for one resource kind.
///
/// `read` and `delete` clear `id` when the object is gone; a failed `create` returns no id.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn create(&self, ctx: &Context, record: &mut Record, timeout: Duration) -> EngineResult<String>;

    async fn read(&self, ctx: &Context, id: &mut Option<String>, record: &mut Record, timeout: Duration) -> EngineResult<()>;

    async fn update(&self, ctx: &Context, id: &str, prior: &Record, record: &mut Record, timeout: Duration) -> EngineResult<()>;

    async fn delete(&self, ctx: &Context, id: &mut Option<String>, timeout: Duration) -> EngineResult<()>;
}

/// The orchestrator for `kind`, wrapped with per-operation spans and counters.
pub fn orchestrator_for(kind: ResourceKind) -> Box<dyn Orchestrator> {
    use corral_mapper::{alert::ClusterAlertRuleMapper, credential::CloudCredentialMapper, node_pool::NodePoolMapper};
    let inner: Box<dyn Orchestrator> = match kind {
        ResourceKind::Cluster => Box::new(ClusterOrchestrator),
        ResourceKind::Project => Box::new(ProjectOrchestrator),
        ResourceKind::NodePool => Box::new(StandardOrchestrator::<NodePoolMapper>::new()),
        ResourceKind::CloudCredential => Box::new(StandardOrchestrator::<CloudCredentialMapper>::without_convergence()),
        ResourceKind::ClusterAlertRule => Box::new(StandardOrchestrator::<ClusterAlertRuleMapper>::new()),
        ResourceKind::AuthConfig => Box::new(AuthConfigOrchestrator),
    };
    Box::new(Tracked(inner))
}

struct Tracked(Box<dyn Orchestrator>);

fn op_span(kind: ResourceKind, op: &'static str, id: Option<&str>) -> tracing::Span {
    info_span!("lifecycle", op_id = %Uuid::new_v4(), kind = %kind, op, id = id.unwrap_or_default())
}

fn record_outcome<T>(kind: ResourceKind, op: &'static str, res: &EngineResult<T>) {
    let outcome = match res {
        Ok(_) => "ok",
        Err(EngineError::Timeout { .. }) => "timeout",
        Err(EngineError::Cancelled { .. }) => "cancelled",
        Err(_) => "error",
    };
    counter!("lifecycle_ops_total", 1u64, "kind" => kind.as_str(), "op" => op, "outcome" => outcome);
    if let Err(e) = res {
        warn!(error = %e, "operation failed");
    }
}

#[async_trait]
impl Orchestrator for Tracked {
    fn kind(&self) -> ResourceKind { self.0.kind() }

    async fn create(&self, ctx: &Context, record: &mut Record, timeout: Duration) -> EngineResult<String> {
        let kind = self.kind();
        async {
            let res = self.0.create(ctx, record, timeout).await;
            record_outcome(kind, "create", &res);
            res
        }
        .instrument(op_span(kind, "create", None))
        .await
    }

    async fn read(&self, ctx: &Context, id: &mut Option<String>, record: &mut Record, timeout: Duration) -> EngineResult<()> {
        let kind = self.kind();
        let span = op_span(kind, "read", id.as_deref());
        async {
            let res = self.0.read(ctx, id, record, timeout).await;
            record_outcome(kind, "read", &res);
            res
        }
        .instrument(span)
        .await
    }

    async fn update(&self, ctx: &Context, id: &str, prior: &Record, record: &mut Record, timeout: Duration) -> EngineResult<()> {
        let kind = self.kind();
        async {
            let res = self.0.update(ctx, id, prior, record, timeout).await;
            record_outcome(kind, "update", &res);
            res
        }
        .instrument(op_span(kind, "update", Some(id)))
        .await
    }

    async fn delete(&self, ctx: &Context, id: &mut Option<String>, timeout: Duration) -> EngineResult<()> {
        let kind = self.kind();
        let span = op_span(kind, "delete", id.as_deref());
        async {
            let res = self.0.delete(ctx, id, timeout).await;
            record_outcome(kind, "delete", &res);
            res
        }
        .instrument(span)
        .await
    }
}

/// One poll: read the object and report its state.
pub async fn observe<T: RemoteObject>(gw: &dyn RemoteGateway, id: &str) -> EngineResult<Observed<T>> {
    typed::read::<T>(gw, id).await.map(Observed::of)
}

/// Wait for `id` to reach `target`, reading it through the context's gateway.
pub async fn converge<T: RemoteObject>(ctx: &Context, id: &str, target: &ConvergenceTarget) -> EngineResult<Option<T>> {
    let gw = ctx.gw();
    await_state(id, target, &ctx.cancel, move || observe::<T>(gw, id)).await
}

/// Wait for `id` to become active; absence at the end of the wait is an error.
pub async fn converge_active<T: RemoteObject>(ctx: &Context, id: &str, target: &ConvergenceTarget) -> EngineResult<T> {
    converge::<T>(ctx, id, target)
        .await?
        .ok_or_else(|| EngineError::UnexpectedState { id: id.to_string(), state: corral_converge::REMOVED.into(), expected: target.target.clone() })
}

/// Delete `id` and wait until it is gone. A missing object counts as deleted.
pub async fn delete_and_wait<T: RemoteObject>(ctx: &Context, id: &mut Option<String>, timeout: Duration) -> EngineResult<()> {
    let Some(current) = id.clone() else { return Ok(()) };
    match ctx.gw().delete(T::KIND, &current).await {
        Ok(()) => {}
        Err(e) if e.is_absent() => {
            info!(id = %current, "already gone");
            *id = None;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }
    let target = ctx.target(&["removing"], &[corral_converge::REMOVED], timeout);
    converge::<T>(ctx, &current, &target).await?;
    info!(id = %current, "removed");
    *id = None;
    Ok(())
}

/// Read `id`; absence (or a `removed` state) clears the identity and yields `None`.
pub async fn read_or_clear<T: RemoteObject>(ctx: &Context, id: &mut Option<String>, timeout: Duration) -> EngineResult<Option<T>> {
    let Some(current) = id.clone() else { return Ok(None) };
    let found = within(ctx, &current, timeout, typed::read_opt::<T>(ctx.gw(), &current)).await?;
    match found {
        Some(obj) if obj.state() != corral_converge::REMOVED => Ok(Some(obj)),
        _ => {
            info!(id = %current, "object is gone, clearing identity");
            *id = None;
            Ok(None)
        }
    }
}

/// One time budget shared by every step of an operation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self { Self(Instant::now() + timeout) }

    /// Budget left for the next step on `id`. A spent budget is a timeout.
    pub fn remaining(&self, id: &str) -> EngineResult<Duration> {
        let left = self.0.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(EngineError::Timeout { id: id.to_string(), last_state: String::new() });
        }
        Ok(left)
    }
}

/// Run a single gateway exchange under the operation deadline and cancellation.
pub async fn within<T, F>(ctx: &Context, id: &str, timeout: Duration, fut: F) -> EngineResult<T>
where
    F: std::future::Future<Output = EngineResult<T>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(EngineError::Cancelled { id: id.to_string(), last_state: String::new() }),
        r = tokio::time::timeout(timeout, fut) => match r {
            Ok(r) => r,
            Err(_) => Err(EngineError::Timeout { id: id.to_string(), last_state: String::new() }),
        },
    }
}

/// Invoke a side action under the conflict-retry policy. Every attempt re-reads the object and
/// builds the action input from that fresh copy.
pub async fn action_with_retry<T, F>(ctx: &Context, id: &str, name: &str, input: F) -> EngineResult<Option<serde_json::Value>>
where
    T: RemoteObject,
    F: Fn(&T) -> EngineResult<Option<serde_json::Value>> + Sync,
{
    let gw = ctx.gw();
    let input = &input;
    retry_conflict(&ctx.settings.conflict, &ctx.cancel, name, move || async move {
        let fresh = typed::read::<T>(gw, id).await?;
        let body = input(&fresh)?;
        info!(kind = %T::KIND, id, action = name, "invoking action");
        Ok(gw.action(T::KIND, id, name, body).await?)
    })
    .await
}
