//! Clusters: standard convergence plus the computed fields the server only exposes through
//! side channels (project ids by listing, kubeconfig by action).

use std::time::Duration;

use async_trait::async_trait;
use corral_converge::{CREATE_PENDING, UPDATE_PENDING};
use corral_core::{EngineResult, Record, RemoteObject, ResourceKind};
use corral_gateway::{typed, Filters};
use corral_mapper::cluster::{Cluster, ClusterMapper};
use corral_mapper::project::Project;
use corral_mapper::Mapper;
use tracing::{info, warn};

use crate::{converge_active, delete_and_wait, read_or_clear, within, Context, Deadline, Orchestrator};

pub const GENERATE_KUBECONFIG: &str = "generateKubeconfig";

/// Imported clusters sit in `pending` until their agent registers.
const IMPORTED_TARGET: &[&str] = &["active", "pending"];

#[derive(Debug, Default)]
pub struct ClusterOrchestrator;

async fn project_id(ctx: &Context, cluster_id: &str, name: &str) -> EngineResult<Option<String>> {
    let filters: Filters = [("clusterId".to_string(), cluster_id.to_string()), ("name".to_string(), name.to_string())].into();
    let found = typed::list::<Project>(ctx.gw(), &filters).await?;
    Ok(found.into_iter().next().map(|p| p.meta.id))
}

/// Fill `default_project_id` / `system_project_id` when the record lacks them.
async fn discover_projects(ctx: &Context, cluster_id: &str, record: &mut Record) -> EngineResult<()> {
    for (field, name) in [("default_project_id", "Default"), ("system_project_id", "System")] {
        if record.is_set(field) {
            continue;
        }
        match project_id(ctx, cluster_id, name).await? {
            Some(id) => {
                record.insert(field, id);
            }
            None => warn!(cluster_id, project = name, "project not listed yet"),
        }
    }
    Ok(())
}

/// `cluster` must come from a read made after the last convergence so its actions are current.
async fn generate_kubeconfig(ctx: &Context, cluster: &Cluster, record: &mut Record) -> EngineResult<()> {
    if !cluster.meta.allows(GENERATE_KUBECONFIG) {
        warn!(id = cluster.id(), "server does not offer {}", GENERATE_KUBECONFIG);
        return Ok(());
    }
    let out = ctx.gw().action(ResourceKind::Cluster, cluster.id(), GENERATE_KUBECONFIG, None).await?;
    match out.as_ref().and_then(|v| v.get("config")).and_then(|c| c.as_str()).filter(|s| !s.is_empty()) {
        Some(cfg) => {
            record.insert("kube_config", cfg);
            info!(id = cluster.id(), "kubeconfig generated");
        }
        None => warn!(id = cluster.id(), "kubeconfig action returned no config; keeping previous value"),
    }
    Ok(())
}

fn create_target(ctx: &Context, imported: bool, timeout: Duration) -> corral_converge::ConvergenceTarget {
    if imported {
        ctx.target(CREATE_PENDING, IMPORTED_TARGET, timeout)
    } else {
        ctx.target(CREATE_PENDING, &["active"], timeout)
    }
}

#[async_trait]
impl Orchestrator for ClusterOrchestrator {
    fn kind(&self) -> ResourceKind { ResourceKind::Cluster }

    async fn create(&self, ctx: &Context, record: &mut Record, timeout: Duration) -> EngineResult<String> {
        let deadline = Deadline::after(timeout);
        let obj = ClusterMapper.expand(record)?;
        let imported = obj.engine()?.is_none();
        let created = within(ctx, &obj.meta.name, deadline.remaining(&obj.meta.name)?, typed::create(ctx.gw(), &obj)).await?;
        let id = created.id().to_string();
        info!(%id, imported, "cluster created");

        let target = create_target(ctx, imported, deadline.remaining(&id)?);
        let active = converge_active::<Cluster>(ctx, &id, &target).await?;
        ClusterMapper.flatten(&active, record)?;
        discover_projects(ctx, &id, record).await?;
        generate_kubeconfig(ctx, &active, record).await?;
        Ok(id)
    }

    async fn read(&self, ctx: &Context, id: &mut Option<String>, record: &mut Record, timeout: Duration) -> EngineResult<()> {
        let Some(cluster) = read_or_clear::<Cluster>(ctx, id, timeout).await? else { return Ok(()) };
        ClusterMapper.flatten(&cluster, record)?;
        discover_projects(ctx, cluster.id(), record).await
    }

    async fn update(&self, ctx: &Context, id: &str, prior: &Record, record: &mut Record, timeout: Duration) -> EngineResult<()> {
        let deadline = Deadline::after(timeout);
        let endpoint_changed = prior.changed(record, "cluster_auth_endpoint");
        let mut obj = ClusterMapper.expand(record)?;
        let server = within(ctx, id, deadline.remaining(id)?, typed::read::<Cluster>(ctx.gw(), id)).await?;
        obj.adopt_server_meta(&server.meta);
        obj.driver = server.driver.clone();
        within(ctx, id, deadline.remaining(id)?, typed::replace(ctx.gw(), &obj)).await?;
        info!(id, "cluster replaced");

        let target = ctx.target(UPDATE_PENDING, &["active"], deadline.remaining(id)?);
        let active = converge_active::<Cluster>(ctx, id, &target).await?;
        ClusterMapper.flatten(&active, record)?;
        discover_projects(ctx, id, record).await?;
        if endpoint_changed {
            generate_kubeconfig(ctx, &active, record).await?;
        }
        Ok(())
    }

    async fn delete(&self, ctx: &Context, id: &mut Option<String>, timeout: Duration) -> EngineResult<()> {
        delete_and_wait::<Cluster>(ctx, id, timeout).await
    }
}
