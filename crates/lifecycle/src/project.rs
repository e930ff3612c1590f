//! Projects: parent-cluster precondition, monitoring toggles and the pod security policy
//! template, each applied through its own side action.

use std::time::Duration;

use async_trait::async_trait;
use corral_converge::{CREATE_PENDING, UPDATE_PENDING};
use corral_core::{EngineError, EngineResult, Record, RemoteObject, ResourceKind};
use corral_gateway::typed;
use corral_mapper::cluster::Cluster;
use corral_mapper::project::{monitoring_input, MonitoringInput, Project, ProjectMapper, MONITORING_INPUT_ANNOTATION};
use corral_mapper::{Mapper, Reader};
use serde_json::{json, Value as Json};
use tracing::info;

use crate::{action_with_retry, converge_active, delete_and_wait, read_or_clear, within, Context, Deadline, Orchestrator};

pub const ENABLE_MONITORING: &str = "enableMonitoring";
pub const DISABLE_MONITORING: &str = "disableMonitoring";
pub const EDIT_MONITORING: &str = "editMonitoring";
pub const SET_PSP_TEMPLATE: &str = "setpodsecuritypolicytemplate";

const CREATE_PENDING_STATES: &[&str] = &["initializing", "configuring"];

#[derive(Debug, Default)]
pub struct ProjectOrchestrator;

/// Fail or wait, per `wait`, unless the parent cluster is already active.
async fn ensure_cluster_active(ctx: &Context, cluster_id: &str, wait: bool, deadline: Deadline) -> EngineResult<()> {
    let cluster = within(ctx, cluster_id, deadline.remaining(cluster_id)?, typed::read::<Cluster>(ctx.gw(), cluster_id)).await?;
    if cluster.state() == "active" {
        return Ok(());
    }
    if !wait {
        return Err(EngineError::UnexpectedState {
            id: cluster_id.to_string(),
            state: cluster.state().to_string(),
            expected: vec!["active".into()],
        });
    }
    info!(cluster_id, state = cluster.state(), "waiting for parent cluster");
    let target = ctx.target(CREATE_PENDING, &["active"], deadline.remaining(cluster_id)?);
    converge_active::<Cluster>(ctx, cluster_id, &target).await?;
    Ok(())
}

fn monitoring_body(input: Option<MonitoringInput>) -> EngineResult<Option<Json>> {
    Ok(match input {
        Some(i) => Some(serde_json::to_value(i)?),
        None => None,
    })
}

/// Apply the template through its action, then read back and verify it took.
async fn set_psp_template(ctx: &Context, id: &str, template: &str) -> EngineResult<()> {
    let body = json!({ "podSecurityPolicyTemplateId": template });
    action_with_retry::<Project, _>(ctx, id, SET_PSP_TEMPLATE, |_| Ok(Some(body.clone()))).await?;
    let after = typed::read::<Project>(ctx.gw(), id).await?;
    let applied = after.pod_security_policy_template_id.as_deref().unwrap_or_default();
    if applied != template {
        return Err(EngineError::validation(format!(
            "{}: pod security policy template {:?} not applied, server reports {:?}",
            id, template, applied
        )));
    }
    info!(id, template, "pod security policy template set");
    Ok(())
}

/// Pick the monitoring action the server currently offers for the desired state.
fn monitoring_action(fresh: &Project, enabled: bool) -> Option<&'static str> {
    match enabled {
        false if fresh.meta.allows(DISABLE_MONITORING) => Some(DISABLE_MONITORING),
        false => None,
        true if fresh.meta.allows(ENABLE_MONITORING) => Some(ENABLE_MONITORING),
        true => Some(EDIT_MONITORING),
    }
}

async fn toggle_monitoring(ctx: &Context, id: &str, enabled: bool, input: Option<MonitoringInput>) -> EngineResult<()> {
    let fresh = typed::read::<Project>(ctx.gw(), id).await?;
    let Some(action) = monitoring_action(&fresh, enabled) else {
        info!(id, "monitoring already off");
        return Ok(());
    };
    let body = if action == DISABLE_MONITORING { None } else { monitoring_body(input)? };
    action_with_retry::<Project, _>(ctx, id, action, |_| Ok(body.clone())).await?;
    info!(id, action, "monitoring updated");
    Ok(())
}

#[async_trait]
impl Orchestrator for ProjectOrchestrator {
    fn kind(&self) -> ResourceKind { ResourceKind::Project }

    async fn create(&self, ctx: &Context, record: &mut Record, timeout: Duration) -> EngineResult<String> {
        let deadline = Deadline::after(timeout);
        let mut obj = ProjectMapper.expand(record)?;
        let input = monitoring_input(record)?;
        let wait_for_cluster = Reader::new(record).bool("wait_for_cluster")?.unwrap_or(true);
        let monitoring = std::mem::replace(&mut obj.enable_project_monitoring, false);
        let template = obj.pod_security_policy_template_id.take();

        ensure_cluster_active(ctx, &obj.cluster_id, wait_for_cluster, deadline).await?;

        let created = within(ctx, &obj.meta.name, deadline.remaining(&obj.meta.name)?, typed::create(ctx.gw(), &obj)).await?;
        let id = created.id().to_string();
        info!(%id, cluster_id = %obj.cluster_id, "project created");
        let target = ctx.target(CREATE_PENDING_STATES, &["active"], deadline.remaining(&id)?);
        converge_active::<Project>(ctx, &id, &target).await?;

        if monitoring {
            let body = monitoring_body(input)?;
            action_with_retry::<Project, _>(ctx, &id, ENABLE_MONITORING, |_| Ok(body.clone())).await?;
            info!(%id, "monitoring enabled");
        }
        if let Some(template) = template {
            set_psp_template(ctx, &id, &template).await?;
        }

        let fresh = typed::read::<Project>(ctx.gw(), &id).await?;
        ProjectMapper.flatten(&fresh, record)?;
        Ok(id)
    }

    async fn read(&self, ctx: &Context, id: &mut Option<String>, record: &mut Record, timeout: Duration) -> EngineResult<()> {
        if let Some(project) = read_or_clear::<Project>(ctx, id, timeout).await? {
            ProjectMapper.flatten(&project, record)?;
        }
        Ok(())
    }

    async fn update(&self, ctx: &Context, id: &str, prior: &Record, record: &mut Record, timeout: Duration) -> EngineResult<()> {
        let deadline = Deadline::after(timeout);
        let mut obj = ProjectMapper.expand(record)?;
        let server = within(ctx, id, deadline.remaining(id)?, typed::read::<Project>(ctx.gw(), id)).await?;
        obj.adopt_server_meta(&server.meta);
        // both are owned by their side actions
        obj.enable_project_monitoring = server.enable_project_monitoring;
        obj.pod_security_policy_template_id = server.pod_security_policy_template_id.clone();
        if let Some(applied) = server.meta.annotations.get(MONITORING_INPUT_ANNOTATION) {
            obj.meta.annotations.entry(MONITORING_INPUT_ANNOTATION.to_string()).or_insert_with(|| applied.clone());
        }
        within(ctx, id, deadline.remaining(id)?, typed::replace(ctx.gw(), &obj)).await?;
        info!(id, "project replaced");
        let target = ctx.target(UPDATE_PENDING, &["active"], deadline.remaining(id)?);
        converge_active::<Project>(ctx, id, &target).await?;

        if prior.changed(record, "pod_security_policy_template_id") {
            let template = record.str_field("pod_security_policy_template_id").unwrap_or_default().to_string();
            set_psp_template(ctx, id, &template).await?;
        }
        if prior.changed(record, "enable_project_monitoring") || prior.changed(record, "project_monitoring_input") {
            let enabled = Reader::new(record).bool("enable_project_monitoring")?.unwrap_or(false);
            toggle_monitoring(ctx, id, enabled, monitoring_input(record)?).await?;
        }

        let fresh = typed::read::<Project>(ctx.gw(), id).await?;
        ProjectMapper.flatten(&fresh, record)
    }

    async fn delete(&self, ctx: &Context, id: &mut Option<String>, timeout: Duration) -> EngineResult<()> {
        delete_and_wait::<Project>(ctx, id, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::RemoteError;
    use crate::EngineSettings;
    use corral_gateway::{MockGateway, Op, ReadStep};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn project() -> Record {
        Record::new().with("name", "payments").with("cluster_id", "c-1").with("wait_for_cluster", true)
    }

    fn gateway() -> MockGateway {
        let gw = MockGateway::new();
        gw.insert(ResourceKind::Cluster, json!({ "id": "c-1", "name": "web", "state": "active" }));
        gw.on_action(ResourceKind::Project, ENABLE_MONITORING, |obj, input| {
            obj["enableProjectMonitoring"] = json!(true);
            let raw = input.map(|i| i.to_string()).unwrap_or_default();
            obj["annotations"] = json!({ "field.cattle.io/overwriteAppAnswers": raw });
            Ok(None)
        });
        gw.on_action(ResourceKind::Project, DISABLE_MONITORING, |obj, _| {
            obj["enableProjectMonitoring"] = json!(false);
            Ok(None)
        });
        gw.on_action(ResourceKind::Project, SET_PSP_TEMPLATE, |obj, input| {
            obj["podSecurityPolicyTemplateId"] = input.map(|i| i["podSecurityPolicyTemplateId"].clone()).unwrap_or(Json::Null);
            Ok(None)
        });
        gw
    }

    #[test]
    fn monitoring_action_follows_offered_actions() {
        let mut p = Project::default();
        assert_eq!(monitoring_action(&p, false), None);
        assert_eq!(monitoring_action(&p, true), Some(EDIT_MONITORING));
        p.meta.actions = BTreeMap::from([(ENABLE_MONITORING.to_string(), "u".to_string())]);
        assert_eq!(monitoring_action(&p, true), Some(ENABLE_MONITORING));
        p.meta.actions = BTreeMap::from([(DISABLE_MONITORING.to_string(), "u".to_string())]);
        assert_eq!(monitoring_action(&p, false), Some(DISABLE_MONITORING));
    }

    #[tokio::test(start_paused = true)]
    async fn create_enables_monitoring_after_active() {
        let gw = gateway();
        let ctx = Context::new(Arc::new(gw.clone()));
        let mut rec = project().with("enable_project_monitoring", true).with(
            "project_monitoring_input",
            vec![Record::new().with("answers", BTreeMap::from([("prometheus.retention".to_string(), "12h".to_string())]))],
        );
        let id = ProjectOrchestrator.create(&ctx, &mut rec, Duration::from_secs(60)).await.unwrap();

        let created = gw.calls().into_iter().find(|c| c.op == Op::Create).unwrap();
        assert_eq!(created.input.unwrap()["enableProjectMonitoring"], false);
        let enable = gw.position(ResourceKind::Project, &Op::action(ENABLE_MONITORING)).unwrap();
        assert!(enable > gw.position(ResourceKind::Project, &Op::Read).unwrap());
        assert_eq!(gw.get(ResourceKind::Project, &id).unwrap()["enableProjectMonitoring"], true);
        assert_eq!(rec.get("enable_project_monitoring"), Some(&true.into()));
        let input = monitoring_input(&rec).unwrap().unwrap();
        assert_eq!(input.answers.get("prometheus.retention").map(String::as_str), Some("12h"));
    }

    #[tokio::test(start_paused = true)]
    async fn psp_template_is_retried_on_conflict_and_verified() {
        let gw = gateway();
        gw.fail(ResourceKind::Project, Op::action(SET_PSP_TEMPLATE), RemoteError::from_status(409, "modified"), 2);
        let ctx = Context::new(Arc::new(gw.clone()));
        let mut rec = project().with("pod_security_policy_template_id", "restricted");
        ProjectOrchestrator.create(&ctx, &mut rec, Duration::from_secs(60)).await.unwrap();
        assert_eq!(gw.count(ResourceKind::Project, &Op::action(SET_PSP_TEMPLATE)), 3);
        assert_eq!(rec.str_field("pod_security_policy_template_id"), Some("restricted"));
        let created = gw.calls().into_iter().find(|c| c.op == Op::Create).unwrap();
        assert!(created.input.unwrap().get("podSecurityPolicyTemplateId").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn psp_template_that_does_not_stick_is_an_error() {
        let gw = MockGateway::new();
        gw.insert(ResourceKind::Cluster, json!({ "id": "c-1", "name": "web", "state": "active" }));
        let ctx = Context::new(Arc::new(gw.clone()));
        let mut rec = project().with("pod_security_policy_template_id", "restricted");
        let err = ProjectOrchestrator.create(&ctx, &mut rec, Duration::from_secs(60)).await.unwrap_err();
        assert!(err.to_string().contains("not applied"), "{}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_for_the_cluster_spends_the_project_budget() {
        let gw = gateway();
        gw.insert(ResourceKind::Cluster, json!({ "id": "c-2", "name": "slow", "state": "provisioning" }));
        let mut cluster_reads = vec![ReadStep::state("provisioning"); 39];
        cluster_reads.push(ReadStep::state("active"));
        gw.script(ResourceKind::Cluster, "c-2", cluster_reads);
        let mut project_reads = vec![ReadStep::state("initializing"); 30];
        project_reads.push(ReadStep::state("active"));
        gw.script(ResourceKind::Project, "payments", project_reads);

        let every_second = EngineSettings {
            poll_delay: Duration::from_secs(1),
            poll_min: Duration::from_secs(1),
            poll_max: Duration::from_secs(1),
            ..Default::default()
        };
        let ctx = Context::new(Arc::new(gw.clone())).with_settings(every_second);
        let started = tokio::time::Instant::now();
        let mut rec = project().with("cluster_id", "c-2");
        let err = ProjectOrchestrator.create(&ctx, &mut rec, Duration::from_secs(60)).await.unwrap_err();

        assert!(matches!(err, EngineError::Timeout { .. }), "{}", err);
        assert!(started.elapsed() <= Duration::from_secs(60), "{:?}", started.elapsed());
        assert_eq!(gw.count(ResourceKind::Project, &Op::Create), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn update_toggles_monitoring_only_when_it_changed() {
        let gw = gateway();
        let ctx = Context::new(Arc::new(gw.clone()));
        let mut rec = project();
        let id = ProjectOrchestrator.create(&ctx, &mut rec, Duration::from_secs(60)).await.unwrap();

        let prior = rec.clone();
        rec.insert("description", "renamed");
        ProjectOrchestrator.update(&ctx, &id, &prior, &mut rec, Duration::from_secs(60)).await.unwrap();
        assert_eq!(gw.count(ResourceKind::Project, &Op::action(EDIT_MONITORING)), 0);
        assert_eq!(gw.count(ResourceKind::Project, &Op::action(ENABLE_MONITORING)), 0);

        // the server offers enableMonitoring while monitoring is off
        let mut obj = gw.get(ResourceKind::Project, &id).unwrap();
        obj["actions"] = json!({ "enableMonitoring": "/v3/projects/x?action=enableMonitoring" });
        gw.insert(ResourceKind::Project, obj);

        let prior = rec.clone();
        rec.insert("enable_project_monitoring", true);
        ProjectOrchestrator.update(&ctx, &id, &prior, &mut rec, Duration::from_secs(60)).await.unwrap();
        assert_eq!(gw.count(ResourceKind::Project, &Op::action(ENABLE_MONITORING)), 1);
        assert_eq!(rec.get("enable_project_monitoring"), Some(&true.into()));
        let replaced = gw.calls().into_iter().filter(|c| c.op == Op::Replace).last().unwrap();
        assert_eq!(replaced.input.unwrap()["enableProjectMonitoring"], false);
    }
}
