//! Command bodies: reconcile documents against the control plane and the state store.

use anyhow::{Context as _, Result};
use corral_core::{Record, ResourceKind};
use corral_gateway::Filters;
use corral_lifecycle::{orchestrator_for, Context};
use corral_mapper::diff::{diff_kind, DiffSummary};
use corral_persist::{now_ts, StateStore, StoredState};
use corral_schema::Presence;
use serde::Serialize;
use serde_json::Value as Json;
use tracing::info;

use crate::doc::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Updated,
    Unchanged,
    Planned,
    Deleted,
    Untracked,
    Refreshed,
    Gone,
    Found,
    Stored,
}

#[derive(Debug, Serialize)]
pub struct Outcome {
    pub kind: ResourceKind,
    pub name: String,
    pub id: Option<String>,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<DiffSummary>,
    /// Sensitive values redacted.
    pub record: Json,
}

impl Outcome {
    fn new(kind: ResourceKind, name: &str, id: Option<String>, action: Action, record: &Record) -> Self {
        Self {
            kind,
            name: name.to_string(),
            id,
            action,
            plan: None,
            record: Json::from(&corral_schema::redact(kind, record)),
        }
    }

    fn with_plan(mut self, plan: DiffSummary) -> Self {
        self.plan = Some(plan);
        self
    }
}

/// The slice of `current` a document can speak to: input fields only, and server-defaulted
/// fields only when the document sets them.
pub fn comparable(kind: ResourceKind, current: &Record, desired: &Record) -> Record {
    let schema = corral_schema::schema_for(kind);
    current
        .iter()
        .filter(|(k, _)| match schema.field(k) {
            Some(spec) => spec.is_input() && (spec.presence != Presence::OptionalComputed || desired.get(k).is_some()),
            None => false,
        })
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn save(store: &dyn StateStore, kind: ResourceKind, name: &str, id: Option<&str>, record: &Record) -> Result<()> {
    store
        .put(&StoredState { kind, name: name.to_string(), id: id.map(str::to_string), ts: now_ts(), record: Json::from(record) })
        .with_context(|| format!("saving state for {}/{}", kind, name))
}

/// Last stored identity and record.
fn load(store: &dyn StateStore, kind: ResourceKind, name: &str) -> Result<Option<(Option<String>, Record)>> {
    let Some(st) = store.get(kind, name)? else { return Ok(None) };
    let record = corral_schema::decode_state(kind, &st.record)
        .with_context(|| format!("decoding stored state for {}/{}", kind, name))?;
    Ok(Some((st.id, record)))
}

pub async fn apply(ctx: &Context, store: &dyn StateStore, doc: &Document, dry_run: bool) -> Result<Outcome> {
    let (kind, name) = (doc.kind, doc.name.as_str());
    let orch = orchestrator_for(kind);
    let (mut id, mut current) = load(store, kind, name)?.unwrap_or_default();
    if id.is_some() {
        orch.read(ctx, &mut id, &mut current, ctx.settings.update_timeout)
            .await
            .with_context(|| format!("reading {}/{}", kind, name))?;
        if id.is_none() {
            info!(%kind, name, "tracked object is gone; will create");
        }
    }
    let mut desired = doc.record.clone();

    let Some(id) = id else {
        let plan = diff_kind(kind, &desired, &Record::new());
        if dry_run {
            return Ok(Outcome::new(kind, name, None, Action::Planned, &desired).with_plan(plan));
        }
        let id = orch
            .create(ctx, &mut desired, ctx.settings.create_timeout)
            .await
            .with_context(|| format!("creating {}/{}", kind, name))?;
        save(store, kind, name, Some(&id), &desired)?;
        return Ok(Outcome::new(kind, name, Some(id), Action::Created, &desired).with_plan(plan));
    };

    let plan = diff_kind(kind, &desired, &comparable(kind, &current, &desired));
    if plan.is_empty() {
        save(store, kind, name, Some(&id), &current)?;
        return Ok(Outcome::new(kind, name, Some(id), Action::Unchanged, &current));
    }
    if dry_run {
        return Ok(Outcome::new(kind, name, Some(id), Action::Planned, &desired).with_plan(plan));
    }
    orch.update(ctx, &id, &current, &mut desired, ctx.settings.update_timeout)
        .await
        .with_context(|| format!("updating {}/{}", kind, name))?;
    save(store, kind, name, Some(&id), &desired)?;
    Ok(Outcome::new(kind, name, Some(id), Action::Updated, &desired).with_plan(plan))
}

pub async fn destroy(ctx: &Context, store: &dyn StateStore, doc: &Document, dry_run: bool) -> Result<Outcome> {
    let (kind, name) = (doc.kind, doc.name.as_str());
    let Some((mut id, record)) = load(store, kind, name)?.filter(|(id, _)| id.is_some()) else {
        return Ok(Outcome::new(kind, name, None, Action::Untracked, &doc.record));
    };
    if dry_run {
        return Ok(Outcome::new(kind, name, id, Action::Planned, &record).with_plan(diff_kind(kind, &Record::new(), &record)));
    }
    let was = id.clone();
    orchestrator_for(kind)
        .delete(ctx, &mut id, ctx.settings.delete_timeout)
        .await
        .with_context(|| format!("deleting {}/{}", kind, name))?;
    store.remove(kind, name)?;
    Ok(Outcome::new(kind, name, was, Action::Deleted, &record))
}

pub async fn refresh(ctx: &Context, store: &dyn StateStore, doc: &Document) -> Result<Outcome> {
    let (kind, name) = (doc.kind, doc.name.as_str());
    let Some((mut id, mut record)) = load(store, kind, name)?.filter(|(id, _)| id.is_some()) else {
        return Ok(Outcome::new(kind, name, None, Action::Untracked, &doc.record));
    };
    orchestrator_for(kind)
        .read(ctx, &mut id, &mut record, ctx.settings.update_timeout)
        .await
        .with_context(|| format!("reading {}/{}", kind, name))?;
    save(store, kind, name, id.as_deref(), &record)?;
    let action = if id.is_some() { Action::Refreshed } else { Action::Gone };
    Ok(Outcome::new(kind, name, id, action, &record))
}

pub async fn lookup(ctx: &Context, kind: ResourceKind, filters: &Filters) -> Result<Outcome> {
    let (id, record) = corral_lifecycle::lookup(ctx, kind, filters).await.with_context(|| format!("looking up {}", kind))?;
    let name = record.str_field("name").unwrap_or(&id).to_string();
    Ok(Outcome::new(kind, &name, Some(id), Action::Found, &record))
}

pub fn show(store: &dyn StateStore, kind: ResourceKind, name: &str) -> Result<Option<Outcome>> {
    Ok(load(store, kind, name)?.map(|(id, record)| Outcome::new(kind, name, id, Action::Stored, &record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::parse_documents;
    use corral_gateway::{MockGateway, Op, RemoteGateway};
    use corral_persist::SqliteStore;
    use std::sync::Arc;

    const CREDENTIAL: &str = "
kind: cloud_credential
name: aws
spec:
  description: build account
  amazonec2_credential_config:
    access_key: AKIA
    secret_key: s3cr3t
";

    fn doc(text: &str) -> Document { parse_documents(text).unwrap().remove(0) }

    fn setup() -> (MockGateway, Context, SqliteStore) {
        let gw = MockGateway::new();
        let ctx = Context::new(Arc::new(gw.clone()));
        (gw, ctx, SqliteStore::open(":memory:").unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_plans_without_touching_remote() {
        let (gw, ctx, store) = setup();
        let out = apply(&ctx, &store, &doc(CREDENTIAL), true).await.unwrap();
        assert_eq!(out.action, Action::Planned);
        assert!(out.plan.unwrap().adds >= 2);
        assert!(gw.calls().is_empty());
        assert!(store.get(ResourceKind::CloudCredential, "aws").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn second_apply_is_unchanged_and_secrets_stay_redacted() {
        let (gw, ctx, store) = setup();
        let first = apply(&ctx, &store, &doc(CREDENTIAL), false).await.unwrap();
        assert_eq!(first.action, Action::Created);
        assert_eq!(first.id.as_deref(), Some("cc-00001"));
        assert_eq!(first.record["amazonec2_credential_config"][0]["secret_key"], corral_schema::REDACTED);

        let again = apply(&ctx, &store, &doc(CREDENTIAL), false).await.unwrap();
        assert_eq!(again.action, Action::Unchanged, "{:?}", again.plan);
        assert_eq!(gw.count(ResourceKind::CloudCredential, &Op::Create), 1);
        assert_eq!(gw.count(ResourceKind::CloudCredential, &Op::Replace), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn edited_document_updates_in_place() {
        let (gw, ctx, store) = setup();
        apply(&ctx, &store, &doc(CREDENTIAL), false).await.unwrap();
        let edited = doc(&CREDENTIAL.replace("build account", "release account"));
        let out = apply(&ctx, &store, &edited, false).await.unwrap();
        assert_eq!(out.action, Action::Updated);
        assert_eq!(out.plan.unwrap().paths, vec!["description".to_string()]);
        assert_eq!(gw.count(ResourceKind::CloudCredential, &Op::Replace), 1);
        let stored = store.get(ResourceKind::CloudCredential, "aws").unwrap().unwrap();
        assert_eq!(stored.record["description"], "release account");
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_forgets_identity() {
        let (gw, ctx, store) = setup();
        let d = doc(CREDENTIAL);
        apply(&ctx, &store, &d, false).await.unwrap();
        let out = destroy(&ctx, &store, &d, false).await.unwrap();
        assert_eq!(out.action, Action::Deleted);
        assert_eq!(out.id.as_deref(), Some("cc-00001"));
        assert!(gw.get(ResourceKind::CloudCredential, "cc-00001").is_none());
        assert!(store.get(ResourceKind::CloudCredential, "aws").unwrap().is_none());

        let again = destroy(&ctx, &store, &d, false).await.unwrap();
        assert_eq!(again.action, Action::Untracked);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_notices_objects_removed_out_of_band() {
        let (gw, ctx, store) = setup();
        let d = doc(CREDENTIAL);
        apply(&ctx, &store, &d, false).await.unwrap();
        gw.delete(ResourceKind::CloudCredential, "cc-00001").await.unwrap();

        let out = refresh(&ctx, &store, &d).await.unwrap();
        assert_eq!(out.action, Action::Gone);
        assert_eq!(store.get(ResourceKind::CloudCredential, "aws").unwrap().unwrap().id, None);

        let recreated = apply(&ctx, &store, &d, false).await.unwrap();
        assert_eq!(recreated.action, Action::Created);
        assert_eq!(recreated.id.as_deref(), Some("cc-00002"));
    }

    #[tokio::test(start_paused = true)]
    async fn show_reads_back_stored_state() {
        let (_gw, ctx, store) = setup();
        apply(&ctx, &store, &doc(CREDENTIAL), false).await.unwrap();
        let out = show(&store, ResourceKind::CloudCredential, "aws").unwrap().unwrap();
        assert_eq!(out.action, Action::Stored);
        assert_eq!(out.record["driver"], "amazonec2");
        assert!(show(&store, ResourceKind::Project, "aws").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_state_stops_the_run() {
        let (gw, ctx, store) = setup();
        apply(&ctx, &store, &doc(CREDENTIAL), false).await.unwrap();
        store
            .put(&StoredState {
                kind: ResourceKind::CloudCredential,
                name: "aws".into(),
                id: Some("cc-00001".into()),
                ts: now_ts(),
                record: serde_json::json!({ "bogus": 1 }),
            })
            .unwrap();

        let err = apply(&ctx, &store, &doc(CREDENTIAL), false).await.unwrap_err();
        assert!(format!("{:#}", err).contains("decoding stored state for cloud_credential/aws"), "{:#}", err);
        assert!(destroy(&ctx, &store, &doc(CREDENTIAL), false).await.is_err());
        assert!(show(&store, ResourceKind::CloudCredential, "aws").is_err());
        assert_eq!(gw.count(ResourceKind::CloudCredential, &Op::Create), 1);
        assert!(gw.get(ResourceKind::CloudCredential, "cc-00001").is_some());
        assert_eq!(store.get(ResourceKind::CloudCredential, "aws").unwrap().unwrap().record["bogus"], 1);
    }
}
