//! In-memory gateway with scripted lifecycle states, injected failures and a call log.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use corral_core::{RemoteError, ResourceKind};
use serde_json::Value as Json;
use tracing::debug;

use crate::{observe, payload_id, Filters, RemoteGateway};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Create,
    Read,
    Replace,
    Delete,
    Action(String),
    List,
}

impl Op {
    pub fn action(name: &str) -> Self { Op::Action(name.to_string()) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub kind: ResourceKind,
    pub op: Op,
    pub id: Option<String>,
    pub input: Option<Json>,
}

/// One scripted outcome of a read. The last step repeats once the script is exhausted.
#[derive(Debug, Clone)]
pub enum ReadStep {
    State(String),
    Fail(RemoteError),
}

impl ReadStep {
    pub fn state(s: &str) -> Self { ReadStep::State(s.to_string()) }
    pub fn not_found() -> Self { ReadStep::Fail(RemoteError::from_status(404, "not found")) }
}

type ActionFn = Arc<dyn Fn(&mut Json, Option<&Json>) -> Result<Option<Json>, RemoteError> + Send + Sync>;
type ReplaceFn = Arc<dyn Fn(&mut Json) + Send + Sync>;

#[derive(Default)]
struct Inner {
    objects: BTreeMap<(ResourceKind, String), Json>,
    scripts: BTreeMap<(ResourceKind, String), VecDeque<ReadStep>>,
    failures: Vec<(ResourceKind, Op, RemoteError, u32)>,
    actions: BTreeMap<(ResourceKind, String), ActionFn>,
    normalizers: BTreeMap<ResourceKind, ReplaceFn>,
    calls: Vec<Call>,
    seq: u64,
}

#[derive(Default, Clone)]
pub struct MockGateway {
    inner: Arc<Mutex<Inner>>,
}

fn id_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Cluster => "c",
        ResourceKind::Project => "p",
        ResourceKind::NodePool => "np",
        ResourceKind::CloudCredential => "cc",
        ResourceKind::ClusterAlertRule => "car",
        ResourceKind::AuthConfig => "ac",
    }
}

impl MockGateway {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Seed an object directly; `id` is read from the payload.
    pub fn insert(&self, kind: ResourceKind, obj: Json) -> String {
        let id = obj.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        self.lock().objects.insert((kind, id.clone()), obj);
        id
    }

    pub fn get(&self, kind: ResourceKind, id: &str) -> Option<Json> {
        self.lock().objects.get(&(kind, id.to_string())).cloned()
    }

    /// Script the states observed by successive reads of the object whose id or name is `key`.
    /// Scripts may be installed before the object exists.
    pub fn script(&self, kind: ResourceKind, key: &str, steps: impl IntoIterator<Item = ReadStep>) {
        self.lock().scripts.insert((kind, key.to_string()), steps.into_iter().collect());
    }

    /// Fail the next `times` calls of `op` on `kind` with `err`.
    pub fn fail(&self, kind: ResourceKind, op: Op, err: RemoteError, times: u32) {
        self.lock().failures.push((kind, op, err, times));
    }

    /// Register the server-side effect of an action.
    pub fn on_action<F>(&self, kind: ResourceKind, name: &str, f: F)
    where
        F: Fn(&mut Json, Option<&Json>) -> Result<Option<Json>, RemoteError> + Send + Sync + 'static,
    {
        self.lock().actions.insert((kind, name.to_string()), Arc::new(f));
    }

    /// Rewrite replaced payloads before they are stored, the way a server drops or defers fields.
    pub fn on_replace<F>(&self, kind: ResourceKind, f: F)
    where
        F: Fn(&mut Json) + Send + Sync + 'static,
    {
        self.lock().normalizers.insert(kind, Arc::new(f));
    }

    pub fn calls(&self) -> Vec<Call> { self.lock().calls.clone() }

    pub fn count(&self, kind: ResourceKind, op: &Op) -> usize {
        self.lock().calls.iter().filter(|c| c.kind == kind && &c.op == op).count()
    }

    /// Index of the first logged call matching `kind` and `op`.
    pub fn position(&self, kind: ResourceKind, op: &Op) -> Option<usize> {
        self.lock().calls.iter().position(|c| c.kind == kind && &c.op == op)
    }

    fn enter(&self, kind: ResourceKind, op: Op, id: Option<&str>, input: Option<&Json>) -> Result<MutexGuard<'_, Inner>, RemoteError> {
        let mut g = self.lock();
        g.calls.push(Call { kind, op: op.clone(), id: id.map(str::to_string), input: input.cloned() });
        if let Some(slot) = g.failures.iter_mut().find(|(k, o, _, n)| *k == kind && *o == op && *n > 0) {
            slot.3 -= 1;
            return Err(slot.2.clone());
        }
        Ok(g)
    }
}

impl Inner {
    fn script_key(&self, kind: ResourceKind, id: &str) -> Option<(ResourceKind, String)> {
        let by_id = (kind, id.to_string());
        if self.scripts.contains_key(&by_id) {
            return Some(by_id);
        }
        let name = self.objects.get(&by_id)?.get("name")?.as_str()?.to_string();
        let by_name = (kind, name);
        self.scripts.contains_key(&by_name).then_some(by_name)
    }

    fn next_step(&mut self, kind: ResourceKind, id: &str) -> Option<ReadStep> {
        let key = self.script_key(kind, id)?;
        let steps = self.scripts.get_mut(&key)?;
        if steps.len() > 1 { steps.pop_front() } else { steps.front().cloned() }
    }
}

fn not_found(kind: ResourceKind, id: &str) -> RemoteError {
    RemoteError::from_status(404, format!("{} {} not found", kind, id))
}

impl MockGateway {
    fn do_create(&self, kind: ResourceKind, mut payload: Json) -> Result<Json, RemoteError> {
        let mut g = self.enter(kind, Op::Create, None, Some(&payload))?;
        g.seq += 1;
        let seq = g.seq;
        let obj = payload.as_object_mut().ok_or_else(|| RemoteError::from_status(422, "payload is not an object"))?;
        let id = match obj.get("id").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => format!("{}-{:05}", id_prefix(kind), seq),
        };
        obj.insert("id".into(), Json::String(id.clone()));
        obj.entry("type").or_insert_with(|| Json::String(kind.wire_type().to_string()));
        obj.entry("state").or_insert_with(|| Json::String("active".into()));
        g.objects.insert((kind, id.clone()), payload.clone());
        debug!(%kind, %id, "mock create");
        Ok(payload)
    }

    fn do_read(&self, kind: ResourceKind, id: &str) -> Result<Json, RemoteError> {
        let mut g = self.enter(kind, Op::Read, Some(id), None)?;
        let step = g.next_step(kind, id);
        match (step, g.objects.get_mut(&(kind, id.to_string()))) {
            (Some(ReadStep::Fail(e)), _) => Err(e),
            (Some(ReadStep::State(s)), Some(obj)) => {
                obj["state"] = Json::String(s);
                Ok(obj.clone())
            }
            (_, Some(obj)) => Ok(obj.clone()),
            (_, None) => Err(not_found(kind, id)),
        }
    }

    fn do_replace(&self, kind: ResourceKind, mut payload: Json) -> Result<Json, RemoteError> {
        let id = payload_id(&payload)?;
        let mut g = self.enter(kind, Op::Replace, Some(&id), Some(&payload))?;
        let prior = g.objects.get(&(kind, id.clone())).cloned().ok_or_else(|| not_found(kind, &id))?;
        if let (Some(obj), Some(state)) = (payload.as_object_mut(), prior.get("state")) {
            obj.insert("state".into(), state.clone());
        }
        if let Some(f) = g.normalizers.get(&kind).cloned() {
            f(&mut payload);
        }
        g.objects.insert((kind, id), payload.clone());
        Ok(payload)
    }

    fn do_delete(&self, kind: ResourceKind, id: &str) -> Result<(), RemoteError> {
        let mut g = self.enter(kind, Op::Delete, Some(id), None)?;
        let key = (kind, id.to_string());
        if !g.objects.contains_key(&key) {
            return Err(not_found(kind, id));
        }
        // Scripted objects stay visible so the script can walk them through removal.
        if g.script_key(kind, id).is_some() {
            if let Some(obj) = g.objects.get_mut(&key) {
                obj["state"] = Json::String("removing".into());
            }
        } else {
            g.objects.remove(&key);
        }
        Ok(())
    }

    fn do_action(&self, kind: ResourceKind, id: &str, name: &str, input: Option<&Json>) -> Result<Option<Json>, RemoteError> {
        let mut g = self.enter(kind, Op::action(name), Some(id), input)?;
        let effect = g.actions.get(&(kind, name.to_string())).cloned();
        let obj = g.objects.get_mut(&(kind, id.to_string())).ok_or_else(|| not_found(kind, id))?;
        match effect {
            Some(f) => f(obj, input),
            None => Ok(None),
        }
    }

    fn do_list(&self, kind: ResourceKind, filters: &Filters) -> Result<Vec<Json>, RemoteError> {
        let g = self.enter(kind, Op::List, None, None)?;
        let matches = |obj: &Json| {
            filters.iter().all(|(fk, fv)| match obj.get(fk.as_str()) {
                Some(Json::String(s)) => s == fv,
                Some(Json::Bool(b)) => b.to_string() == *fv,
                Some(Json::Number(n)) => n.to_string() == *fv,
                _ => false,
            })
        };
        Ok(g.objects
            .iter()
            .filter(|((k, _), obj)| *k == kind && matches(obj))
            .map(|(_, obj)| obj.clone())
            .collect())
    }
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn create(&self, kind: ResourceKind, payload: Json) -> Result<Json, RemoteError> {
        let res = self.do_create(kind, payload);
        observe(kind, "create", res.as_ref().map(|_| ()));
        res
    }

    async fn read(&self, kind: ResourceKind, id: &str) -> Result<Json, RemoteError> {
        let res = self.do_read(kind, id);
        observe(kind, "read", res.as_ref().map(|_| ()));
        res
    }

    async fn replace(&self, kind: ResourceKind, payload: Json) -> Result<Json, RemoteError> {
        let res = self.do_replace(kind, payload);
        observe(kind, "replace", res.as_ref().map(|_| ()));
        res
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), RemoteError> {
        let res = self.do_delete(kind, id);
        observe(kind, "delete", res.as_ref().map(|_| ()));
        res
    }

    async fn action(&self, kind: ResourceKind, id: &str, name: &str, input: Option<Json>) -> Result<Option<Json>, RemoteError> {
        let res = self.do_action(kind, id, name, input.as_ref());
        observe(kind, "action", res.as_ref().map(|_| ()));
        res
    }

    async fn list(&self, kind: ResourceKind, filters: &Filters) -> Result<Vec<Json>, RemoteError> {
        let res = self.do_list(kind, filters);
        observe(kind, "list", res.as_ref().map(|_| ()));
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_assigns_id_and_type() {
        let gw = MockGateway::new();
        let out = gw.create(ResourceKind::Cluster, json!({"name": "web"})).await.unwrap();
        assert_eq!(out["id"], "c-00001");
        assert_eq!(out["type"], "cluster");
        assert_eq!(out["state"], "active");
        assert_eq!(gw.count(ResourceKind::Cluster, &Op::Create), 1);
    }

    #[tokio::test]
    async fn scripted_reads_walk_states_then_stick() {
        let gw = MockGateway::new();
        gw.script(ResourceKind::Cluster, "web", [ReadStep::state("provisioning"), ReadStep::state("active")]);
        let id = gw.create(ResourceKind::Cluster, json!({"name": "web"})).await.unwrap()["id"].as_str().unwrap().to_string();
        assert_eq!(gw.read(ResourceKind::Cluster, &id).await.unwrap()["state"], "provisioning");
        assert_eq!(gw.read(ResourceKind::Cluster, &id).await.unwrap()["state"], "active");
        assert_eq!(gw.read(ResourceKind::Cluster, &id).await.unwrap()["state"], "active");
    }

    #[tokio::test]
    async fn injected_failures_are_bounded() {
        let gw = MockGateway::new();
        gw.insert(ResourceKind::Project, json!({"id": "p-1", "name": "p"}));
        gw.fail(ResourceKind::Project, Op::action("enableMonitoring"), RemoteError::from_status(409, "busy"), 2);
        for _ in 0..2 {
            let e = gw.action(ResourceKind::Project, "p-1", "enableMonitoring", None).await.unwrap_err();
            assert!(e.is_conflict());
        }
        assert!(gw.action(ResourceKind::Project, "p-1", "enableMonitoring", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unscripted_delete_removes_and_list_filters() {
        let gw = MockGateway::new();
        gw.insert(ResourceKind::Project, json!({"id": "p-1", "name": "Default", "clusterId": "c-1"}));
        gw.insert(ResourceKind::Project, json!({"id": "p-2", "name": "System", "clusterId": "c-1"}));
        let f: Filters = [("clusterId".to_string(), "c-1".to_string()), ("name".to_string(), "System".to_string())].into();
        let hits = gw.list(ResourceKind::Project, &f).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["id"], "p-2");

        gw.delete(ResourceKind::Project, "p-1").await.unwrap();
        assert!(gw.read(ResourceKind::Project, "p-1").await.unwrap_err().is_absent());
    }

    #[tokio::test]
    async fn action_effects_mutate_object() {
        let gw = MockGateway::new();
        gw.insert(ResourceKind::Cluster, json!({"id": "c-1", "name": "web"}));
        gw.on_action(ResourceKind::Cluster, "generateKubeconfig", |_obj, _| Ok(Some(json!({"config": "apiVersion: v1"}))));
        let out = gw.action(ResourceKind::Cluster, "c-1", "generateKubeconfig", None).await.unwrap();
        assert_eq!(out.unwrap()["config"], "apiVersion: v1");
    }
}
