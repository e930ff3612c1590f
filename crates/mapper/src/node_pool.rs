use corral_core::{EngineError, EngineResult, Record, ResourceKind, ResourceMeta};
use serde::{Deserialize, Serialize};

use crate::fields::{put, put_map, Reader};
use crate::{expand_blocks, flatten_blocks, remote_object, Block, Mapper};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Taint {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_added: Option<String>,
}

impl Block for Taint {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        let effect = r.string("effect")?;
        if let Some(e) = effect.as_deref() {
            if !matches!(e, "NoSchedule" | "PreferNoSchedule" | "NoExecute") {
                return Err(EngineError::validation(format!("{}: unknown taint effect {:?}", r.path("effect"), e)));
            }
        }
        Ok(Self { key: r.req_string("key")?, value: r.req_string("value")?, effect, time_added: None })
    }

    fn flatten(&self, _prior: Option<&Record>) -> Record {
        let mut out = Record::new().with("key", self.key.as_str()).with("value", self.value.as_str());
        put(&mut out, "effect", self.effect.clone());
        put(&mut out, "time_added", self.time_added.clone());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePool {
    #[serde(flatten)]
    pub meta: ResourceMeta,
    pub cluster_id: String,
    pub hostname_prefix: String,
    pub node_template_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub control_plane: bool,
    #[serde(default)]
    pub etcd: bool,
    #[serde(default)]
    pub worker: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_not_ready_after_secs: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_taints: Vec<Taint>,
}

remote_object!(NodePool, ResourceKind::NodePool);

#[derive(Debug, Default)]
pub struct NodePoolMapper;

impl Mapper for NodePoolMapper {
    type Remote = NodePool;

    fn expand(&self, record: &Record) -> EngineResult<NodePool> {
        let r = Reader::new(record);
        let quantity = r.int("quantity")?;
        if matches!(quantity, Some(q) if q < 1) {
            return Err(EngineError::validation("quantity must be at least 1"));
        }
        Ok(NodePool {
            meta: ResourceMeta {
                name: r.req_string("name")?,
                annotations: r.map("annotations")?,
                labels: r.map("labels")?,
                ..Default::default()
            },
            cluster_id: r.req_string("cluster_id")?,
            hostname_prefix: r.req_string("hostname_prefix")?,
            node_template_id: r.req_string("node_template_id")?,
            quantity,
            control_plane: r.bool("control_plane")?.unwrap_or(false),
            etcd: r.bool("etcd")?.unwrap_or(false),
            worker: r.bool("worker")?.unwrap_or(false),
            delete_not_ready_after_secs: r.int("delete_not_ready_after_secs")?,
            node_taints: expand_blocks(&r, "node_taints")?,
        })
    }

    fn flatten(&self, remote: &NodePool, record: &mut Record) -> EngineResult<()> {
        if !remote.meta.name.is_empty() {
            record.insert("name", remote.meta.name.as_str());
        }
        record.insert("cluster_id", remote.cluster_id.as_str());
        record.insert("hostname_prefix", remote.hostname_prefix.as_str());
        record.insert("node_template_id", remote.node_template_id.as_str());
        put(record, "quantity", remote.quantity);
        record.insert("control_plane", remote.control_plane);
        record.insert("etcd", remote.etcd);
        record.insert("worker", remote.worker);
        put(record, "delete_not_ready_after_secs", remote.delete_not_ready_after_secs);
        put_map(record, "annotations", &remote.meta.annotations);
        put_map(record, "labels", &remote.meta.labels);
        flatten_blocks(record, "node_taints", &remote.node_taints, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::round_trip;

    fn pool() -> Record {
        Record::new()
            .with("name", "workers")
            .with("cluster_id", "c-00001")
            .with("hostname_prefix", "w-")
            .with("node_template_id", "nt-1")
            .with("quantity", 3i64)
            .with("control_plane", false)
            .with("etcd", false)
            .with("worker", true)
            .with(
                "node_taints",
                vec![
                    Record::new().with("key", "gpu").with("value", "true").with("effect", "NoSchedule"),
                    Record::new().with("key", "arch").with("value", "arm64"),
                ],
            )
    }

    #[test]
    fn taints_keep_their_order() {
        let rec = pool();
        let out = round_trip::<NodePoolMapper>(&rec);
        assert_eq!(out, rec);
        let keys: Vec<_> = out.blocks("node_taints").filter_map(|t| t.str_field("key")).collect();
        assert_eq!(keys, vec!["gpu", "arch"]);
    }

    #[test]
    fn server_time_added_is_computed() {
        let mut remote = NodePoolMapper.expand(&pool()).unwrap();
        remote.node_taints[0].time_added = Some("2024-01-01T00:00:00Z".into());
        let mut rec = pool();
        NodePoolMapper.flatten(&remote, &mut rec).unwrap();
        assert_eq!(rec.block("node_taints").and_then(|t| t.str_field("time_added")), Some("2024-01-01T00:00:00Z"));
        assert_ne!(rec, pool());
        let json = serde_json::to_value(NodePoolMapper.expand(&rec).unwrap()).unwrap();
        assert!(json["nodeTaints"][0].get("timeAdded").is_none());
        assert_eq!(json["hostnamePrefix"], "w-");
    }

    #[test]
    fn zero_quantity_and_bad_effect_are_rejected() {
        assert!(matches!(NodePoolMapper.expand(&pool().with("quantity", 0i64)), Err(EngineError::Validation(_))));
        let bad = pool().with("node_taints", vec![Record::new().with("key", "k").with("value", "v").with("effect", "Sometimes")]);
        assert!(matches!(NodePoolMapper.expand(&bad), Err(EngineError::Validation(_))));
    }
}
