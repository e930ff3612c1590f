//! Projects: quotas, container defaults and the monitoring add-on.

use std::collections::BTreeMap;

use corral_core::{EngineError, EngineResult, Record, ResourceKind, ResourceMeta};
use serde::{Deserialize, Serialize};

use crate::fields::{put, put_block, put_map, Reader};
use crate::{expand_block, flatten_block, remote_object, Block, Mapper};

/// Annotation the control plane keeps the last applied monitoring answers in.
pub const MONITORING_INPUT_ANNOTATION: &str = "field.cattle.io/overwriteAppAnswers";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaLimit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_maps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits_cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits_memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claims: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_storage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<String>,
}

impl Block for QuotaLimit {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self {
            config_maps: r.string("config_maps")?,
            limits_cpu: r.string("limits_cpu")?,
            limits_memory: r.string("limits_memory")?,
            persistent_volume_claims: r.string("persistent_volume_claims")?,
            pods: r.string("pods")?,
            requests_cpu: r.string("requests_cpu")?,
            requests_memory: r.string("requests_memory")?,
            requests_storage: r.string("requests_storage")?,
            secrets: r.string("secrets")?,
            services: r.string("services")?,
        })
    }

    fn flatten(&self, _prior: Option<&Record>) -> Record {
        let mut out = Record::new();
        put(&mut out, "config_maps", self.config_maps.clone());
        put(&mut out, "limits_cpu", self.limits_cpu.clone());
        put(&mut out, "limits_memory", self.limits_memory.clone());
        put(&mut out, "persistent_volume_claims", self.persistent_volume_claims.clone());
        put(&mut out, "pods", self.pods.clone());
        put(&mut out, "requests_cpu", self.requests_cpu.clone());
        put(&mut out, "requests_memory", self.requests_memory.clone());
        put(&mut out, "requests_storage", self.requests_storage.clone());
        put(&mut out, "secrets", self.secrets.clone());
        put(&mut out, "services", self.services.clone());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitHolder {
    #[serde(default)]
    pub limit: QuotaLimit,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResourceLimit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits_cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits_memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_memory: Option<String>,
}

impl Block for ContainerResourceLimit {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self {
            limits_cpu: r.string("limits_cpu")?,
            limits_memory: r.string("limits_memory")?,
            requests_cpu: r.string("requests_cpu")?,
            requests_memory: r.string("requests_memory")?,
        })
    }

    fn flatten(&self, _prior: Option<&Record>) -> Record {
        let mut out = Record::new();
        put(&mut out, "limits_cpu", self.limits_cpu.clone());
        put(&mut out, "limits_memory", self.limits_memory.clone());
        put(&mut out, "requests_cpu", self.requests_cpu.clone());
        put(&mut out, "requests_memory", self.requests_memory.clone());
        out
    }
}

/// Input of the `enableMonitoring` / `editMonitoring` actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringInput {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub answers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Block for MonitoringInput {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self { answers: r.map("answers")?, version: r.string("version")? })
    }

    fn flatten(&self, _prior: Option<&Record>) -> Record {
        let mut out = Record::new();
        put_map(&mut out, "answers", &self.answers);
        put(&mut out, "version", self.version.clone());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(flatten)]
    pub meta: ResourceMeta,
    pub cluster_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub enable_project_monitoring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_security_policy_template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_quota: Option<LimitHolder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_default_resource_quota: Option<LimitHolder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_default_resource_limit: Option<ContainerResourceLimit>,
}

remote_object!(Project, ResourceKind::Project);

impl Project {
    /// Monitoring answers last applied, decoded from the annotation.
    pub fn applied_monitoring_input(&self) -> EngineResult<Option<MonitoringInput>> {
        match self.meta.annotations.get(MONITORING_INPUT_ANNOTATION) {
            Some(raw) if !raw.is_empty() => Ok(Some(serde_json::from_str(raw)?)),
            _ => Ok(None),
        }
    }
}

/// The monitoring input block of a project record.
pub fn monitoring_input(record: &Record) -> EngineResult<Option<MonitoringInput>> {
    expand_block(&Reader::new(record), "project_monitoring_input")
}

#[derive(Debug, Default)]
pub struct ProjectMapper;

impl Mapper for ProjectMapper {
    type Remote = Project;

    fn expand(&self, record: &Record) -> EngineResult<Project> {
        let r = Reader::new(record);
        let (resource_quota, namespace_default_resource_quota) = match r.block("resource_quota")? {
            Some(q) => {
                let project: Option<QuotaLimit> = expand_block(&q, "project_limit")?;
                let namespace: Option<QuotaLimit> = expand_block(&q, "namespace_default_limit")?;
                match (project, namespace) {
                    (Some(p), Some(n)) => (Some(LimitHolder { limit: p }), Some(LimitHolder { limit: n })),
                    _ => {
                        return Err(EngineError::validation(format!(
                            "{} needs both project_limit and namespace_default_limit",
                            r.path("resource_quota")
                        )))
                    }
                }
            }
            None => (None, None),
        };
        Ok(Project {
            meta: ResourceMeta {
                name: r.req_string("name")?,
                annotations: r.map("annotations")?,
                labels: r.map("labels")?,
                ..Default::default()
            },
            cluster_id: r.req_string("cluster_id")?,
            description: r.string("description")?,
            enable_project_monitoring: r.bool("enable_project_monitoring")?.unwrap_or(false),
            pod_security_policy_template_id: r.string("pod_security_policy_template_id")?.filter(|s| !s.is_empty()),
            resource_quota,
            namespace_default_resource_quota,
            container_default_resource_limit: expand_block(&r, "container_resource_limit")?,
        })
    }

    fn flatten(&self, remote: &Project, record: &mut Record) -> EngineResult<()> {
        if !remote.meta.name.is_empty() {
            record.insert("name", remote.meta.name.as_str());
        }
        record.insert("cluster_id", remote.cluster_id.as_str());
        put(record, "description", remote.description.clone());
        put_map(record, "annotations", &remote.meta.annotations);
        put_map(record, "labels", &remote.meta.labels);
        record.insert("enable_project_monitoring", remote.enable_project_monitoring);
        put(record, "pod_security_policy_template_id", remote.pod_security_policy_template_id.clone());

        let quota = match (&remote.resource_quota, &remote.namespace_default_resource_quota) {
            (Some(p), Some(n)) => Some(
                Record::new()
                    .with("project_limit", vec![p.limit.flatten(None)])
                    .with("namespace_default_limit", vec![n.limit.flatten(None)]),
            ),
            _ => None,
        };
        put_block(record, "resource_quota", quota);
        flatten_block(record, "container_resource_limit", remote.container_default_resource_limit.as_ref(), None);

        let applied = remote.applied_monitoring_input()?;
        put_block(record, "project_monitoring_input", applied.map(|i| i.flatten(None)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::round_trip;

    fn quota(pods: &str) -> Vec<Record> {
        vec![Record::new().with("pods", pods).with("limits_cpu", "2000m")]
    }

    fn project() -> Record {
        Record::new()
            .with("name", "payments")
            .with("cluster_id", "c-00001")
            .with("description", "team payments")
            .with("enable_project_monitoring", false)
            .with("pod_security_policy_template_id", "restricted")
            .with(
                "resource_quota",
                vec![Record::new().with("project_limit", quota("100")).with("namespace_default_limit", quota("10"))],
            )
            .with("container_resource_limit", vec![Record::new().with("limits_cpu", "20m")])
    }

    #[test]
    fn round_trip_and_wire_names() {
        let rec = project();
        assert_eq!(round_trip::<ProjectMapper>(&rec), rec);

        let p = ProjectMapper.expand(&rec).unwrap();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["clusterId"], "c-00001");
        assert_eq!(json["resourceQuota"]["limit"]["pods"], "100");
        assert_eq!(json["namespaceDefaultResourceQuota"]["limit"]["limitsCpu"], "2000m");
        assert_eq!(json["containerDefaultResourceLimit"]["limitsCpu"], "20m");
        assert_eq!(json["enableProjectMonitoring"], false);
    }

    #[test]
    fn half_a_quota_is_rejected() {
        let rec = project().with("resource_quota", vec![Record::new().with("project_limit", quota("1"))]);
        assert!(matches!(ProjectMapper.expand(&rec), Err(EngineError::Validation(_))));
    }

    #[test]
    fn monitoring_input_comes_back_from_annotation() {
        let input = r#"{"answers":{"prometheus.retention":"12h"},"version":"0.1.0"}"#;
        let remote: Project = serde_json::from_value(serde_json::json!({
            "id": "c-00001:p-00001",
            "name": "payments",
            "clusterId": "c-00001",
            "enableProjectMonitoring": true,
            "annotations": { "field.cattle.io/overwriteAppAnswers": input },
        }))
        .unwrap();

        let mut rec = Record::new().with("wait_for_cluster", true);
        ProjectMapper.flatten(&remote, &mut rec).unwrap();
        let got = monitoring_input(&rec).unwrap().unwrap();
        assert_eq!(got.version.as_deref(), Some("0.1.0"));
        assert_eq!(got.answers.get("prometheus.retention").map(String::as_str), Some("12h"));
        // local-only field survives flatten
        assert_eq!(rec.get("wait_for_cluster"), Some(&corral_core::Value::Bool(true)));
    }

    #[test]
    fn monitoring_input_cleared_when_annotation_is_gone() {
        let remote = ProjectMapper.expand(&project()).unwrap();
        assert!(!remote.meta.annotations.contains_key(MONITORING_INPUT_ANNOTATION));
        let mut rec = project().with(
            "project_monitoring_input",
            vec![Record::new().with("version", "0.1.0")],
        );
        ProjectMapper.flatten(&remote, &mut rec).unwrap();
        assert_eq!(rec.get("project_monitoring_input"), Some(&corral_core::Value::from(Vec::<Record>::new())));
        assert!(monitoring_input(&rec).unwrap().is_none());
    }

    #[test]
    fn malformed_monitoring_annotation_is_an_error() {
        let mut remote = ProjectMapper.expand(&project()).unwrap();
        remote.meta.annotations.insert(MONITORING_INPUT_ANNOTATION.into(), "{not json".into());
        let mut rec = Record::new();
        assert!(matches!(ProjectMapper.flatten(&remote, &mut rec), Err(EngineError::Serialization(_))));
    }
}
