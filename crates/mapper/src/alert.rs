//! Cluster alert rules and their four rule kinds.

use std::collections::BTreeMap;

use corral_core::{EngineError, EngineResult, Record, ResourceKind, ResourceMeta};
use corral_schema::ALERT_RULE;
use serde::{Deserialize, Serialize};

use crate::fields::{put, put_block, put_blocks, put_map, Reader};
use crate::{remote_object, variant, Block, Mapper};

const SEVERITIES: &[&str] = &["critical", "info", "warning"];
const COMPARISONS: &[&str] = &["equal", "not-equal", "greater-than", "less-than", "greater-or-equal", "less-or-equal", "has-value"];
const NODE_CONDITIONS: &[&str] = &["cpu", "mem", "notready"];
const EVENT_TYPES: &[&str] = &["Normal", "Warning"];
const EVENT_RESOURCE_KINDS: &[&str] = &["DaemonSet", "Deployment", "Node", "Pod", "StatefulSet"];
const SYSTEM_SERVICES: &[&str] = &["controller-manager", "etcd", "scheduler"];

fn one_of(r: &Reader<'_>, key: &str, allowed: &[&str]) -> EngineResult<Option<String>> {
    let v = r.string(key)?;
    match v.as_deref() {
        Some(s) if !allowed.contains(&s) => Err(EngineError::validation(format!(
            "{}: {:?} is not one of {}",
            r.path(key),
            s,
            allowed.join(", ")
        ))),
        _ => Ok(v),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub resource_kind: String,
}

impl Block for EventRule {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        let resource_kind = one_of(r, "resource_kind", EVENT_RESOURCE_KINDS)?
            .ok_or_else(|| EngineError::validation(format!("missing required field {}", r.path("resource_kind"))))?;
        Ok(Self { event_type: one_of(r, "event_type", EVENT_TYPES)?, resource_kind })
    }

    fn flatten(&self, _prior: Option<&Record>) -> Record {
        let mut out = Record::new().with("resource_kind", self.resource_kind.as_str());
        put(&mut out, "event_type", self.event_type.clone());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub duration: String,
    pub expression: String,
    pub threshold_value: f64,
}

impl Block for MetricRule {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        let threshold_value = r
            .float("threshold_value")?
            .ok_or_else(|| EngineError::validation(format!("missing required field {}", r.path("threshold_value"))))?;
        Ok(Self {
            comparison: one_of(r, "comparison", COMPARISONS)?,
            description: r.string("description")?,
            duration: r.req_string("duration")?,
            expression: r.req_string("expression")?,
            threshold_value,
        })
    }

    fn flatten(&self, _prior: Option<&Record>) -> Record {
        let mut out = Record::new()
            .with("duration", self.duration.as_str())
            .with("expression", self.expression.as_str())
            .with("threshold_value", self.threshold_value);
        put(&mut out, "comparison", self.comparison.clone());
        put(&mut out, "description", self.description.clone());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_threshold: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_threshold: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
}

impl Block for NodeRule {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        let rule = Self {
            condition: one_of(r, "condition", NODE_CONDITIONS)?,
            cpu_threshold: r.int("cpu_threshold")?,
            mem_threshold: r.int("mem_threshold")?,
            node_id: r.string("node_id")?,
            selector: r.map("selector")?,
        };
        if rule.node_id.is_some() && !rule.selector.is_empty() {
            return Err(EngineError::validation(format!(
                "{}: node_id and selector are mutually exclusive",
                r.path("node_id")
            )));
        }
        Ok(rule)
    }

    fn flatten(&self, _prior: Option<&Record>) -> Record {
        let mut out = Record::new();
        put(&mut out, "condition", self.condition.clone());
        put(&mut out, "cpu_threshold", self.cpu_threshold);
        put(&mut out, "mem_threshold", self.mem_threshold);
        put(&mut out, "node_id", self.node_id.clone());
        put_map(&mut out, "selector", &self.selector);
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemServiceRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Block for SystemServiceRule {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self { condition: one_of(r, "condition", SYSTEM_SERVICES)? })
    }

    fn flatten(&self, _prior: Option<&Record>) -> Record {
        let mut out = Record::new();
        put(&mut out, "condition", self.condition.clone());
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertRuleKind {
    Event(EventRule),
    Metric(MetricRule),
    Node(NodeRule),
    SystemService(SystemServiceRule),
}

impl AlertRuleKind {
    pub fn block(&self) -> &'static str {
        match self {
            AlertRuleKind::Event(_) => "event_rule",
            AlertRuleKind::Metric(_) => "metric_rule",
            AlertRuleKind::Node(_) => "node_rule",
            AlertRuleKind::SystemService(_) => "system_service_rule",
        }
    }

    fn expand(block: &'static str, r: &Reader<'_>) -> EngineResult<Self> {
        // An empty block is a legitimate all-defaults rule.
        let empty = Record::new();
        let inner = r.block(block)?.unwrap_or_else(|| Reader::new(&empty));
        Ok(match block {
            "event_rule" => AlertRuleKind::Event(EventRule::expand(&inner)?),
            "metric_rule" => AlertRuleKind::Metric(MetricRule::expand(&inner)?),
            "node_rule" => AlertRuleKind::Node(NodeRule::expand(&inner)?),
            "system_service_rule" => AlertRuleKind::SystemService(SystemServiceRule::expand(&inner)?),
            other => return Err(EngineError::validation(format!("unknown alert rule block {}", other))),
        })
    }

    fn flatten(&self) -> Record {
        match self {
            AlertRuleKind::Event(r) => r.flatten(None),
            AlertRuleKind::Metric(r) => r.flatten(None),
            AlertRuleKind::Node(r) => r.flatten(None),
            AlertRuleKind::SystemService(r) => r.flatten(None),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAlertRule {
    #[serde(flatten)]
    pub meta: ResourceMeta,
    pub cluster_id: String,
    pub group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_interval_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_wait_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherited: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_rule: Option<EventRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_rule: Option<MetricRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_rule: Option<NodeRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_service_rule: Option<SystemServiceRule>,
}

remote_object!(ClusterAlertRule, ResourceKind::ClusterAlertRule);

impl ClusterAlertRule {
    pub fn rule(&self) -> EngineResult<AlertRuleKind> {
        let (_, rule) = variant::resolve_remote(
            &ALERT_RULE,
            [
                ("event_rule", self.event_rule.clone().map(AlertRuleKind::Event)),
                ("metric_rule", self.metric_rule.clone().map(AlertRuleKind::Metric)),
                ("node_rule", self.node_rule.clone().map(AlertRuleKind::Node)),
                ("system_service_rule", self.system_service_rule.clone().map(AlertRuleKind::SystemService)),
            ],
        )?;
        Ok(rule)
    }

    pub fn set_rule(&mut self, rule: AlertRuleKind) {
        self.event_rule = None;
        self.metric_rule = None;
        self.node_rule = None;
        self.system_service_rule = None;
        match rule {
            AlertRuleKind::Event(r) => self.event_rule = Some(r),
            AlertRuleKind::Metric(r) => self.metric_rule = Some(r),
            AlertRuleKind::Node(r) => self.node_rule = Some(r),
            AlertRuleKind::SystemService(r) => self.system_service_rule = Some(r),
        }
    }
}

#[derive(Debug, Default)]
pub struct ClusterAlertRuleMapper;

impl Mapper for ClusterAlertRuleMapper {
    type Remote = ClusterAlertRule;

    fn expand(&self, record: &Record) -> EngineResult<ClusterAlertRule> {
        let r = Reader::new(record);
        let block = variant::resolve_record(record, &ALERT_RULE)?
            .ok_or_else(|| EngineError::NoVariantPopulated { group: ALERT_RULE.name.to_string() })?;
        let mut rule = ClusterAlertRule {
            meta: ResourceMeta {
                name: r.req_string("name")?,
                annotations: r.map("annotations")?,
                labels: r.map("labels")?,
                ..Default::default()
            },
            cluster_id: r.req_string("cluster_id")?,
            group_id: r.req_string("group_id")?,
            group_interval_seconds: r.int("group_interval_seconds")?,
            group_wait_seconds: r.int("group_wait_seconds")?,
            inherited: r.bool("inherited")?,
            repeat_interval_seconds: r.int("repeat_interval_seconds")?,
            severity: one_of(&r, "severity", SEVERITIES)?,
            ..Default::default()
        };
        rule.set_rule(AlertRuleKind::expand(block, &r)?);
        Ok(rule)
    }

    fn flatten(&self, remote: &ClusterAlertRule, record: &mut Record) -> EngineResult<()> {
        let rule = remote.rule()?;
        if !remote.meta.name.is_empty() {
            record.insert("name", remote.meta.name.as_str());
        }
        record.insert("cluster_id", remote.cluster_id.as_str());
        record.insert("group_id", remote.group_id.as_str());
        put(record, "group_interval_seconds", remote.group_interval_seconds);
        put(record, "group_wait_seconds", remote.group_wait_seconds);
        put(record, "inherited", remote.inherited);
        put(record, "repeat_interval_seconds", remote.repeat_interval_seconds);
        put(record, "severity", remote.severity.clone());
        put_map(record, "annotations", &remote.meta.annotations);
        put_map(record, "labels", &remote.meta.labels);
        for b in ALERT_RULE.blocks {
            put_blocks(record, b, Vec::new());
        }
        put_block(record, rule.block(), Some(rule.flatten()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::round_trip;

    fn metric() -> Record {
        Record::new()
            .with("name", "high-latency")
            .with("cluster_id", "c-00001")
            .with("group_id", "c-00001:g-1")
            .with("group_interval_seconds", 300i64)
            .with("group_wait_seconds", 300i64)
            .with("inherited", true)
            .with("repeat_interval_seconds", 6000i64)
            .with("severity", "critical")
            .with(
                "metric_rule",
                vec![Record::new()
                    .with("comparison", "equal")
                    .with("duration", "30")
                    .with("expression", "expression")
                    .with("threshold_value", 3.5f64)
                    .with("description", "description")],
            )
    }

    #[test]
    fn metric_rule_round_trip() {
        let rec = metric();
        assert_eq!(round_trip::<ClusterAlertRuleMapper>(&rec), rec);
        let json = serde_json::to_value(ClusterAlertRuleMapper.expand(&rec).unwrap()).unwrap();
        assert_eq!(json["metricRule"]["thresholdValue"], 3.5);
        assert_eq!(json["groupIntervalSeconds"], 300);
    }

    #[test]
    fn empty_system_service_block_is_a_rule() {
        let rec = Record::new()
            .with("name", "etcd-down")
            .with("cluster_id", "c-00001")
            .with("group_id", "g")
            .with("system_service_rule", vec![Record::new()]);
        let remote = ClusterAlertRuleMapper.expand(&rec).unwrap();
        assert!(matches!(remote.rule().unwrap(), AlertRuleKind::SystemService(_)));
    }

    #[test]
    fn enumerations_are_checked() {
        assert!(matches!(
            ClusterAlertRuleMapper.expand(&metric().with("severity", "meh")),
            Err(EngineError::Validation(_))
        ));
        let node = metric()
            .with("metric_rule", Vec::<Record>::new())
            .with("node_rule", vec![Record::new().with("condition", "disk")]);
        assert!(matches!(ClusterAlertRuleMapper.expand(&node), Err(EngineError::Validation(_))));
    }

    #[test]
    fn rule_kinds_are_exclusive() {
        let rec = metric().with("event_rule", vec![Record::new().with("resource_kind", "Pod")]);
        assert!(matches!(ClusterAlertRuleMapper.expand(&rec), Err(EngineError::AmbiguousVariant { .. })));
    }
}
