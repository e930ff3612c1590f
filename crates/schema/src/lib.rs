//! Corral schema: per-kind field registry and schema-driven decoding of declarative documents.
//!
//! The registry is the boundary between the document parser and the engine. Every field the
//! mappers read or write is declared here with its type, presence, sensitivity and ordering.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use corral_core::{EngineError, EngineResult, Record, ResourceKind, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value as Json;
use tracing::debug;

pub mod kinds;

pub use kinds::{ALERT_RULE, AUTH_PROVIDER, CLUSTER_ENGINE, CREDENTIAL_DRIVER, NETWORK_PLUGIN};

/// Placeholder written in place of sensitive values by [`redact`].
pub const REDACTED: &str = "(sensitive)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Required,
    Optional,
    /// Set by the server only; rejected in input documents.
    Computed,
    OptionalComputed,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int,
    Float,
    String,
    /// List of strings.
    List,
    /// Unordered set of strings.
    Set,
    /// String to string map.
    Map,
    /// Nested records, carried as a list.
    Block {
        max_items: Option<usize>,
        fields: &'static [FieldSpec],
        groups: &'static [VariantGroup],
    },
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::List => "list",
            FieldType::Set => "set",
            FieldType::Map => "map",
            FieldType::Block { .. } => "block",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    #[serde(flatten)]
    pub ty: FieldType,
    pub presence: Presence,
    pub sensitive: bool,
    /// List order is significant.
    pub ordered: bool,
}

impl FieldSpec {
    const fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty, presence: Presence::Optional, sensitive: false, ordered: false }
    }

    pub const fn bool(name: &'static str) -> Self { Self::new(name, FieldType::Bool) }
    pub const fn int(name: &'static str) -> Self { Self::new(name, FieldType::Int) }
    pub const fn float(name: &'static str) -> Self { Self::new(name, FieldType::Float) }
    pub const fn string(name: &'static str) -> Self { Self::new(name, FieldType::String) }
    pub const fn list(name: &'static str) -> Self { Self::new(name, FieldType::List) }
    pub const fn set(name: &'static str) -> Self { Self::new(name, FieldType::Set) }
    pub const fn map(name: &'static str) -> Self { Self::new(name, FieldType::Map) }

    pub const fn block(
        name: &'static str,
        max_items: Option<usize>,
        fields: &'static [FieldSpec],
        groups: &'static [VariantGroup],
    ) -> Self {
        Self::new(name, FieldType::Block { max_items, fields, groups })
    }

    pub const fn required(mut self) -> Self { self.presence = Presence::Required; self }
    pub const fn optional(mut self) -> Self { self.presence = Presence::Optional; self }
    pub const fn computed(mut self) -> Self { self.presence = Presence::Computed; self }
    pub const fn optional_computed(mut self) -> Self { self.presence = Presence::OptionalComputed; self }
    pub const fn sensitive(mut self) -> Self { self.sensitive = true; self }
    pub const fn ordered(mut self) -> Self { self.ordered = true; self }

    pub fn is_input(&self) -> bool { self.presence != Presence::Computed }
}

/// A closed set of mutually exclusive block names.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VariantGroup {
    pub name: &'static str,
    pub blocks: &'static [&'static str],
    /// Exactly one block must be populated (otherwise at most one).
    pub required: bool,
}

impl VariantGroup {
    pub fn contains(&self, block: &str) -> bool { self.blocks.contains(&block) }
}

#[derive(Debug, Serialize)]
pub struct KindSchema {
    pub kind: ResourceKind,
    pub fields: &'static [FieldSpec],
    pub groups: &'static [VariantGroup],
}

impl KindSchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolve a dotted path such as `rke_config.network_provider.plugin`.
    pub fn lookup(&self, path: &str) -> Option<&'static FieldSpec> {
        let mut fields = self.fields;
        let mut found = None;
        for seg in path.split('.') {
            let spec = fields.iter().find(|f| f.name == seg)?;
            found = Some(spec);
            fields = match spec.ty {
                FieldType::Block { fields, .. } => fields,
                _ => &[],
            };
        }
        found
    }
}

// Control-plane object names: lowercase RFC 1123 labels, dots allowed.
static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").expect("static regex")
});

pub fn schema_for(kind: ResourceKind) -> &'static KindSchema {
    match kind {
        ResourceKind::Cluster => &kinds::CLUSTER,
        ResourceKind::Project => &kinds::PROJECT,
        ResourceKind::NodePool => &kinds::NODE_POOL,
        ResourceKind::CloudCredential => &kinds::CLOUD_CREDENTIAL,
        ResourceKind::ClusterAlertRule => &kinds::CLUSTER_ALERT_RULE,
        ResourceKind::AuthConfig => &kinds::AUTH_CONFIG,
    }
}

pub fn all() -> impl Iterator<Item = &'static KindSchema> { ResourceKind::ALL.into_iter().map(schema_for) }

pub fn validate_name(name: &str) -> EngineResult<()> {
    if name.len() > 253 || !NAME_RE.is_match(name) {
        return Err(EngineError::validation(format!("invalid object name {:?}", name)));
    }
    Ok(())
}

/// Decode an untyped document body into a record, enforcing the kind's schema.
///
/// Unknown fields, computed-only fields, missing required fields and values of the wrong
/// shape are all rejected here, before any mapper or gateway sees the record.
pub fn decode(kind: ResourceKind, body: &Json) -> EngineResult<Record> {
    let schema = schema_for(kind);
    let rec = decode_fields(schema.fields, body, "", false)?;
    if let Some(name) = rec.str_field("name") {
        if schema.field("name").map(FieldSpec::is_input).unwrap_or(false) {
            validate_name(name)?;
        }
    }
    debug!(kind = %kind, fields = rec.len(), "decoded document");
    Ok(rec)
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() { name.to_string() } else { format!("{}.{}", prefix, name) }
}

fn json_type(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "list",
        Json::Object(_) => "object",
    }
}

/// Decode a previously flattened record, computed fields included.
pub fn decode_state(kind: ResourceKind, body: &Json) -> EngineResult<Record> {
    decode_fields(schema_for(kind).fields, body, "", true)
}

fn decode_fields(fields: &'static [FieldSpec], body: &Json, prefix: &str, state: bool) -> EngineResult<Record> {
    let obj = match body {
        Json::Object(m) => m,
        Json::Null => return Ok(Record::new()),
        other => return Err(EngineError::shape(if prefix.is_empty() { "<root>" } else { prefix }, "object", json_type(other))),
    };
    for key in obj.keys() {
        if !fields.iter().any(|f| f.name == key) {
            return Err(EngineError::validation(format!("unknown field {}", join(prefix, key))));
        }
    }
    let mut rec = Record::new();
    for spec in fields {
        let path = join(prefix, spec.name);
        match obj.get(spec.name) {
            None | Some(Json::Null) => {
                if spec.presence == Presence::Required && !state {
                    return Err(EngineError::validation(format!("missing required field {}", path)));
                }
            }
            Some(v) => {
                if spec.presence == Presence::Computed && !state {
                    return Err(EngineError::validation(format!("field {} is computed and cannot be set", path)));
                }
                rec.insert(spec.name, decode_value(spec, v, &path, state)?);
            }
        }
    }
    Ok(rec)
}

fn decode_scalar_string(v: &Json, path: &str) -> EngineResult<String> {
    match v {
        Json::String(s) => Ok(s.clone()),
        Json::Number(n) => Ok(n.to_string()),
        Json::Bool(b) => Ok(b.to_string()),
        other => Err(EngineError::shape(path, "string", json_type(other))),
    }
}

fn decode_value(spec: &FieldSpec, v: &Json, path: &str, state: bool) -> EngineResult<Value> {
    let value = match (&spec.ty, v) {
        (FieldType::Bool, Json::Bool(b)) => Value::Bool(*b),
        (FieldType::Bool, Json::String(s)) => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(EngineError::shape(path, "bool", format!("{:?}", s))),
        },
        (FieldType::Int, Json::Number(n)) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => return Err(EngineError::shape(path, "int", n.to_string())),
        },
        (FieldType::Int, Json::String(s)) => match s.trim().parse::<i64>() {
            Ok(i) => Value::Int(i),
            Err(_) => return Err(EngineError::shape(path, "int", format!("{:?}", s))),
        },
        (FieldType::Float, Json::Number(n)) => match n.as_f64() {
            Some(f) => Value::Float(f),
            None => return Err(EngineError::shape(path, "float", n.to_string())),
        },
        (FieldType::Float, Json::String(s)) => match s.trim().parse::<f64>() {
            Ok(f) => Value::Float(f),
            Err(_) => return Err(EngineError::shape(path, "float", format!("{:?}", s))),
        },
        (FieldType::String, v) => Value::Str(decode_scalar_string(v, path)?),
        (FieldType::List, Json::Array(items)) => Value::List(
            items
                .iter()
                .enumerate()
                .map(|(i, it)| decode_scalar_string(it, &format!("{}.{}", path, i)).map(Value::Str))
                .collect::<EngineResult<Vec<_>>>()?,
        ),
        (FieldType::Set, Json::Array(items)) => Value::Set(
            items
                .iter()
                .enumerate()
                .map(|(i, it)| decode_scalar_string(it, &format!("{}.{}", path, i)))
                .collect::<EngineResult<BTreeSet<_>>>()?,
        ),
        (FieldType::Map, Json::Object(m)) => Value::Map(
            m.iter()
                .map(|(k, v)| decode_scalar_string(v, &join(path, k)).map(|s| (k.clone(), s)))
                .collect::<EngineResult<BTreeMap<_, _>>>()?,
        ),
        (FieldType::Block { max_items, fields, .. }, v) => {
            // A single object is accepted as shorthand for a one-item block.
            let items: Vec<&Json> = match v {
                Json::Array(items) => items.iter().collect(),
                Json::Object(_) => vec![v],
                other => return Err(EngineError::shape(path, "block", json_type(other))),
            };
            if let Some(max) = max_items {
                if items.len() > *max {
                    return Err(EngineError::validation(format!("{}: at most {} item(s) allowed, got {}", path, max, items.len())));
                }
            }
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                out.push(Value::Record(decode_fields(fields, item, &format!("{}.{}", path, i), state)?));
            }
            Value::List(out)
        }
        (ty, other) => return Err(EngineError::shape(path, ty.name(), json_type(other))),
    };
    Ok(value)
}

/// Copy of `record` with every sensitive value replaced by [`REDACTED`].
pub fn redact(kind: ResourceKind, record: &Record) -> Record {
    redact_fields(schema_for(kind).fields, record)
}

fn redact_fields(fields: &'static [FieldSpec], record: &Record) -> Record {
    record
        .iter()
        .map(|(k, v)| {
            let spec = fields.iter().find(|f| f.name == k);
            let v = match (spec, v) {
                (Some(s), Value::Str(x)) if s.sensitive && !x.is_empty() => Value::Str(REDACTED.to_string()),
                (Some(FieldSpec { ty: FieldType::Block { fields: inner, .. }, .. }), Value::List(items)) => Value::List(
                    items
                        .iter()
                        .map(|it| match it {
                            Value::Record(r) => Value::Record(redact_fields(*inner, r)),
                            other => other.clone(),
                        })
                        .collect(),
                ),
                _ => v.clone(),
            };
            (k.to_string(), v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_kind_is_registered() {
        for kind in ResourceKind::ALL {
            assert_eq!(schema_for(kind).kind, kind);
        }
        assert_eq!(all().count(), ResourceKind::ALL.len());
    }

    #[test]
    fn variant_groups_name_declared_blocks() {
        fn check(fields: &'static [FieldSpec], groups: &'static [VariantGroup]) {
            for g in groups {
                for b in g.blocks {
                    let spec = fields.iter().find(|f| f.name == *b).unwrap_or_else(|| panic!("{} missing in {}", b, g.name));
                    assert!(matches!(spec.ty, FieldType::Block { max_items: Some(1), .. }), "{} must be a single block", b);
                }
            }
            for f in fields {
                if let FieldType::Block { fields, groups, .. } = f.ty { check(fields, groups); }
            }
        }
        for s in all() { check(s.fields, s.groups); }
    }

    #[test]
    fn decode_nested_network_provider() {
        let body = json!({
            "name": "web",
            "rke_config": [{
                "network_provider": [{ "plugin": "canal", "canal_network_provider": [{ "iface": "eth0" }] }]
            }]
        });
        let rec = decode(ResourceKind::Cluster, &body).unwrap();
        let net = rec.block("rke_config").and_then(|r| r.block("network_provider")).unwrap();
        assert_eq!(net.str_field("plugin"), Some("canal"));
        assert_eq!(net.block("canal_network_provider").and_then(|r| r.str_field("iface")), Some("eth0"));
    }

    #[test]
    fn decode_accepts_object_shorthand_and_numeric_strings() {
        let body = json!({
            "name": "pool-a",
            "cluster_id": "c-1",
            "hostname_prefix": "a-",
            "node_template_id": "nt-1",
            "quantity": "3",
            "node_taints": { "key": "k", "value": "v" }
        });
        let rec = decode(ResourceKind::NodePool, &body).unwrap();
        assert_eq!(rec.get("quantity"), Some(&Value::Int(3)));
        assert_eq!(rec.blocks("node_taints").count(), 1);
    }

    #[test]
    fn decode_rejects_bad_input() {
        let unknown = decode(ResourceKind::Project, &json!({"name": "p", "cluster_id": "c", "bogus": 1})).unwrap_err();
        assert!(unknown.to_string().contains("unknown field bogus"));

        let computed = decode(ResourceKind::Cluster, &json!({"name": "c", "kube_config": "x"})).unwrap_err();
        assert!(computed.to_string().contains("computed"));
        let stored = decode_state(ResourceKind::Cluster, &json!({"name": "c", "kube_config": "x"})).unwrap();
        assert_eq!(stored.str_field("kube_config"), Some("x"));

        let missing = decode(ResourceKind::Project, &json!({"name": "p"})).unwrap_err();
        assert!(missing.to_string().contains("cluster_id"));

        let shape = decode(ResourceKind::NodePool, &json!({
            "name": "p", "cluster_id": "c", "hostname_prefix": "h", "node_template_id": "n", "quantity": [1]
        }))
        .unwrap_err();
        match shape {
            EngineError::ShapeMismatch { field, expected, .. } => {
                assert_eq!(field, "quantity");
                assert_eq!(expected, "int");
            }
            other => panic!("unexpected {other:?}"),
        }

        let too_many = decode(ResourceKind::Cluster, &json!({"name": "c", "rke_config": [{}, {}]})).unwrap_err();
        assert!(too_many.to_string().contains("at most 1"));

        let bad_name = decode(ResourceKind::Project, &json!({"name": "Not_Valid", "cluster_id": "c"})).unwrap_err();
        assert!(matches!(bad_name, EngineError::Validation(_)));
    }

    #[test]
    fn nested_shape_error_names_full_path() {
        let body = json!({"name": "web", "rke_config": [{"network_provider": [{"mtu": "jumbo"}]}]});
        match decode(ResourceKind::Cluster, &body).unwrap_err() {
            EngineError::ShapeMismatch { field, .. } => assert_eq!(field, "rke_config.0.network_provider.0.mtu"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lookup_walks_blocks() {
        let s = schema_for(ResourceKind::Cluster);
        assert!(s.lookup("rke_config.network_provider.weave_network_provider.password").unwrap().sensitive);
        assert!(s.lookup("rke_config.private_registries").unwrap().ordered);
        assert!(s.lookup("rke_config.nope").is_none());
    }

    #[test]
    fn redact_masks_nested_secrets() {
        let rec = Record::new().with("name", "creds").with(
            "s3_credential_config",
            vec![Record::new().with("access_key", "AK").with("secret_key", "SK")],
        );
        let out = redact(ResourceKind::CloudCredential, &rec);
        let s3 = out.block("s3_credential_config").unwrap();
        assert_eq!(s3.str_field("access_key"), Some("AK"));
        assert_eq!(s3.str_field("secret_key"), Some(REDACTED));
    }
}
