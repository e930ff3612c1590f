//! Declarative records: the caller-facing `field name -> value` shape.
//!
//! Equality is declarative rather than structural: an absent field, an empty
//! list, an empty set and an empty map all compare equal. Nested blocks are
//! always carried as a list of records, even when the schema caps them at one.


use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value as Json;

#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Ordered list of scalars or nested records.
    List(Vec<Value>),
    /// Unordered set of strings.
    Set(BTreeSet<String>),
    /// Unordered string map (annotations, labels, options).
    Map(BTreeMap<String, String>),
    Record(Record),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
        }
    }

    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::List(v) => v.is_empty(),
            Value::Set(v) => v.is_empty(),
            Value::Map(v) => v.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self { Value::Str(s) => Some(s), _ => None }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self { Value::List(v) => Some(v), _ => None }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self { Value::Record(r) => Some(r), _ => None }
    }

    /// Render for log lines and error messages; never used for round trips.
    pub fn describe(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => format!("{:?}", s),
            other => other.type_name().to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (a, b) => a.is_empty_collection() && b.is_empty_collection(),
        }
    }
}

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::Str(v.to_string()) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::Str(v) } }
impl From<Record> for Value { fn from(v: Record) -> Self { Value::Record(v) } }
impl From<BTreeMap<String, String>> for Value { fn from(v: BTreeMap<String, String>) -> Self { Value::Map(v) } }
impl From<BTreeSet<String>> for Value { fn from(v: BTreeSet<String>) -> Self { Value::Set(v) } }

impl From<Vec<Record>> for Value {
    fn from(v: Vec<Record>) -> Self { Value::List(v.into_iter().map(Value::Record).collect()) }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self { Value::List(v.into_iter().map(Value::Str).collect()) }
}

/// Ordered mapping of field name to value.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self { Self::default() }

    /// Builder-style insert, handy for fixtures and nested blocks.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> { self.fields.remove(key) }
    pub fn get(&self, key: &str) -> Option<&Value> { self.fields.get(key) }
    pub fn len(&self) -> usize { self.fields.len() }
    pub fn is_empty(&self) -> bool { self.fields.is_empty() }
    pub fn keys(&self) -> impl Iterator<Item = &str> { self.fields.keys().map(|k| k.as_str()) }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> { self.fields.iter().map(|(k, v)| (k.as_str(), v)) }

    /// Present and not an empty collection.
    pub fn is_set(&self, key: &str) -> bool {
        self.fields.get(key).map(|v| !v.is_empty_collection()).unwrap_or(false)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> { self.get(key).and_then(|v| v.as_str()) }

    /// Nested records of a block field, in list order. Non-record items are skipped.
    pub fn blocks<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a Record> + 'a {
        self.get(key).and_then(|v| v.as_list()).unwrap_or(&[]).iter().filter_map(|v| v.as_record())
    }

    /// First nested record of a single-item block field.
    pub fn block(&self, key: &str) -> Option<&Record> { self.blocks(key).next() }

    /// True when `key` differs between `self` (old) and `other` (new).
    pub fn changed(&self, other: &Record, key: &str) -> bool {
        match (self.get(key), other.get(key)) {
            (Some(a), Some(b)) => a != b,
            (Some(v), None) | (None, Some(v)) => !v.is_empty_collection(),
            (None, None) => false,
        }
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        let keys: BTreeSet<&String> = self.fields.keys().chain(other.fields.keys()).collect();
        keys.into_iter().all(|k| !self.changed(other, k))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self { fields: iter.into_iter().collect() }
    }
}

impl From<&Value> for Json {
    fn from(v: &Value) -> Self {
        match v {
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Json::from).collect()),
            Value::Set(items) => Json::Array(items.iter().cloned().map(Json::String).collect()),
            Value::Map(m) => Json::Object(m.iter().map(|(k, v)| (k.clone(), Json::String(v.clone()))).collect()),
            Value::Record(r) => Json::from(r),
        }
    }
}

impl From<&Record> for Json {
    fn from(r: &Record) -> Self {
        Json::Object(r.fields.iter().map(|(k, v)| (k.clone(), Json::from(v))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_and_empty_collections_compare_equal() {
        let a = Record::new().with("name", "web");
        let b = Record::new()
            .with("name", "web")
            .with("labels", BTreeMap::new())
            .with("tolerations", Value::List(vec![]))
            .with("allowed", BTreeSet::new());
        assert_eq!(a, b);
        assert_eq!(b, a);
    }

    #[test]
    fn scalar_difference_is_not_hidden() {
        let a = Record::new().with("name", "web").with("mtu", 0i64);
        let b = Record::new().with("name", "web");
        assert_ne!(a, b, "a zero scalar is a value, not an empty collection");
    }

    #[test]
    fn list_order_matters_set_order_does_not() {
        let l1 = Value::from(vec!["a".to_string(), "b".to_string()]);
        let l2 = Value::from(vec!["b".to_string(), "a".to_string()]);
        assert_ne!(l1, l2);
        let s1: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let s2: BTreeSet<String> = ["b", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(Value::Set(s1), Value::Set(s2));
    }

    #[test]
    fn changed_reports_per_field() {
        let old = Record::new().with("psp", "restricted").with("enabled", true);
        let new = Record::new().with("psp", "unrestricted").with("enabled", true);
        assert!(old.changed(&new, "psp"));
        assert!(!old.changed(&new, "enabled"));
        assert!(!old.changed(&new, "missing"));
    }

    #[test]
    fn block_reads_first_nested_record() {
        let rec = Record::new().with("canal", vec![Record::new().with("iface", "eth0")]);
        assert_eq!(rec.block("canal").and_then(|r| r.str_field("iface")), Some("eth0"));
        assert!(rec.block("flannel").is_none());
    }

    #[test]
    fn json_rendering_is_untyped() {
        let rec = Record::new()
            .with("name", "web")
            .with("quantity", 3i64)
            .with("labels", BTreeMap::from([("a".to_string(), "1".to_string())]));
        let j = Json::from(&rec);
        assert_eq!(j, serde_json::json!({"name": "web", "quantity": 3, "labels": {"a": "1"}}));
    }
}
