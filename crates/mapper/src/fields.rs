//! Typed access to declarative records.
//!
//! `Reader` is the single place where record values are coerced into wire scalars; a value that
//! cannot be coerced fails with `ShapeMismatch` naming the full field path. The `put_*` helpers
//! are the flatten-side counterpart.

use std::collections::{BTreeMap, BTreeSet};

use corral_core::{EngineError, EngineResult, Record, Value};

#[derive(Clone)]
pub struct Reader<'a> {
    rec: &'a Record,
    path: String,
}

impl<'a> Reader<'a> {
    pub fn new(rec: &'a Record) -> Self { Self { rec, path: String::new() } }

    pub fn record(&self) -> &'a Record { self.rec }

    pub fn path(&self, key: &str) -> String {
        if self.path.is_empty() { key.to_string() } else { format!("{}.{}", self.path, key) }
    }

    fn get(&self, key: &str) -> Option<&'a Value> { self.rec.get(key) }

    fn scalar_string(&self, key: &str, v: &Value) -> EngineResult<String> {
        match v {
            Value::Str(s) => Ok(s.clone()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(EngineError::shape(self.path(key), "string", other.type_name())),
        }
    }

    pub fn string(&self, key: &str) -> EngineResult<Option<String>> {
        self.get(key).map(|v| self.scalar_string(key, v)).transpose()
    }

    pub fn req_string(&self, key: &str) -> EngineResult<String> {
        match self.string(key)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(EngineError::validation(format!("missing required field {}", self.path(key)))),
        }
    }

    pub fn bool(&self, key: &str) -> EngineResult<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::Str(s)) if s == "true" => Ok(Some(true)),
            Some(Value::Str(s)) if s == "false" => Ok(Some(false)),
            Some(other) => Err(EngineError::shape(self.path(key), "bool", other.describe())),
        }
    }

    pub fn int(&self, key: &str) -> EngineResult<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Int(i)) => Ok(Some(*i)),
            Some(Value::Float(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(*f as i64)),
            Some(Value::Str(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| EngineError::shape(self.path(key), "int", format!("{:?}", s))),
            Some(other) => Err(EngineError::shape(self.path(key), "int", other.describe())),
        }
    }

    pub fn float(&self, key: &str) -> EngineResult<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Float(f)) => Ok(Some(*f)),
            Some(Value::Int(i)) => Ok(Some(*i as f64)),
            Some(Value::Str(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| EngineError::shape(self.path(key), "float", format!("{:?}", s))),
            Some(other) => Err(EngineError::shape(self.path(key), "float", other.describe())),
        }
    }

    pub fn map(&self, key: &str) -> EngineResult<BTreeMap<String, String>> {
        match self.get(key) {
            None => Ok(BTreeMap::new()),
            Some(Value::Map(m)) => Ok(m.clone()),
            Some(v) if v.is_empty_collection() => Ok(BTreeMap::new()),
            Some(other) => Err(EngineError::shape(self.path(key), "map", other.type_name())),
        }
    }

    pub fn list(&self, key: &str) -> EngineResult<Vec<String>> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => items.iter().map(|v| self.scalar_string(key, v)).collect(),
            Some(Value::Set(items)) => Ok(items.iter().cloned().collect()),
            Some(other) => Err(EngineError::shape(self.path(key), "list", other.type_name())),
        }
    }

    pub fn set(&self, key: &str) -> EngineResult<BTreeSet<String>> {
        Ok(self.list(key)?.into_iter().collect())
    }

    /// Nested records of a block field.
    pub fn blocks(&self, key: &str) -> EngineResult<Vec<Reader<'a>>> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => items
                .iter()
                .enumerate()
                .map(|(i, v)| match v {
                    Value::Record(r) => Ok(Reader { rec: r, path: format!("{}.{}", self.path(key), i) }),
                    other => Err(EngineError::shape(format!("{}.{}", self.path(key), i), "block", other.type_name())),
                })
                .collect(),
            Some(Value::Record(r)) => Ok(vec![Reader { rec: r, path: format!("{}.0", self.path(key)) }]),
            Some(v) if v.is_empty_collection() => Ok(Vec::new()),
            Some(other) => Err(EngineError::shape(self.path(key), "block", other.type_name())),
        }
    }

    /// The single item of a max-one block.
    pub fn block(&self, key: &str) -> EngineResult<Option<Reader<'a>>> {
        let mut items = self.blocks(key)?;
        if items.len() > 1 {
            return Err(EngineError::validation(format!("{}: at most 1 item allowed, got {}", self.path(key), items.len())));
        }
        Ok(items.pop())
    }
}

/// Write an optional scalar; `None` removes the field.
pub fn put<T: Into<Value>>(rec: &mut Record, key: &str, v: Option<T>) {
    match v {
        Some(v) => { rec.insert(key, v); }
        None => { rec.remove(key); }
    }
}

pub fn put_map(rec: &mut Record, key: &str, m: &BTreeMap<String, String>) {
    rec.insert(key, Value::Map(m.clone()));
}

pub fn put_list(rec: &mut Record, key: &str, items: &[String]) {
    rec.insert(key, Value::from(items.to_vec()));
}

pub fn put_set<'s>(rec: &mut Record, key: &str, items: impl IntoIterator<Item = &'s String>) {
    rec.insert(key, Value::Set(items.into_iter().cloned().collect()));
}

/// Blocks always land as a list, empty when the remote side has nothing.
pub fn put_blocks(rec: &mut Record, key: &str, items: Vec<Record>) {
    rec.insert(key, Value::from(items));
}

pub fn put_block(rec: &mut Record, key: &str, item: Option<Record>) {
    put_blocks(rec, key, item.into_iter().collect());
}

/// Write a sensitive string. An empty or absent remote value never replaces a value the caller
/// already holds: it is taken from `prior` when given, and otherwise `out` is left untouched.
pub fn put_secret(out: &mut Record, key: &str, remote: Option<&str>, prior: Option<&Record>) {
    match remote.filter(|s| !s.is_empty()) {
        Some(v) => {
            out.insert(key, v);
        }
        None => {
            if let Some(v) = prior.and_then(|p| p.get(key)).cloned() {
                out.insert(key, v);
            }
        }
    }
}

/// The prior nested record at `index` of block `key`, used to carry secrets forward.
pub fn prior_block<'r>(prior: Option<&'r Record>, key: &str, index: usize) -> Option<&'r Record> {
    prior.and_then(|p| p.blocks(key).nth(index))
}

/// Optional wire strings: empty and absent are the same thing.
pub fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|v| !v.is_empty())
}
