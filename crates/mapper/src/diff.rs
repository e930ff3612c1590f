//! Field-level difference between two records, used for plan output.

use corral_core::{Record, ResourceKind, Value};
use corral_schema::{FieldSpec, FieldType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub adds: usize,
    pub updates: usize,
    pub removes: usize,
    /// Dotted paths of every differing field, in walk order.
    pub paths: Vec<String>,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool { self.adds + self.updates + self.removes == 0 }
}

/// Walk `target` against `base`. Absent and empty collections are the same, so a field only
/// counts as added or removed when the other side holds something.
/// Lists compare by position.
pub fn diff_records(target: &Record, base: &Record) -> DiffSummary { diff_fields(&[], target, base) }

/// [`diff_records`] for one kind: lists its schema does not mark `ordered` compare as multisets.
pub fn diff_kind(kind: ResourceKind, target: &Record, base: &Record) -> DiffSummary {
    diff_fields(corral_schema::schema_for(kind).fields, target, base)
}

pub fn diff_fields(fields: &[FieldSpec], target: &Record, base: &Record) -> DiffSummary {
    let mut out = DiffSummary::default();
    walk_record("", fields, target, base, &mut out);
    out
}

/// Same items with the same multiplicity, in any order.
fn same_items(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|x| match (0..b.len()).find(|&i| !used[i] && b[i] == *x) {
        Some(i) => {
            used[i] = true;
            true
        }
        None => false,
    })
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() { key.to_string() } else { format!("{}.{}", prefix, key) }
}

fn walk_record(prefix: &str, fields: &[FieldSpec], a: &Record, b: &Record, out: &mut DiffSummary) {
    for (k, av) in a.iter() {
        let path = join(prefix, k);
        match b.get(k) {
            Some(bv) => walk_value(&path, fields.iter().find(|f| f.name == k), av, bv, out),
            None if !av.is_empty_collection() => {
                out.adds += 1;
                out.paths.push(path);
            }
            None => {}
        }
    }
    for (k, bv) in b.iter() {
        if a.get(k).is_none() && !bv.is_empty_collection() {
            out.removes += 1;
            out.paths.push(join(prefix, k));
        }
    }
}

/// Unknown fields (`spec` is `None`) are treated as ordered.
fn walk_value(path: &str, spec: Option<&FieldSpec>, a: &Value, b: &Value, out: &mut DiffSummary) {
    if a == b {
        return;
    }
    let nested: &[FieldSpec] = match spec.map(|s| s.ty) {
        Some(FieldType::Block { fields, .. }) => fields,
        _ => &[],
    };
    match (a, b) {
        (Value::Record(ar), Value::Record(br)) => walk_record(path, nested, ar, br, out),
        (Value::List(al), Value::List(bl)) => {
            if spec.is_some_and(|s| !s.ordered) && same_items(al, bl) {
                return;
            }
            let common = al.len().min(bl.len());
            for i in 0..common {
                walk_value(&format!("{}.{}", path, i), spec, &al[i], &bl[i], out);
            }
            if al.len() > bl.len() {
                out.adds += al.len() - bl.len();
                out.paths.push(path.to_string());
            }
            if bl.len() > al.len() {
                out.removes += bl.len() - al.len();
                out.paths.push(path.to_string());
            }
        }
        (a, b) if b.is_empty_collection() && !a.is_empty_collection() => {
            out.adds += 1;
            out.paths.push(path.to_string());
        }
        (a, b) if a.is_empty_collection() && !b.is_empty_collection() => {
            out.removes += 1;
            out.paths.push(path.to_string());
        }
        _ => {
            out.updates += 1;
            out.paths.push(path.to_string());
        }
    }
}
