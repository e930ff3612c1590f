//! YAML documents of the form `{kind, name, spec}`, decoded through the schema registry.

use anyhow::{anyhow, bail, Context, Result};
use corral_core::{Record, ResourceKind};
use corral_gateway::Filters;
use corral_schema::FieldSpec;
use serde::Deserialize;
use serde_json::Value as Json;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    kind: String,
    name: String,
    #[serde(default)]
    spec: Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub kind: ResourceKind,
    /// Local handle; also the object name when the kind has one.
    pub name: String,
    pub record: Record,
}

impl RawDocument {
    fn into_document(self) -> Result<Document> {
        let kind: ResourceKind = self.kind.parse()?;
        let mut spec = match self.spec {
            Json::Null => serde_json::Map::new(),
            Json::Object(m) => m,
            other => bail!("spec must be a mapping, got {}", other),
        };
        let named = corral_schema::schema_for(kind).field("name").map(FieldSpec::is_input).unwrap_or(false);
        if named {
            match spec.get("name").and_then(Json::as_str) {
                Some(n) if n != self.name => bail!("spec.name {:?} does not match document name {:?}", n, self.name),
                Some(_) => {}
                None => {
                    spec.insert("name".into(), Json::String(self.name.clone()));
                }
            }
        }
        let record = corral_schema::decode(kind, &Json::Object(spec))?;
        Ok(Document { kind, name: self.name, record })
    }
}

/// Parse every document in a (possibly multi-document) YAML stream. Empty documents are skipped.
pub fn parse_documents(text: &str) -> Result<Vec<Document>> {
    let mut out = Vec::new();
    for (i, de) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let raw = Option::<RawDocument>::deserialize(de).with_context(|| format!("document {}", i + 1))?;
        if let Some(raw) = raw {
            let doc = raw.into_document().with_context(|| format!("document {}", i + 1))?;
            out.push(doc);
        }
    }
    Ok(out)
}

pub fn read_documents(path: &str) -> Result<Vec<Document>> {
    let text = if path == "-" {
        std::io::read_to_string(std::io::stdin()).context("reading stdin")?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?
    };
    parse_documents(&text)
}

/// `key=value` pairs, keyed by wire field name.
pub fn parse_filters(pairs: &[String]) -> Result<Filters> {
    pairs
        .iter()
        .map(|p| {
            p.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| anyhow!("expected key=value, got {:?}", p))
        })
        .collect()
}
