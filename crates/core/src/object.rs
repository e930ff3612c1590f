//! Remote object envelope shared by every resource kind.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Resource kinds the engine knows how to translate and drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cluster,
    Project,
    NodePool,
    CloudCredential,
    ClusterAlertRule,
    AuthConfig,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Cluster,
        ResourceKind::Project,
        ResourceKind::NodePool,
        ResourceKind::CloudCredential,
        ResourceKind::ClusterAlertRule,
        ResourceKind::AuthConfig,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "cluster",
            ResourceKind::Project => "project",
            ResourceKind::NodePool => "node_pool",
            ResourceKind::CloudCredential => "cloud_credential",
            ResourceKind::ClusterAlertRule => "cluster_alert_rule",
            ResourceKind::AuthConfig => "auth_config",
        }
    }

    /// REST collection segment under `/v3`.
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "clusters",
            ResourceKind::Project => "projects",
            ResourceKind::NodePool => "nodePools",
            ResourceKind::CloudCredential => "cloudCredentials",
            ResourceKind::ClusterAlertRule => "clusterAlertRules",
            ResourceKind::AuthConfig => "authConfigs",
        }
    }

    /// Wire `type` discriminator injected on create.
    pub fn wire_type(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "cluster",
            ResourceKind::Project => "project",
            ResourceKind::NodePool => "nodePool",
            ResourceKind::CloudCredential => "cloudCredential",
            ResourceKind::ClusterAlertRule => "clusterAlertRule",
            ResourceKind::AuthConfig => "authConfig",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ResourceKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == norm || k.collection().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::Validation(format!("unknown resource kind: {}", s)))
    }
}

/// Server-managed identity and status fields carried by every remote object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transitioning_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ResourceMeta {
    /// Whether the server currently offers `action` on this object.
    pub fn allows(&self, action: &str) -> bool { self.actions.contains_key(action) }
}

/// A typed remote object. Implementors flatten `ResourceMeta` into their wire form.
pub trait RemoteObject: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn meta(&self) -> &ResourceMeta;
    fn meta_mut(&mut self) -> &mut ResourceMeta;

    fn id(&self) -> &str { &self.meta().id }
    fn state(&self) -> &str { &self.meta().state }

    /// Carry server identity fields (id, links, actions, version) onto a locally built object
    /// before a full replace.
    fn adopt_server_meta(&mut self, server: &ResourceMeta) {
        let meta = self.meta_mut();
        meta.id = server.id.clone();
        meta.links = server.links.clone();
        meta.actions = server.actions.clone();
        meta.resource_version = server.resource_version.clone();
        meta.state = server.state.clone();
    }
}

pub fn to_payload<T: RemoteObject>(obj: &T) -> EngineResult<serde_json::Value> {
    Ok(serde_json::to_value(obj)?)
}

pub fn from_payload<T: RemoteObject>(payload: serde_json::Value) -> EngineResult<T> {
    Ok(serde_json::from_value(payload)?)
}
