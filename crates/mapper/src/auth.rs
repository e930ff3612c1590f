//! Auth provider configs.
//!
//! The wire form is internally tagged on `type`; each provider is a singleton whose id is the
//! provider name, so there is no create on the remote side, only replace.

use corral_core::{EngineError, EngineResult, Record, RemoteObject, ResourceKind, ResourceMeta};
use corral_schema::AUTH_PROVIDER;
use serde::{Deserialize, Serialize};

use crate::fields::{non_empty, prior_block, put, put_block, put_blocks, put_list, put_map, put_secret, put_set, Reader};
use crate::{variant, Block, Mapper};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCommon {
    #[serde(flatten)]
    pub meta: ResourceMeta,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_principal_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamlConfig {
    #[serde(flatten)]
    pub common: AuthCommon,
    pub display_name_field: String,
    pub groups_field: String,
    pub uid_field: String,
    pub user_name_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idp_metadata_content: Option<String>,
    pub rancher_api_host: String,
    pub sp_cert: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sp_key: Option<String>,
    #[serde(default, rename = "entityID", skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl Block for SamlConfig {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self {
            common: AuthCommon::default(),
            display_name_field: r.req_string("display_name_field")?,
            groups_field: r.req_string("groups_field")?,
            uid_field: r.req_string("uid_field")?,
            user_name_field: r.req_string("user_name_field")?,
            idp_metadata_content: Some(r.req_string("idp_metadata_content")?),
            rancher_api_host: r.req_string("rancher_api_host")?,
            sp_cert: r.req_string("sp_cert")?,
            sp_key: Some(r.req_string("sp_key")?),
            entity_id: r.string("entity_id")?,
        })
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new()
            .with("display_name_field", self.display_name_field.as_str())
            .with("groups_field", self.groups_field.as_str())
            .with("uid_field", self.uid_field.as_str())
            .with("user_name_field", self.user_name_field.as_str())
            .with("rancher_api_host", self.rancher_api_host.as_str())
            .with("sp_cert", self.sp_cert.as_str());
        put_secret(&mut out, "idp_metadata_content", non_empty(&self.idp_metadata_content), prior);
        put_secret(&mut out, "sp_key", non_empty(&self.sp_key), prior);
        put(&mut out, "entity_id", self.entity_id.clone());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapConfig {
    #[serde(flatten)]
    pub common: AuthCommon,
    pub servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    pub service_account_distinguished_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_password: Option<String>,
    pub user_search_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_search_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_timeout: Option<i64>,
}

impl Block for LdapConfig {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        let servers = r.list("servers")?;
        if servers.is_empty() {
            return Err(EngineError::validation(format!("missing required field {}", r.path("servers"))));
        }
        let cfg = Self {
            common: AuthCommon::default(),
            servers,
            port: r.int("port")?,
            service_account_distinguished_name: r.req_string("service_account_distinguished_name")?,
            service_account_password: Some(r.req_string("service_account_password")?),
            user_search_base: r.req_string("user_search_base")?,
            group_search_base: r.string("group_search_base")?,
            tls: r.bool("tls")?,
            certificate: r.string("certificate")?,
            connection_timeout: r.int("connection_timeout")?,
        };
        if cfg.tls == Some(true) && non_empty(&cfg.certificate).is_none() {
            return Err(EngineError::validation(format!("{}: tls needs a certificate", r.path("tls"))));
        }
        Ok(cfg)
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new()
            .with("service_account_distinguished_name", self.service_account_distinguished_name.as_str())
            .with("user_search_base", self.user_search_base.as_str());
        put_list(&mut out, "servers", &self.servers);
        put(&mut out, "port", self.port);
        put_secret(&mut out, "service_account_password", non_empty(&self.service_account_password), prior);
        put(&mut out, "group_search_base", self.group_search_base.clone());
        put(&mut out, "tls", self.tls);
        put(&mut out, "certificate", self.certificate.clone());
        put(&mut out, "connection_timeout", self.connection_timeout);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthConfig {
    #[serde(rename = "oktaConfig")]
    Okta(SamlConfig),
    #[serde(rename = "keyCloakConfig")]
    Keycloak(SamlConfig),
    #[serde(rename = "openLdapConfig")]
    OpenLdap(LdapConfig),
}

impl AuthConfig {
    /// Provider name, which is also the object id.
    pub fn provider(&self) -> &'static str {
        match self {
            AuthConfig::Okta(_) => "okta",
            AuthConfig::Keycloak(_) => "keycloak",
            AuthConfig::OpenLdap(_) => "openldap",
        }
    }

    pub fn wire_type(&self) -> &'static str {
        match self {
            AuthConfig::Okta(_) => "oktaConfig",
            AuthConfig::Keycloak(_) => "keyCloakConfig",
            AuthConfig::OpenLdap(_) => "openLdapConfig",
        }
    }

    pub fn common(&self) -> &AuthCommon {
        match self {
            AuthConfig::Okta(c) | AuthConfig::Keycloak(c) => &c.common,
            AuthConfig::OpenLdap(c) => &c.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut AuthCommon {
        match self {
            AuthConfig::Okta(c) | AuthConfig::Keycloak(c) => &mut c.common,
            AuthConfig::OpenLdap(c) => &mut c.common,
        }
    }

    /// The record block naming this provider.
    pub fn block(&self) -> &'static str { self.provider() }

    fn flatten_block(&self, prior: Option<&Record>) -> Record {
        match self {
            AuthConfig::Okta(c) | AuthConfig::Keycloak(c) => c.flatten(prior),
            AuthConfig::OpenLdap(c) => c.flatten(prior),
        }
    }
}

impl RemoteObject for AuthConfig {
    const KIND: ResourceKind = ResourceKind::AuthConfig;

    fn meta(&self) -> &ResourceMeta { &self.common().meta }
    fn meta_mut(&mut self) -> &mut ResourceMeta { &mut self.common_mut().meta }
}

/// Provider name of an auth config record, without expanding it.
pub fn provider_of(record: &Record) -> EngineResult<&'static str> {
    variant::resolve_record(record, &AUTH_PROVIDER)?
        .ok_or_else(|| EngineError::NoVariantPopulated { group: AUTH_PROVIDER.name.to_string() })
}

#[derive(Debug, Default)]
pub struct AuthConfigMapper;

impl Mapper for AuthConfigMapper {
    type Remote = AuthConfig;

    fn expand(&self, record: &Record) -> EngineResult<AuthConfig> {
        let r = Reader::new(record);
        let block = provider_of(record)?;
        let inner = r.block(block)?.ok_or_else(|| EngineError::validation(format!("{} is empty", block)))?;
        let mut cfg = match block {
            "okta" => AuthConfig::Okta(SamlConfig { entity_id: None, ..SamlConfig::expand(&inner)? }),
            "keycloak" => AuthConfig::Keycloak(SamlConfig::expand(&inner)?),
            "openldap" => AuthConfig::OpenLdap(LdapConfig::expand(&inner)?),
            other => return Err(EngineError::validation(format!("unknown auth provider {}", other))),
        };

        let access_mode = r.string("access_mode")?.filter(|s| !s.is_empty());
        let allowed_principal_ids: Vec<String> = r.set("allowed_principal_ids")?.into_iter().collect();
        if let Some(mode) = access_mode.as_deref() {
            if !matches!(mode, "required" | "restricted" | "unrestricted") {
                return Err(EngineError::validation(format!("access_mode: unknown mode {:?}", mode)));
            }
            if mode != "unrestricted" && allowed_principal_ids.is_empty() {
                return Err(EngineError::validation(format!(
                    "allowed_principal_ids is required on access_mode {}",
                    mode
                )));
            }
        }

        let provider = cfg.provider();
        *cfg.common_mut() = AuthCommon {
            meta: ResourceMeta {
                id: provider.to_string(),
                name: provider.to_string(),
                annotations: r.map("annotations")?,
                labels: r.map("labels")?,
                ..Default::default()
            },
            enabled: r.bool("enabled")?.unwrap_or(true),
            access_mode,
            allowed_principal_ids,
        };
        Ok(cfg)
    }

    fn flatten(&self, remote: &AuthConfig, record: &mut Record) -> EngineResult<()> {
        let prior = record.clone();
        let common = remote.common();
        record.insert("name", remote.provider());
        record.insert("type", remote.wire_type());
        record.insert("enabled", common.enabled);
        put(record, "access_mode", common.access_mode.clone());
        put_set(record, "allowed_principal_ids", &common.allowed_principal_ids);
        put_map(record, "annotations", &common.meta.annotations);
        put_map(record, "labels", &common.meta.labels);
        for b in AUTH_PROVIDER.blocks {
            put_blocks(record, b, Vec::new());
        }
        let nested = remote.flatten_block(prior_block(Some(&prior), remote.block(), 0));
        put_block(record, remote.block(), Some(nested));
        Ok(())
    }
}
