//! Cloud credentials. Exactly one driver block must be present.

use corral_core::{EngineError, EngineResult, Record, ResourceKind, ResourceMeta};
use corral_schema::CREDENTIAL_DRIVER;
use serde::{Deserialize, Serialize};

use crate::fields::{non_empty, prior_block, put, put_block, put_blocks, put_map, put_secret, Reader};
use crate::{remote_object, variant, Block, Mapper};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amazonec2CredentialConfig {
    pub access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_region: Option<String>,
}

impl Block for Amazonec2CredentialConfig {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self {
            access_key: r.req_string("access_key")?,
            secret_key: Some(r.req_string("secret_key")?),
            default_region: r.string("default_region")?,
        })
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new().with("access_key", self.access_key.as_str());
        put_secret(&mut out, "secret_key", non_empty(&self.secret_key), prior);
        put(&mut out, "default_region", self.default_region.clone());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureCredentialConfig {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub subscription_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl Block for AzureCredentialConfig {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self {
            client_id: r.req_string("client_id")?,
            client_secret: Some(r.req_string("client_secret")?),
            subscription_id: r.req_string("subscription_id")?,
            environment: r.string("environment")?,
            tenant_id: r.string("tenant_id")?,
        })
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new()
            .with("client_id", self.client_id.as_str())
            .with("subscription_id", self.subscription_id.as_str());
        put_secret(&mut out, "client_secret", non_empty(&self.client_secret), prior);
        put(&mut out, "environment", self.environment.clone());
        put(&mut out, "tenant_id", self.tenant_id.clone());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenstackCredentialConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Block for OpenstackCredentialConfig {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self { password: Some(r.req_string("password")?) })
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new();
        put_secret(&mut out, "password", non_empty(&self.password), prior);
        out
    }
}

/// S3 credentials. `defaultSkipSSLVerify` travels as the string "true"/"false".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3CredentialConfig {
    pub access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_endpoint: Option<String>,
    #[serde(default, rename = "defaultEndpointCA", skip_serializing_if = "Option::is_none")]
    pub default_endpoint_ca: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_region: Option<String>,
    #[serde(default, rename = "defaultSkipSSLVerify", skip_serializing_if = "Option::is_none")]
    pub default_skip_ssl_verify: Option<String>,
}

impl Block for S3CredentialConfig {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self {
            access_key: r.req_string("access_key")?,
            secret_key: Some(r.req_string("secret_key")?),
            default_bucket: r.string("default_bucket")?,
            default_endpoint: r.string("default_endpoint")?,
            default_endpoint_ca: r.string("default_endpoint_ca")?,
            default_folder: r.string("default_folder")?,
            default_region: r.string("default_region")?,
            default_skip_ssl_verify: r.bool("default_skip_ssl_verify")?.map(|b| b.to_string()),
        })
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new().with("access_key", self.access_key.as_str());
        put_secret(&mut out, "secret_key", non_empty(&self.secret_key), prior);
        put(&mut out, "default_bucket", self.default_bucket.clone());
        put(&mut out, "default_endpoint", self.default_endpoint.clone());
        put(&mut out, "default_endpoint_ca", self.default_endpoint_ca.clone());
        put(&mut out, "default_folder", self.default_folder.clone());
        put(&mut out, "default_region", self.default_region.clone());
        put(&mut out, "default_skip_ssl_verify", self.default_skip_ssl_verify.as_deref().map(|s| s == "true"));
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CredentialDriver {
    Amazonec2(Amazonec2CredentialConfig),
    Azure(AzureCredentialConfig),
    Openstack(OpenstackCredentialConfig),
    S3(S3CredentialConfig),
}

impl CredentialDriver {
    /// Driver name reported in the record's computed `driver` field.
    pub fn tag(&self) -> &'static str {
        match self {
            CredentialDriver::Amazonec2(_) => "amazonec2",
            CredentialDriver::Azure(_) => "azure",
            CredentialDriver::Openstack(_) => "openstack",
            CredentialDriver::S3(_) => "s3",
        }
    }

    pub fn block(&self) -> &'static str {
        match self {
            CredentialDriver::Amazonec2(_) => "amazonec2_credential_config",
            CredentialDriver::Azure(_) => "azure_credential_config",
            CredentialDriver::Openstack(_) => "openstack_credential_config",
            CredentialDriver::S3(_) => "s3_credential_config",
        }
    }

    fn expand(block: &'static str, r: &Reader<'_>) -> EngineResult<Self> {
        let inner = r.block(block)?.ok_or_else(|| EngineError::validation(format!("{} is empty", r.path(block))))?;
        Ok(match block {
            "amazonec2_credential_config" => CredentialDriver::Amazonec2(Amazonec2CredentialConfig::expand(&inner)?),
            "azure_credential_config" => CredentialDriver::Azure(AzureCredentialConfig::expand(&inner)?),
            "openstack_credential_config" => CredentialDriver::Openstack(OpenstackCredentialConfig::expand(&inner)?),
            "s3_credential_config" => CredentialDriver::S3(S3CredentialConfig::expand(&inner)?),
            other => return Err(EngineError::validation(format!("unknown credential block {}", other))),
        })
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let prior = prior_block(prior, self.block(), 0);
        match self {
            CredentialDriver::Amazonec2(c) => c.flatten(prior),
            CredentialDriver::Azure(c) => c.flatten(prior),
            CredentialDriver::Openstack(c) => c.flatten(prior),
            CredentialDriver::S3(c) => c.flatten(prior),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudCredential {
    #[serde(flatten)]
    pub meta: ResourceMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "amazonec2credentialConfig", default, skip_serializing_if = "Option::is_none")]
    pub amazonec2: Option<Amazonec2CredentialConfig>,
    #[serde(rename = "azurecredentialConfig", default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureCredentialConfig>,
    #[serde(rename = "openstackcredentialConfig", default, skip_serializing_if = "Option::is_none")]
    pub openstack: Option<OpenstackCredentialConfig>,
    #[serde(rename = "s3credentialConfig", default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3CredentialConfig>,
}

remote_object!(CloudCredential, ResourceKind::CloudCredential);

impl CloudCredential {
    pub fn driver(&self) -> EngineResult<CredentialDriver> {
        let (_, d) = variant::resolve_remote(
            &CREDENTIAL_DRIVER,
            [
                ("amazonec2_credential_config", self.amazonec2.clone().map(CredentialDriver::Amazonec2)),
                ("azure_credential_config", self.azure.clone().map(CredentialDriver::Azure)),
                ("openstack_credential_config", self.openstack.clone().map(CredentialDriver::Openstack)),
                ("s3_credential_config", self.s3.clone().map(CredentialDriver::S3)),
            ],
        )?;
        Ok(d)
    }

    pub fn set_driver(&mut self, driver: CredentialDriver) {
        self.amazonec2 = None;
        self.azure = None;
        self.openstack = None;
        self.s3 = None;
        match driver {
            CredentialDriver::Amazonec2(c) => self.amazonec2 = Some(c),
            CredentialDriver::Azure(c) => self.azure = Some(c),
            CredentialDriver::Openstack(c) => self.openstack = Some(c),
            CredentialDriver::S3(c) => self.s3 = Some(c),
        }
    }
}

#[derive(Debug, Default)]
pub struct CloudCredentialMapper;

impl Mapper for CloudCredentialMapper {
    type Remote = CloudCredential;

    fn expand(&self, record: &Record) -> EngineResult<CloudCredential> {
        let r = Reader::new(record);
        let block = variant::resolve_record(record, &CREDENTIAL_DRIVER)?
            .ok_or_else(|| EngineError::NoVariantPopulated { group: CREDENTIAL_DRIVER.name.to_string() })?;
        let mut c = CloudCredential {
            meta: ResourceMeta {
                name: r.req_string("name")?,
                annotations: r.map("annotations")?,
                labels: r.map("labels")?,
                ..Default::default()
            },
            description: r.string("description")?,
            ..Default::default()
        };
        c.set_driver(CredentialDriver::expand(block, &r)?);
        Ok(c)
    }

    fn flatten(&self, remote: &CloudCredential, record: &mut Record) -> EngineResult<()> {
        let driver = remote.driver()?;
        let prior = record.clone();
        if !remote.meta.name.is_empty() {
            record.insert("name", remote.meta.name.as_str());
        }
        put(record, "description", remote.description.clone());
        put_map(record, "annotations", &remote.meta.annotations);
        put_map(record, "labels", &remote.meta.labels);
        for b in CREDENTIAL_DRIVER.blocks {
            put_blocks(record, b, Vec::new());
        }
        put_block(record, driver.block(), Some(driver.flatten(Some(&prior))));
        record.insert("driver", driver.tag());
        Ok(())
    }
}
