//! Cluster objects and their four provisioning engines.

use std::collections::BTreeMap;

use corral_core::{EngineError, EngineResult, Record, ResourceKind, ResourceMeta};
use corral_schema::CLUSTER_ENGINE;
use serde::{Deserialize, Serialize};

use crate::fields::{non_empty, prior_block, put, put_block, put_blocks, put_list, put_map, put_secret, Reader};
use crate::network::NetworkConfig;
use crate::{expand_block, expand_blocks, flatten_block, flatten_blocks, remote_object, variant, Block, Mapper};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalClusterAuthEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certs: Option<String>,
}

impl Block for LocalClusterAuthEndpoint {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self { enabled: r.bool("enabled")?, fqdn: r.string("fqdn")?, ca_certs: r.string("ca_certs")? })
    }

    fn flatten(&self, _prior: Option<&Record>) -> Record {
        let mut out = Record::new();
        put(&mut out, "enabled", self.enabled);
        put(&mut out, "fqdn", self.fqdn.clone());
        put(&mut out, "ca_certs", self.ca_certs.clone());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateRegistry {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Block for PrivateRegistry {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self {
            url: r.req_string("url")?,
            is_default: r.bool("is_default")?,
            user: r.string("user")?,
            password: r.string("password")?,
        })
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new().with("url", self.url.as_str());
        put(&mut out, "is_default", self.is_default);
        put(&mut out, "user", self.user.clone());
        put_secret(&mut out, "password", non_empty(&self.password), prior);
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RkeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_docker_version: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_agent_auth: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_registries: Vec<PrivateRegistry>,
}

impl Block for RkeConfig {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self {
            kubernetes_version: r.string("kubernetes_version")?,
            ignore_docker_version: r.bool("ignore_docker_version")?,
            ssh_agent_auth: r.bool("ssh_agent_auth")?,
            prefix_path: r.string("prefix_path")?,
            network: expand_block(r, "network_provider")?,
            private_registries: expand_blocks(r, "private_registries")?,
        })
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new();
        put(&mut out, "kubernetes_version", self.kubernetes_version.clone());
        put(&mut out, "ignore_docker_version", self.ignore_docker_version);
        put(&mut out, "ssh_agent_auth", self.ssh_agent_auth);
        put(&mut out, "prefix_path", self.prefix_path.clone());
        flatten_block(&mut out, "network_provider", self.network.as_ref(), prior);
        flatten_blocks(&mut out, "private_registries", &self.private_registries, prior);
        out
    }

    fn check(&self) -> EngineResult<()> { self.network.as_ref().map_or(Ok(()), Block::check) }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EksConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub kubernetes_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ami: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_nodes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_nodes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_volume_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,
}

impl Block for EksConfig {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        let cfg = Self {
            access_key: Some(r.req_string("access_key")?),
            secret_key: Some(r.req_string("secret_key")?),
            session_token: r.string("session_token")?,
            region: r.string("region")?,
            kubernetes_version: r.req_string("kubernetes_version")?,
            instance_type: r.string("instance_type")?,
            ami: r.string("ami")?,
            minimum_nodes: r.int("minimum_nodes")?,
            maximum_nodes: r.int("maximum_nodes")?,
            node_volume_size: r.int("node_volume_size")?,
            service_role: r.string("service_role")?,
            subnets: r.list("subnets")?,
            security_groups: r.list("security_groups")?,
        };
        if let (Some(min), Some(max)) = (cfg.minimum_nodes, cfg.maximum_nodes) {
            if min > max {
                return Err(EngineError::validation(format!("{}: minimum_nodes {} exceeds maximum_nodes {}", r.path("minimum_nodes"), min, max)));
            }
        }
        Ok(cfg)
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new().with("kubernetes_version", self.kubernetes_version.as_str());
        put_secret(&mut out, "access_key", non_empty(&self.access_key), prior);
        put_secret(&mut out, "secret_key", non_empty(&self.secret_key), prior);
        put_secret(&mut out, "session_token", non_empty(&self.session_token), prior);
        put(&mut out, "region", self.region.clone());
        put(&mut out, "instance_type", self.instance_type.clone());
        put(&mut out, "ami", self.ami.clone());
        put(&mut out, "minimum_nodes", self.minimum_nodes);
        put(&mut out, "maximum_nodes", self.maximum_nodes);
        put(&mut out, "node_volume_size", self.node_volume_size);
        put(&mut out, "service_role", self.service_role.clone());
        put_list(&mut out, "subnets", &self.subnets);
        put_list(&mut out, "security_groups", &self.security_groups);
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AksConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub subscription_id: String,
    pub tenant_id: String,
    pub resource_group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub kubernetes_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_pool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_vm_size: Option<String>,
    pub master_dns_prefix: String,
    pub ssh_public_key_contents: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tag: BTreeMap<String, String>,
}

impl Block for AksConfig {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self {
            client_id: Some(r.req_string("client_id")?),
            client_secret: Some(r.req_string("client_secret")?),
            subscription_id: r.req_string("subscription_id")?,
            tenant_id: r.req_string("tenant_id")?,
            resource_group: r.req_string("resource_group")?,
            location: r.string("location")?,
            kubernetes_version: r.req_string("kubernetes_version")?,
            agent_pool_name: r.string("agent_pool_name")?,
            count: r.int("count")?,
            agent_vm_size: r.string("agent_vm_size")?,
            master_dns_prefix: r.req_string("master_dns_prefix")?,
            ssh_public_key_contents: r.req_string("ssh_public_key_contents")?,
            tag: r.map("tag")?,
        })
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new()
            .with("subscription_id", self.subscription_id.as_str())
            .with("tenant_id", self.tenant_id.as_str())
            .with("resource_group", self.resource_group.as_str())
            .with("kubernetes_version", self.kubernetes_version.as_str())
            .with("master_dns_prefix", self.master_dns_prefix.as_str())
            .with("ssh_public_key_contents", self.ssh_public_key_contents.as_str());
        put_secret(&mut out, "client_id", non_empty(&self.client_id), prior);
        put_secret(&mut out, "client_secret", non_empty(&self.client_secret), prior);
        put(&mut out, "location", self.location.clone());
        put(&mut out, "agent_pool_name", self.agent_pool_name.clone());
        put(&mut out, "count", self.count);
        put(&mut out, "agent_vm_size", self.agent_vm_size.clone());
        put_map(&mut out, "tag", &self.tag);
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GkeConfig {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    pub master_version: String,
    pub node_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_kubernetes_dashboard: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Block for GkeConfig {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self {
            project_id: r.req_string("project_id")?,
            credential: Some(r.req_string("credential")?),
            zone: r.string("zone")?,
            master_version: r.req_string("master_version")?,
            node_version: r.req_string("node_version")?,
            node_count: r.int("node_count")?,
            machine_type: r.string("machine_type")?,
            disk_size_gb: r.int("disk_size_gb")?,
            enable_kubernetes_dashboard: r.bool("enable_kubernetes_dashboard")?,
            locations: r.list("locations")?,
            labels: r.map("labels")?,
        })
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new()
            .with("project_id", self.project_id.as_str())
            .with("master_version", self.master_version.as_str())
            .with("node_version", self.node_version.as_str());
        put_secret(&mut out, "credential", non_empty(&self.credential), prior);
        put(&mut out, "zone", self.zone.clone());
        put(&mut out, "node_count", self.node_count);
        put(&mut out, "machine_type", self.machine_type.clone());
        put(&mut out, "disk_size_gb", self.disk_size_gb);
        put(&mut out, "enable_kubernetes_dashboard", self.enable_kubernetes_dashboard);
        put_list(&mut out, "locations", &self.locations);
        put_map(&mut out, "labels", &self.labels);
        out
    }
}

/// Provisioning engine; at most one per cluster, none for imported clusters.
#[derive(Debug, Clone, PartialEq)]
pub enum Engine {
    Rke(RkeConfig),
    Eks(EksConfig),
    Aks(AksConfig),
    Gke(GkeConfig),
}

impl Engine {
    pub fn block(&self) -> &'static str {
        match self {
            Engine::Rke(_) => "rke_config",
            Engine::Eks(_) => "eks_config",
            Engine::Aks(_) => "aks_config",
            Engine::Gke(_) => "gke_config",
        }
    }

    /// Control-plane driver name.
    pub fn driver(&self) -> &'static str {
        match self {
            Engine::Rke(_) => "rancherKubernetesEngine",
            Engine::Eks(_) => "amazonElasticContainerService",
            Engine::Aks(_) => "azureKubernetesService",
            Engine::Gke(_) => "googleKubernetesEngine",
        }
    }

    fn expand(block: &'static str, r: &Reader<'_>) -> EngineResult<Self> {
        let inner = r.block(block)?.ok_or_else(|| EngineError::validation(format!("{} is empty", r.path(block))))?;
        Ok(match block {
            "rke_config" => Engine::Rke(RkeConfig::expand(&inner)?),
            "eks_config" => Engine::Eks(EksConfig::expand(&inner)?),
            "aks_config" => Engine::Aks(AksConfig::expand(&inner)?),
            "gke_config" => Engine::Gke(GkeConfig::expand(&inner)?),
            other => return Err(EngineError::validation(format!("unknown cluster engine block {}", other))),
        })
    }

    fn check(&self) -> EngineResult<()> {
        match self {
            Engine::Rke(c) => c.check(),
            Engine::Eks(c) => c.check(),
            Engine::Aks(c) => c.check(),
            Engine::Gke(c) => c.check(),
        }
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let prior = prior_block(prior, self.block(), 0);
        match self {
            Engine::Rke(c) => c.flatten(prior),
            Engine::Eks(c) => c.flatten(prior),
            Engine::Aks(c) => c.flatten(prior),
            Engine::Gke(c) => c.flatten(prior),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    #[serde(flatten)]
    pub meta: ResourceMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_network_policy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_pod_security_policy_template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_cluster_auth_endpoint: Option<LocalClusterAuthEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rancher_kubernetes_engine_config: Option<RkeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amazon_elastic_container_service_config: Option<EksConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_kubernetes_service_config: Option<AksConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_kubernetes_engine_config: Option<GkeConfig>,
}

remote_object!(Cluster, ResourceKind::Cluster);

impl Cluster {
    pub fn engine(&self) -> EngineResult<Option<Engine>> {
        let found = variant::resolve_remote_opt(
            &CLUSTER_ENGINE,
            [
                ("rke_config", self.rancher_kubernetes_engine_config.clone().map(Engine::Rke)),
                ("eks_config", self.amazon_elastic_container_service_config.clone().map(Engine::Eks)),
                ("aks_config", self.azure_kubernetes_service_config.clone().map(Engine::Aks)),
                ("gke_config", self.google_kubernetes_engine_config.clone().map(Engine::Gke)),
            ],
        )?;
        Ok(found.map(|(_, e)| e))
    }

    pub fn set_engine(&mut self, engine: Option<Engine>) {
        self.rancher_kubernetes_engine_config = None;
        self.amazon_elastic_container_service_config = None;
        self.azure_kubernetes_service_config = None;
        self.google_kubernetes_engine_config = None;
        match engine {
            Some(Engine::Rke(c)) => self.rancher_kubernetes_engine_config = Some(c),
            Some(Engine::Eks(c)) => self.amazon_elastic_container_service_config = Some(c),
            Some(Engine::Aks(c)) => self.azure_kubernetes_service_config = Some(c),
            Some(Engine::Gke(c)) => self.google_kubernetes_engine_config = Some(c),
            None => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct ClusterMapper;

impl Mapper for ClusterMapper {
    type Remote = Cluster;

    fn expand(&self, record: &Record) -> EngineResult<Cluster> {
        let r = Reader::new(record);
        let engine = variant::resolve_record(record, &CLUSTER_ENGINE)?.map(|b| Engine::expand(b, &r)).transpose()?;
        let mut c = Cluster {
            meta: ResourceMeta {
                name: r.req_string("name")?,
                annotations: r.map("annotations")?,
                labels: r.map("labels")?,
                ..Default::default()
            },
            description: r.string("description")?,
            driver: None,
            enable_network_policy: r.bool("enable_network_policy")?,
            default_pod_security_policy_template_id: r.string("default_pod_security_policy_template_id")?,
            local_cluster_auth_endpoint: expand_block(&r, "cluster_auth_endpoint")?,
            ..Default::default()
        };
        c.set_engine(engine);
        Ok(c)
    }

    fn flatten(&self, remote: &Cluster, record: &mut Record) -> EngineResult<()> {
        let engine = remote.engine()?;
        if let Some(e) = &engine {
            e.check()?;
        }
        let prior = record.clone();
        if !remote.meta.name.is_empty() {
            record.insert("name", remote.meta.name.as_str());
        }
        put(record, "description", remote.description.clone());
        put_map(record, "annotations", &remote.meta.annotations);
        put_map(record, "labels", &remote.meta.labels);
        put(record, "driver", remote.driver.clone());
        put(record, "enable_network_policy", remote.enable_network_policy);
        put(record, "default_pod_security_policy_template_id", remote.default_pod_security_policy_template_id.clone());
        flatten_block(record, "cluster_auth_endpoint", remote.local_cluster_auth_endpoint.as_ref(), Some(&prior));
        for b in CLUSTER_ENGINE.blocks {
            put_blocks(record, b, Vec::new());
        }
        if let Some(e) = engine {
            let nested = e.flatten(Some(&prior));
            put_block(record, e.block(), Some(nested));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::round_trip;

    fn rke_cluster() -> Record {
        Record::new()
            .with("name", "web")
            .with("description", "front tier")
            .with("labels", BTreeMap::from([("env".to_string(), "prod".to_string())]))
            .with(
                "rke_config",
                vec![Record::new()
                    .with("kubernetes_version", "v1.27.6")
                    .with(
                        "network_provider",
                        vec![Record::new()
                            .with("plugin", "canal")
                            .with("canal_network_provider", vec![Record::new().with("iface", "eth0")])],
                    )
                    .with(
                        "private_registries",
                        vec![
                            Record::new().with("url", "registry-b.example.com").with("user", "u").with("password", "p"),
                            Record::new().with("url", "registry-a.example.com").with("is_default", true),
                        ],
                    )],
            )
    }

    #[test]
    fn rke_round_trip() {
        let rec = rke_cluster();
        assert_eq!(round_trip::<ClusterMapper>(&rec), rec);
    }

    #[test]
    fn rke_wire_shape() {
        let c = ClusterMapper.expand(&rke_cluster()).unwrap();
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["name"], "web");
        assert_eq!(json["rancherKubernetesEngineConfig"]["network"]["plugin"], "canal");
        assert_eq!(json["rancherKubernetesEngineConfig"]["network"]["canalNetworkProvider"]["iface"], "eth0");
        assert_eq!(json["rancherKubernetesEngineConfig"]["privateRegistries"][0]["url"], "registry-b.example.com");
        assert!(json.get("amazonElasticContainerServiceConfig").is_none());
    }

    #[test]
    fn two_engines_are_ambiguous() {
        let rec = rke_cluster().with(
            "gke_config",
            vec![Record::new().with("project_id", "p").with("credential", "{}").with("master_version", "1").with("node_version", "1")],
        );
        match ClusterMapper.expand(&rec).unwrap_err() {
            EngineError::AmbiguousVariant { group, populated } => {
                assert_eq!(group, "cluster_engine");
                assert_eq!(populated, vec!["rke_config", "gke_config"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn remote_with_two_engines_is_rejected() {
        let mut c = ClusterMapper.expand(&rke_cluster()).unwrap();
        c.google_kubernetes_engine_config = Some(GkeConfig::default());
        let mut rec = Record::new();
        assert!(matches!(ClusterMapper.flatten(&c, &mut rec), Err(EngineError::MultipleVariantsPopulated { .. })));
    }

    #[test]
    fn remote_with_two_network_plugins_is_rejected() {
        use crate::network::IfaceNetworkProvider;
        let mut c = ClusterMapper.expand(&rke_cluster()).unwrap();
        let net = c.rancher_kubernetes_engine_config.as_mut().unwrap().network.get_or_insert_with(Default::default);
        net.canal_network_provider = Some(IfaceNetworkProvider { iface: Some("eth0".into()) });
        net.flannel_network_provider = Some(IfaceNetworkProvider { iface: Some("eth1".into()) });

        let mut rec = Record::new().with("name", "web");
        match ClusterMapper.flatten(&c, &mut rec).unwrap_err() {
            EngineError::MultipleVariantsPopulated { group, populated } => {
                assert_eq!(group, "network_plugin");
                assert_eq!(populated, vec!["canal_network_provider", "flannel_network_provider"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(rec, Record::new().with("name", "web"));
    }

    #[test]
    fn flatten_is_idempotent_and_keeps_nested_secrets() {
        let rec = Record::new().with("name", "eks").with(
            "eks_config",
            vec![Record::new()
                .with("access_key", "AKIA")
                .with("secret_key", "shh")
                .with("kubernetes_version", "1.27")
                .with("subnets", vec!["s-2".to_string(), "s-1".to_string()])],
        );
        let mut remote = ClusterMapper.expand(&rec).unwrap();
        // The control plane never echoes credentials back.
        if let Some(eks) = remote.amazon_elastic_container_service_config.as_mut() {
            eks.access_key = None;
            eks.secret_key = Some(String::new());
        }
        remote.driver = Some("amazonElasticContainerService".into());

        let mut state = rec.clone();
        ClusterMapper.flatten(&remote, &mut state).unwrap();
        let once = state.clone();
        ClusterMapper.flatten(&remote, &mut state).unwrap();
        assert_eq!(state, once);

        let eks = state.block("eks_config").unwrap();
        assert_eq!(eks.str_field("access_key"), Some("AKIA"));
        assert_eq!(eks.str_field("secret_key"), Some("shh"));
        assert_eq!(state.str_field("driver"), Some("amazonElasticContainerService"));
        assert_eq!(crate::testutil::without(state, &["driver"]), rec);
    }

    #[test]
    fn imported_cluster_has_no_engine() {
        let rec = Record::new().with("name", "imported");
        let c = ClusterMapper.expand(&rec).unwrap();
        assert!(c.engine().unwrap().is_none());
        assert_eq!(round_trip::<ClusterMapper>(&rec), rec);
    }
}
