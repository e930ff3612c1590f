//! RKE network configuration and its five plugin variants.

use std::collections::BTreeMap;

use corral_core::{EngineError, EngineResult, Record};
use corral_schema::NETWORK_PLUGIN;
use serde::{Deserialize, Serialize};

use crate::fields::{non_empty, put, put_list, put_map, put_secret, Reader};
use crate::{expand_blocks, flatten_blocks, variant, Block};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Block for Toleration {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self {
            key: r.req_string("key")?,
            effect: r.string("effect")?,
            operator: r.string("operator")?,
            toleration_seconds: r.int("seconds")?,
            value: r.string("value")?,
        })
    }

    fn flatten(&self, _prior: Option<&Record>) -> Record {
        let mut out = Record::new().with("key", self.key.as_str());
        put(&mut out, "effect", self.effect.clone());
        put(&mut out, "operator", self.operator.clone());
        put(&mut out, "seconds", self.toleration_seconds);
        put(&mut out, "value", self.value.clone());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AciNetworkProvider {
    pub aep: String,
    #[serde(default)]
    pub apic_hosts: Vec<String>,
    pub apic_user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apic_user_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apic_user_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encap_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_subnet: Option<String>,
    pub system_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf_tenant: Option<String>,
}

impl Block for AciNetworkProvider {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        Ok(Self {
            aep: r.req_string("aep")?,
            apic_hosts: r.list("apic_hosts")?,
            apic_user_name: r.req_string("apic_user_name")?,
            apic_user_key: Some(r.req_string("apic_user_key")?),
            apic_user_cert: r.string("apic_user_cert")?,
            encap_type: r.string("encap_type")?,
            node_subnet: r.string("node_subnet")?,
            system_id: r.req_string("system_id")?,
            vrf_name: r.string("vrf_name")?,
            vrf_tenant: r.string("vrf_tenant")?,
        })
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new()
            .with("aep", self.aep.as_str())
            .with("apic_user_name", self.apic_user_name.as_str())
            .with("system_id", self.system_id.as_str());
        put_list(&mut out, "apic_hosts", &self.apic_hosts);
        put_secret(&mut out, "apic_user_key", non_empty(&self.apic_user_key), prior);
        put_secret(&mut out, "apic_user_cert", non_empty(&self.apic_user_cert), prior);
        put(&mut out, "encap_type", self.encap_type.clone());
        put(&mut out, "node_subnet", self.node_subnet.clone());
        put(&mut out, "vrf_name", self.vrf_name.clone());
        put(&mut out, "vrf_tenant", self.vrf_tenant.clone());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalicoNetworkProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider: Option<String>,
}

impl Block for CalicoNetworkProvider {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> { Ok(Self { cloud_provider: r.string("cloud_provider")? }) }

    fn flatten(&self, _prior: Option<&Record>) -> Record {
        let mut out = Record::new();
        put(&mut out, "cloud_provider", self.cloud_provider.clone());
        out
    }
}

/// Canal and flannel share the same single `iface` knob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IfaceNetworkProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iface: Option<String>,
}

impl Block for IfaceNetworkProvider {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> { Ok(Self { iface: r.string("iface")? }) }

    fn flatten(&self, _prior: Option<&Record>) -> Record {
        let mut out = Record::new();
        put(&mut out, "iface", self.iface.clone());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeaveNetworkProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Block for WeaveNetworkProvider {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> { Ok(Self { password: Some(r.req_string("password")?) }) }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new();
        put_secret(&mut out, "password", non_empty(&self.password), prior);
        out
    }
}

/// The network plugin in use, one payload per tag.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkPlugin {
    Aci(AciNetworkProvider),
    Calico(CalicoNetworkProvider),
    Canal(IfaceNetworkProvider),
    Flannel(IfaceNetworkProvider),
    Weave(WeaveNetworkProvider),
}

impl NetworkPlugin {
    /// Value of `NetworkConfig.plugin` for this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            NetworkPlugin::Aci(_) => "aci",
            NetworkPlugin::Calico(_) => "calico",
            NetworkPlugin::Canal(_) => "canal",
            NetworkPlugin::Flannel(_) => "flannel",
            NetworkPlugin::Weave(_) => "weave",
        }
    }

    /// Record block carrying this variant.
    pub fn block(&self) -> &'static str {
        match self {
            NetworkPlugin::Aci(_) => "aci_network_provider",
            NetworkPlugin::Calico(_) => "calico_network_provider",
            NetworkPlugin::Canal(_) => "canal_network_provider",
            NetworkPlugin::Flannel(_) => "flannel_network_provider",
            NetworkPlugin::Weave(_) => "weave_network_provider",
        }
    }

    fn expand(block: &'static str, r: &Reader<'_>) -> EngineResult<Self> {
        let inner = r.block(block)?.ok_or_else(|| EngineError::validation(format!("{} is empty", r.path(block))))?;
        Ok(match block {
            "aci_network_provider" => NetworkPlugin::Aci(AciNetworkProvider::expand(&inner)?),
            "calico_network_provider" => NetworkPlugin::Calico(CalicoNetworkProvider::expand(&inner)?),
            "canal_network_provider" => NetworkPlugin::Canal(IfaceNetworkProvider::expand(&inner)?),
            "flannel_network_provider" => NetworkPlugin::Flannel(IfaceNetworkProvider::expand(&inner)?),
            "weave_network_provider" => NetworkPlugin::Weave(WeaveNetworkProvider::expand(&inner)?),
            other => return Err(EngineError::validation(format!("unknown network plugin block {}", other))),
        })
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        match self {
            NetworkPlugin::Aci(p) => p.flatten(prior),
            NetworkPlugin::Calico(p) => p.flatten(prior),
            NetworkPlugin::Canal(p) | NetworkPlugin::Flannel(p) => p.flatten(prior),
            NetworkPlugin::Weave(p) => p.flatten(prior),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aci_network_provider: Option<AciNetworkProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calico_network_provider: Option<CalicoNetworkProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canal_network_provider: Option<IfaceNetworkProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flannel_network_provider: Option<IfaceNetworkProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weave_network_provider: Option<WeaveNetworkProvider>,
}

impl NetworkConfig {
    fn candidates(&self) -> [(&'static str, Option<NetworkPlugin>); 5] {
        [
            ("aci_network_provider", self.aci_network_provider.clone().map(NetworkPlugin::Aci)),
            ("calico_network_provider", self.calico_network_provider.clone().map(NetworkPlugin::Calico)),
            ("canal_network_provider", self.canal_network_provider.clone().map(NetworkPlugin::Canal)),
            ("flannel_network_provider", self.flannel_network_provider.clone().map(NetworkPlugin::Flannel)),
            ("weave_network_provider", self.weave_network_provider.clone().map(NetworkPlugin::Weave)),
        ]
    }

    /// The populated plugin block, if any.
    pub fn variant(&self) -> EngineResult<Option<NetworkPlugin>> {
        let found = variant::resolve_remote_opt(&NETWORK_PLUGIN, self.candidates())?;
        Ok(found.map(|(_, v)| v))
    }

    pub fn set_variant(&mut self, plugin: Option<NetworkPlugin>) {
        self.aci_network_provider = None;
        self.calico_network_provider = None;
        self.canal_network_provider = None;
        self.flannel_network_provider = None;
        self.weave_network_provider = None;
        match plugin {
            Some(NetworkPlugin::Aci(p)) => self.aci_network_provider = Some(p),
            Some(NetworkPlugin::Calico(p)) => self.calico_network_provider = Some(p),
            Some(NetworkPlugin::Canal(p)) => self.canal_network_provider = Some(p),
            Some(NetworkPlugin::Flannel(p)) => self.flannel_network_provider = Some(p),
            Some(NetworkPlugin::Weave(p)) => self.weave_network_provider = Some(p),
            None => {}
        }
    }
}

impl Block for NetworkConfig {
    fn expand(r: &Reader<'_>) -> EngineResult<Self> {
        let block = variant::resolve_record(r.record(), &NETWORK_PLUGIN)?;
        let plugin = block.map(|b| NetworkPlugin::expand(b, r)).transpose()?;
        let mut declared = r.string("plugin")?;
        match (&declared, &plugin) {
            (Some(d), Some(p)) if d != p.tag() => {
                return Err(EngineError::validation(format!(
                    "{}: plugin {:?} does not match populated block {}",
                    r.path("plugin"),
                    d,
                    p.block()
                )));
            }
            (None, Some(p)) => declared = Some(p.tag().to_string()),
            _ => {}
        }
        let mut cfg = NetworkConfig {
            plugin: declared,
            mtu: r.int("mtu")?,
            options: r.map("options")?,
            tolerations: expand_blocks(r, "tolerations")?,
            ..Default::default()
        };
        if let Some(mtu) = cfg.mtu {
            if !(0..=9000).contains(&mtu) {
                return Err(EngineError::validation(format!("{}: {} is outside 0..=9000", r.path("mtu"), mtu)));
            }
        }
        cfg.set_variant(plugin);
        Ok(cfg)
    }

    fn flatten(&self, prior: Option<&Record>) -> Record {
        let mut out = Record::new();
        put(&mut out, "plugin", self.plugin.clone());
        put(&mut out, "mtu", self.mtu);
        put_map(&mut out, "options", &self.options);
        flatten_blocks(&mut out, "tolerations", &self.tolerations, prior);
        for b in NETWORK_PLUGIN.blocks {
            crate::fields::put_blocks(&mut out, b, Vec::new());
        }
        for p in self.candidates().into_iter().filter_map(|(_, p)| p) {
            let nested = p.flatten(crate::fields::prior_block(prior, p.block(), 0));
            crate::fields::put_block(&mut out, p.block(), Some(nested));
        }
        out
    }

    fn check(&self) -> EngineResult<()> { self.variant().map(|_| ()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::Value;

    fn scenario_a() -> Record {
        Record::new().with("name", "web").with(
            "network_provider",
            vec![Record::new()
                .with("plugin", "canal")
                .with("canal_network_provider", vec![Record::new().with("iface", "eth0")])],
        )
    }

    #[test]
    fn canal_round_trip_reproduces_nested_list() {
        let rec = scenario_a();
        let r = Reader::new(&rec);
        let net: NetworkConfig = crate::expand_block(&r, "network_provider").unwrap().unwrap();
        assert_eq!(net.plugin.as_deref(), Some("canal"));
        assert_eq!(net.canal_network_provider.as_ref().and_then(|c| c.iface.as_deref()), Some("eth0"));
        assert!(net.flannel_network_provider.is_none());

        let mut back = Record::new().with("name", "web");
        crate::flatten_block(&mut back, "network_provider", Some(&net), None);
        assert_eq!(back, rec);
        // Non-selected plugin blocks flatten to empty lists.
        let nested = back.block("network_provider").unwrap();
        assert_eq!(nested.get("weave_network_provider"), Some(&Value::List(vec![])));
    }

    #[test]
    fn wire_shape_uses_camel_case_keys() {
        let rec = scenario_a();
        let net: NetworkConfig = crate::expand_block(&Reader::new(&rec), "network_provider").unwrap().unwrap();
        let json = serde_json::to_value(&net).unwrap();
        assert_eq!(json, serde_json::json!({"plugin": "canal", "canalNetworkProvider": {"iface": "eth0"}}));
    }

    #[test]
    fn plugin_is_inferred_from_block_and_checked_against_it() {
        let rec = Record::new().with("flannel_network_provider", vec![Record::new().with("iface", "ens3")]);
        let net = NetworkConfig::expand(&Reader::new(&rec)).unwrap();
        assert_eq!(net.plugin.as_deref(), Some("flannel"));

        let bad = Record::new().with("plugin", "calico").with("flannel_network_provider", vec![Record::new()]);
        assert!(matches!(NetworkConfig::expand(&Reader::new(&bad)), Err(EngineError::Validation(_))));
    }

    #[test]
    fn two_plugins_are_ambiguous() {
        let rec = Record::new()
            .with("canal_network_provider", vec![Record::new()])
            .with("weave_network_provider", vec![Record::new().with("password", "p")]);
        match NetworkConfig::expand(&Reader::new(&rec)).unwrap_err() {
            EngineError::AmbiguousVariant { populated, .. } => {
                assert_eq!(populated, vec!["canal_network_provider", "weave_network_provider"])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn weave_requires_password_and_preserves_it() {
        let missing = Record::new().with("weave_network_provider", vec![Record::new()]);
        assert!(matches!(NetworkConfig::expand(&Reader::new(&missing)), Err(EngineError::Validation(_))));

        let prior = Record::new()
            .with("plugin", "weave")
            .with("weave_network_provider", vec![Record::new().with("password", "s3cret")]);
        let remote = NetworkConfig {
            plugin: Some("weave".into()),
            weave_network_provider: Some(WeaveNetworkProvider { password: None }),
            ..Default::default()
        };
        let out = remote.flatten(Some(&prior));
        assert_eq!(out.block("weave_network_provider").and_then(|w| w.str_field("password")), Some("s3cret"));
    }

    #[test]
    fn mtu_bounds_and_ordered_tolerations() {
        let rec = Record::new().with("mtu", 9001i64);
        assert!(NetworkConfig::expand(&Reader::new(&rec)).is_err());

        let rec = Record::new().with(
            "tolerations",
            vec![Record::new().with("key", "b").with("seconds", 30i64), Record::new().with("key", "a")],
        );
        let net = NetworkConfig::expand(&Reader::new(&rec)).unwrap();
        assert_eq!(net.tolerations.iter().map(|t| t.key.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);
        let out = net.flatten(None);
        assert_eq!(out.blocks("tolerations").map(|t| t.str_field("key").unwrap()).collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
