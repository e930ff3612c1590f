//! Static field tables for every resource kind.

use crate::{FieldSpec as F, KindSchema, VariantGroup};
use corral_core::ResourceKind;

// ---- shared pieces ----

const META: [F; 2] = [F::map("annotations").optional_computed(), F::map("labels").optional_computed()];

const TOLERATION: &[F] = &[
    F::string("key").required(),
    F::string("effect").optional(),
    F::string("operator").optional(),
    F::int("seconds").optional(),
    F::string("value").optional(),
];

const TAINT: &[F] = &[
    F::string("key").required(),
    F::string("value").required(),
    F::string("effect").optional(),
    F::string("time_added").computed(),
];

// ---- cluster ----

pub const NETWORK_PLUGIN: VariantGroup = VariantGroup {
    name: "network_plugin",
    blocks: &[
        "aci_network_provider",
        "calico_network_provider",
        "canal_network_provider",
        "flannel_network_provider",
        "weave_network_provider",
    ],
    required: false,
};

const ACI: &[F] = &[
    F::string("aep").required(),
    F::list("apic_hosts").required().ordered(),
    F::string("apic_user_name").required(),
    F::string("apic_user_key").required().sensitive(),
    F::string("apic_user_cert").optional().sensitive(),
    F::string("encap_type").optional(),
    F::string("node_subnet").optional(),
    F::string("system_id").required(),
    F::string("vrf_name").optional(),
    F::string("vrf_tenant").optional(),
];

const NETWORK: &[F] = &[
    F::string("plugin").optional_computed(),
    F::int("mtu").optional(),
    F::map("options").optional_computed(),
    F::block("tolerations", None, TOLERATION, &[]).optional().ordered(),
    F::block("aci_network_provider", Some(1), ACI, &[]).optional(),
    F::block("calico_network_provider", Some(1), &[F::string("cloud_provider").optional()], &[]).optional(),
    F::block("canal_network_provider", Some(1), &[F::string("iface").optional()], &[]).optional(),
    F::block("flannel_network_provider", Some(1), &[F::string("iface").optional()], &[]).optional(),
    F::block("weave_network_provider", Some(1), &[F::string("password").required().sensitive()], &[]).optional(),
];

const PRIVATE_REGISTRY: &[F] = &[
    F::string("url").required(),
    F::bool("is_default").optional(),
    F::string("user").optional(),
    F::string("password").optional().sensitive(),
];

const RKE: &[F] = &[
    F::string("kubernetes_version").optional_computed(),
    F::bool("ignore_docker_version").optional(),
    F::bool("ssh_agent_auth").optional(),
    F::string("prefix_path").optional(),
    F::block("network_provider", Some(1), NETWORK, &[NETWORK_PLUGIN]).optional_computed(),
    F::block("private_registries", None, PRIVATE_REGISTRY, &[]).optional().ordered(),
];

const EKS: &[F] = &[
    F::string("access_key").required().sensitive(),
    F::string("secret_key").required().sensitive(),
    F::string("session_token").optional().sensitive(),
    F::string("region").optional_computed(),
    F::string("kubernetes_version").required(),
    F::string("instance_type").optional_computed(),
    F::string("ami").optional(),
    F::int("minimum_nodes").optional_computed(),
    F::int("maximum_nodes").optional_computed(),
    F::int("node_volume_size").optional_computed(),
    F::string("service_role").optional(),
    F::list("subnets").optional().ordered(),
    F::list("security_groups").optional().ordered(),
];

const AKS: &[F] = &[
    F::string("client_id").required().sensitive(),
    F::string("client_secret").required().sensitive(),
    F::string("subscription_id").required(),
    F::string("tenant_id").required(),
    F::string("resource_group").required(),
    F::string("location").optional_computed(),
    F::string("kubernetes_version").required(),
    F::string("agent_pool_name").optional_computed(),
    F::int("count").optional_computed(),
    F::string("agent_vm_size").optional_computed(),
    F::string("master_dns_prefix").required(),
    F::string("ssh_public_key_contents").required(),
    F::map("tag").optional(),
];

const GKE: &[F] = &[
    F::string("project_id").required(),
    F::string("credential").required().sensitive(),
    F::string("zone").optional_computed(),
    F::string("master_version").required(),
    F::string("node_version").required(),
    F::int("node_count").optional_computed(),
    F::string("machine_type").optional_computed(),
    F::int("disk_size_gb").optional_computed(),
    F::bool("enable_kubernetes_dashboard").optional(),
    F::list("locations").optional().ordered(),
    F::map("labels").optional(),
];

const AUTH_ENDPOINT: &[F] = &[
    F::bool("enabled").optional(),
    F::string("fqdn").optional(),
    F::string("ca_certs").optional(),
];

pub const CLUSTER_ENGINE: VariantGroup = VariantGroup {
    name: "cluster_engine",
    blocks: &["rke_config", "eks_config", "aks_config", "gke_config"],
    required: false,
};

pub static CLUSTER: KindSchema = KindSchema {
    kind: ResourceKind::Cluster,
    fields: &[
        F::string("name").required(),
        F::string("description").optional(),
        META[0],
        META[1],
        F::bool("enable_network_policy").optional_computed(),
        F::string("default_pod_security_policy_template_id").optional_computed(),
        F::block("cluster_auth_endpoint", Some(1), AUTH_ENDPOINT, &[]).optional_computed(),
        F::block("rke_config", Some(1), RKE, &[]).optional(),
        F::block("eks_config", Some(1), EKS, &[]).optional(),
        F::block("aks_config", Some(1), AKS, &[]).optional(),
        F::block("gke_config", Some(1), GKE, &[]).optional(),
        F::string("driver").computed(),
        F::string("default_project_id").computed(),
        F::string("system_project_id").computed(),
        F::string("kube_config").computed().sensitive(),
    ],
    groups: &[CLUSTER_ENGINE],
};

// ---- project ----

const QUOTA_LIMIT: &[F] = &[
    F::string("config_maps").optional(),
    F::string("limits_cpu").optional(),
    F::string("limits_memory").optional(),
    F::string("persistent_volume_claims").optional(),
    F::string("pods").optional(),
    F::string("requests_cpu").optional(),
    F::string("requests_memory").optional(),
    F::string("requests_storage").optional(),
    F::string("secrets").optional(),
    F::string("services").optional(),
];

const RESOURCE_QUOTA: &[F] = &[
    F::block("project_limit", Some(1), QUOTA_LIMIT, &[]).required(),
    F::block("namespace_default_limit", Some(1), QUOTA_LIMIT, &[]).required(),
];

const CONTAINER_LIMIT: &[F] = &[
    F::string("limits_cpu").optional(),
    F::string("limits_memory").optional(),
    F::string("requests_cpu").optional(),
    F::string("requests_memory").optional(),
];

const MONITORING_INPUT: &[F] = &[F::map("answers").optional(), F::string("version").optional()];

pub static PROJECT: KindSchema = KindSchema {
    kind: ResourceKind::Project,
    fields: &[
        F::string("name").required(),
        F::string("cluster_id").required(),
        F::string("description").optional(),
        META[0],
        META[1],
        F::bool("wait_for_cluster").optional(),
        F::bool("enable_project_monitoring").optional(),
        F::block("project_monitoring_input", Some(1), MONITORING_INPUT, &[]).optional(),
        F::string("pod_security_policy_template_id").optional(),
        F::block("resource_quota", Some(1), RESOURCE_QUOTA, &[]).optional(),
        F::block("container_resource_limit", Some(1), CONTAINER_LIMIT, &[]).optional(),
    ],
    groups: &[],
};

// ---- node pool ----

pub static NODE_POOL: KindSchema = KindSchema {
    kind: ResourceKind::NodePool,
    fields: &[
        F::string("name").required(),
        F::string("cluster_id").required(),
        F::string("hostname_prefix").required(),
        F::string("node_template_id").required(),
        F::int("quantity").optional_computed(),
        F::bool("control_plane").optional(),
        F::bool("etcd").optional(),
        F::bool("worker").optional(),
        F::int("delete_not_ready_after_secs").optional(),
        F::block("node_taints", None, TAINT, &[]).optional().ordered(),
        META[0],
        META[1],
    ],
    groups: &[],
};

// ---- cloud credential ----

pub const CREDENTIAL_DRIVER: VariantGroup = VariantGroup {
    name: "credential_driver",
    blocks: &[
        "amazonec2_credential_config",
        "azure_credential_config",
        "openstack_credential_config",
        "s3_credential_config",
    ],
    required: true,
};

const AMAZONEC2: &[F] = &[
    F::string("access_key").required(),
    F::string("secret_key").required().sensitive(),
    F::string("default_region").optional(),
];

const AZURE: &[F] = &[
    F::string("client_id").required(),
    F::string("client_secret").required().sensitive(),
    F::string("subscription_id").required(),
    F::string("environment").optional_computed(),
    F::string("tenant_id").optional_computed(),
];

const OPENSTACK: &[F] = &[F::string("password").required().sensitive()];

const S3: &[F] = &[
    F::string("access_key").required(),
    F::string("secret_key").required().sensitive(),
    F::string("default_bucket").optional(),
    F::string("default_endpoint").optional(),
    F::string("default_endpoint_ca").optional(),
    F::string("default_folder").optional(),
    F::string("default_region").optional(),
    F::bool("default_skip_ssl_verify").optional(),
];

pub static CLOUD_CREDENTIAL: KindSchema = KindSchema {
    kind: ResourceKind::CloudCredential,
    fields: &[
        F::string("name").required(),
        F::string("description").optional(),
        META[0],
        META[1],
        F::block("amazonec2_credential_config", Some(1), AMAZONEC2, &[]).optional(),
        F::block("azure_credential_config", Some(1), AZURE, &[]).optional(),
        F::block("openstack_credential_config", Some(1), OPENSTACK, &[]).optional(),
        F::block("s3_credential_config", Some(1), S3, &[]).optional(),
        F::string("driver").computed(),
    ],
    groups: &[CREDENTIAL_DRIVER],
};

// ---- cluster alert rule ----

pub const ALERT_RULE: VariantGroup = VariantGroup {
    name: "alert_rule",
    blocks: &["event_rule", "metric_rule", "node_rule", "system_service_rule"],
    required: true,
};

const EVENT_RULE: &[F] = &[F::string("resource_kind").required(), F::string("event_type").optional_computed()];

const METRIC_RULE: &[F] = &[
    F::string("duration").required(),
    F::string("expression").required(),
    F::float("threshold_value").required(),
    F::string("comparison").optional_computed(),
    F::string("description").optional(),
];

const NODE_RULE: &[F] = &[
    F::int("cpu_threshold").optional_computed(),
    F::string("condition").optional_computed(),
    F::int("mem_threshold").optional_computed(),
    F::string("node_id").optional(),
    F::map("selector").optional(),
];

pub static CLUSTER_ALERT_RULE: KindSchema = KindSchema {
    kind: ResourceKind::ClusterAlertRule,
    fields: &[
        F::string("name").required(),
        F::string("cluster_id").required(),
        F::string("group_id").required(),
        F::int("group_interval_seconds").optional_computed(),
        F::int("group_wait_seconds").optional_computed(),
        F::bool("inherited").optional_computed(),
        F::int("repeat_interval_seconds").optional_computed(),
        F::string("severity").optional_computed(),
        META[0],
        META[1],
        F::block("event_rule", Some(1), EVENT_RULE, &[]).optional(),
        F::block("metric_rule", Some(1), METRIC_RULE, &[]).optional(),
        F::block("node_rule", Some(1), NODE_RULE, &[]).optional(),
        F::block("system_service_rule", Some(1), &[F::string("condition").optional_computed()], &[]).optional(),
    ],
    groups: &[ALERT_RULE],
};

// ---- auth config ----

pub const AUTH_PROVIDER: VariantGroup = VariantGroup {
    name: "auth_provider",
    blocks: &["okta", "keycloak", "openldap"],
    required: true,
};

const SAML: &[F] = &[
    F::string("display_name_field").required(),
    F::string("groups_field").required(),
    F::string("uid_field").required(),
    F::string("user_name_field").required(),
    F::string("idp_metadata_content").required().sensitive(),
    F::string("rancher_api_host").required(),
    F::string("sp_cert").required(),
    F::string("sp_key").required().sensitive(),
];

const KEYCLOAK: &[F] = &[
    F::string("display_name_field").required(),
    F::string("groups_field").required(),
    F::string("uid_field").required(),
    F::string("user_name_field").required(),
    F::string("idp_metadata_content").required().sensitive(),
    F::string("rancher_api_host").required(),
    F::string("sp_cert").required(),
    F::string("sp_key").required().sensitive(),
    F::string("entity_id").optional_computed(),
];

const OPENLDAP: &[F] = &[
    F::list("servers").required().ordered(),
    F::int("port").optional_computed(),
    F::string("service_account_distinguished_name").required(),
    F::string("service_account_password").required().sensitive(),
    F::string("user_search_base").required(),
    F::string("group_search_base").optional_computed(),
    F::bool("tls").optional_computed(),
    F::string("certificate").optional_computed(),
    F::int("connection_timeout").optional_computed(),
];

pub static AUTH_CONFIG: KindSchema = KindSchema {
    kind: ResourceKind::AuthConfig,
    fields: &[
        F::string("access_mode").optional_computed(),
        F::set("allowed_principal_ids").optional_computed(),
        F::bool("enabled").optional_computed(),
        META[0],
        META[1],
        F::block("okta", Some(1), SAML, &[]).optional(),
        F::block("keycloak", Some(1), KEYCLOAK, &[]).optional(),
        F::block("openldap", Some(1), OPENLDAP, &[]).optional(),
        F::string("name").computed(),
        F::string("type").computed(),
    ],
    groups: &[AUTH_PROVIDER],
};
