/// Configuration management for hosted control plane rendering
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::utils::Cidr;

/// Cluster parameters passed as the root scope of every cluster template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Namespace hosting the control plane on the management cluster
    pub namespace: String,

    /// Base DNS domain of the hosted cluster
    pub base_domain: String,

    /// Release payload image the control plane is built from
    pub release_image: String,

    /// Override for the registry prefix of origin releases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_release_prefix: Option<String>,

    /// Public DNS name of the API server
    pub external_api_dns_name: String,

    /// Public address of the API server
    pub external_api_address: String,

    /// Public port of the API server
    #[serde(default = "default_api_port")]
    pub external_api_port: u16,

    /// IP address the API server advertises
    pub external_api_ip_address: String,

    /// Public address of the OpenVPN server
    pub external_openvpn_address: String,

    /// Public port of the OpenVPN server
    #[serde(default = "default_openvpn_port")]
    pub external_openvpn_port: u16,

    /// Public DNS name of the OAuth server
    pub external_oauth_dns_name: String,

    /// Public port of the OAuth server
    #[serde(default = "default_oauth_port")]
    pub external_oauth_port: u16,

    /// Port the API server listens on inside its pod
    #[serde(default = "default_api_port")]
    pub api_server_secure_port: u16,

    /// Service network (e.g., "172.30.0.0/16")
    pub service_cidr: String,

    /// Pod network (e.g., "10.128.0.0/14")
    pub pod_cidr: String,

    /// Machine network of the guest nodes (e.g., "10.0.0.0/16")
    pub machine_cidr: String,

    /// Wildcard ingress domain (e.g., "apps.example.com")
    pub ingress_subdomain: String,

    /// Cluster IP of the openshift-apiserver service
    pub openshift_api_cluster_ip: String,

    /// Cluster IP of the oauth-openshift service
    pub oauth_api_cluster_ip: String,

    /// Node port for plain HTTP ingress traffic
    pub router_node_port_http: u16,

    /// Node port for HTTPS ingress traffic
    pub router_node_port_https: u16,

    /// Service type used for the router proxy
    #[serde(default = "default_router_service_type")]
    pub router_service_type: String,

    /// Member count of the etcd cluster
    #[serde(default = "default_etcd_cluster_size")]
    pub etcd_cluster_size: u32,

    /// Image references that take precedence over the release payload
    #[serde(default)]
    pub image_overrides: BTreeMap<String, String>,
}

fn default_api_port() -> u16 {
    6443
}

fn default_openvpn_port() -> u16 {
    1194
}

fn default_oauth_port() -> u16 {
    443
}

fn default_router_service_type() -> String {
    "NodePort".to_string()
}

fn default_etcd_cluster_size() -> u32 {
    3
}

impl ClusterParams {
    /// Load parameters from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let params: ClusterParams = serde_yaml::from_str(&content)?;
        params.validate()?;
        Ok(params)
    }

    /// Validate the parameters
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.namespace.is_empty() {
            anyhow::bail!("namespace cannot be empty");
        }

        if self.release_image.is_empty() {
            anyhow::bail!("release_image cannot be empty");
        }

        for (field, cidr) in [
            ("service_cidr", &self.service_cidr),
            ("pod_cidr", &self.pod_cidr),
            ("machine_cidr", &self.machine_cidr),
        ] {
            cidr.parse::<Cidr>()
                .map_err(|e| anyhow::anyhow!("{}: {}", field, e))?;
        }

        for (field, port) in [
            ("external_api_port", self.external_api_port),
            ("external_openvpn_port", self.external_openvpn_port),
            ("external_oauth_port", self.external_oauth_port),
            ("api_server_secure_port", self.api_server_secure_port),
            ("router_node_port_http", self.router_node_port_http),
            ("router_node_port_https", self.router_node_port_https),
        ] {
            if port == 0 {
                anyhow::bail!("{} cannot be 0", field);
            }
        }

        if self.etcd_cluster_size == 0 {
            anyhow::bail!("etcd_cluster_size must be at least 1");
        }

        Ok(())
    }

    /// Generate an example parameter file
    pub fn example() -> Self {
        Self {
            namespace: "guest-cluster".to_string(),
            base_domain: "example.com".to_string(),
            release_image: "quay.io/openshift-release-dev/ocp-release:4.5.0-x86_64".to_string(),
            origin_release_prefix: None,
            external_api_dns_name: "api.guest-cluster.example.com".to_string(),
            external_api_address: "203.0.113.10".to_string(),
            external_api_port: 6443,
            external_api_ip_address: "203.0.113.10".to_string(),
            external_openvpn_address: "203.0.113.11".to_string(),
            external_openvpn_port: 1194,
            external_oauth_dns_name: "oauth.guest-cluster.example.com".to_string(),
            external_oauth_port: 443,
            api_server_secure_port: 6443,
            service_cidr: "172.30.0.0/16".to_string(),
            pod_cidr: "10.128.0.0/14".to_string(),
            machine_cidr: "10.0.0.0/16".to_string(),
            ingress_subdomain: "apps.guest-cluster.example.com".to_string(),
            openshift_api_cluster_ip: "172.30.0.20".to_string(),
            oauth_api_cluster_ip: "172.30.0.21".to_string(),
            router_node_port_http: 30080,
            router_node_port_https: 30443,
            router_service_type: "NodePort".to_string(),
            etcd_cluster_size: 3,
            image_overrides: BTreeMap::from([
                (
                    "openvpn".to_string(),
                    "quay.io/hypershift/openvpn:latest".to_string(),
                ),
                (
                    "etcd-operator".to_string(),
                    "quay.io/coreos/etcd-operator:v0.9.4".to_string(),
                ),
                (
                    "hypershift-operator".to_string(),
                    "quay.io/hypershift/hypershift-operator:latest".to_string(),
                ),
            ]),
        }
    }
}
