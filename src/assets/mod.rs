/// Manifest template library
///
/// The YAML templates under `assets/` are baked into the binary at compile
/// time. Templates use Handlebars syntax; see `render::funcs` for the helpers
/// available inside them.
use crate::render::ManifestError;

/// Read-only, path-addressed store of template bodies
pub trait AssetSource: Send + Sync {
    /// Template body for an exact path such as `etcd/etcd-cluster.yaml`
    fn get(&self, path: &str) -> Result<&str, ManifestError>;

    /// File names directly under `dir`, sorted
    fn list_dir(&self, dir: &str) -> Result<Vec<String>, ManifestError>;
}

/// Files directly under `dir` among `paths`
fn children<'a>(paths: impl Iterator<Item = &'a str>, dir: &str) -> Vec<String> {
    let prefix = format!("{}/", dir.trim_end_matches('/'));
    let mut names: Vec<String> = paths
        .filter_map(|p| p.strip_prefix(&prefix))
        .filter(|rest| !rest.is_empty() && !rest.contains('/'))
        .map(str::to_string)
        .collect();
    names.sort();
    names
}

macro_rules! embed {
    ($($path:literal),* $(,)?) => {
        &[$(($path, include_str!(concat!("../../assets/", $path)))),*]
    };
}

const EMBEDDED: &[(&str, &str)] = embed![
    "etcd/etcd-cluster-crd.yaml",
    "etcd/etcd-cluster.yaml",
    "etcd/etcd-operator-cluster-role-binding.yaml",
    "etcd/etcd-operator-cluster-role.yaml",
    "etcd/etcd-operator.yaml",
    "kube-apiserver/kube-apiserver-deployment.yaml",
    "kube-apiserver/kube-apiserver-deployment-patch.yaml",
    "kube-apiserver/kube-apiserver-vpnclient-config.yaml",
    "kube-apiserver/kube-apiserver-vpnclient-container.yaml",
    "cluster-bootstrap/0000_00_cluster-version-operator_00_namespace.yaml",
    "cluster-bootstrap/cluster-dns-02-config.yaml",
    "cluster-bootstrap/cluster-infrastructure-02-config.yaml",
    "cluster-bootstrap/cluster-network-02-config.yaml",
    "cluster-bootstrap/cluster-version.yaml",
    "cluster-bootstrap/root-ca-configmap.yaml",
    "oauth-openshift/ingress-certs-secret.yaml",
    "openvpn/openvpn-serviceaccount.yaml",
    "openvpn/openvpn-server-deployment.yaml",
    "openvpn/openvpn-ccd-configmap.yaml",
    "openvpn/openvpn-server-configmap.yaml",
    "openvpn/openvpn-client-deployment.yaml",
    "openvpn/openvpn-client-configmap.yaml",
    "registry/cluster-imageregistry-config.yaml",
    "user-manifests-bootstrapper/user-manifests-bootstrapper-pod.yaml",
    "user-manifests-bootstrapper/user-manifest-template.yaml",
    "router-proxy/router-proxy-deployment.yaml",
    "router-proxy/router-proxy-configmap.yaml",
    "router-proxy/router-proxy-vpnclient-configmap.yaml",
    "router-proxy/router-proxy-http-service.yaml",
    "router-proxy/router-proxy-https-service.yaml",
    "hypershift-operator/hypershift-operator-deployment.yaml",
];

/// The template library compiled into the binary
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedAssets;

impl EmbeddedAssets {
    /// Every embedded asset path, in library order
    pub fn paths(&self) -> impl Iterator<Item = &'static str> {
        EMBEDDED.iter().map(|(path, _)| *path)
    }
}

impl AssetSource for EmbeddedAssets {
    fn get(&self, path: &str) -> Result<&str, ManifestError> {
        EMBEDDED
            .iter()
            .find(|(p, _)| *p == path)
            .map(|(_, body)| *body)
            .ok_or_else(|| ManifestError::AssetNotFound {
                path: path.to_string(),
            })
    }

    fn list_dir(&self, dir: &str) -> Result<Vec<String>, ManifestError> {
        let names = children(self.paths(), dir);
        if names.is_empty() {
            return Err(ManifestError::AssetNotFound {
                path: dir.to_string(),
            });
        }
        Ok(names)
    }
}

/// In-memory asset library for tests
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    assets: std::collections::BTreeMap<String, String>,
}

#[cfg(test)]
impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an asset
    pub fn with(mut self, path: &str, body: &str) -> Self {
        self.assets.insert(path.to_string(), body.to_string());
        self
    }
}

#[cfg(test)]
impl AssetSource for MemoryAssets {
    fn get(&self, path: &str) -> Result<&str, ManifestError> {
        self.assets
            .get(path)
            .map(String::as_str)
            .ok_or_else(|| ManifestError::AssetNotFound {
                path: path.to_string(),
            })
    }

    fn list_dir(&self, dir: &str) -> Result<Vec<String>, ManifestError> {
        let names = children(self.assets.keys().map(String::as_str), dir);
        if names.is_empty() {
            return Err(ManifestError::AssetNotFound {
                path: dir.to_string(),
            });
        }
        Ok(names)
    }
}
