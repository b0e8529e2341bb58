/// Hosted control plane manifest composition
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use super::context::RenderContext;
use super::error::ManifestError;
use super::funcs::TemplateFuncs;
use super::manifest::{ManifestSet, RenderedManifests};
use crate::assets::AssetSource;
use crate::config::ClusterParams;
use crate::release::ReleaseResolver;

const USER_MANIFEST_TEMPLATE: &str = "user-manifests-bootstrapper/user-manifest-template.yaml";
const USER_MANIFEST_PREFIX: &str = "user-manifest-";

const PULL_SECRET_TEMPLATE: &str = "apiVersion: v1
kind: Secret
metadata:
  name: {{name}}
  namespace: openshift-config
type: kubernetes.io/dockerconfigjson
data:
  .dockerconfigjson: {{base64String data}}
";

/// Optional manifest groups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub etcd: bool,
    pub vpn: bool,
    pub external_oauth: bool,
    pub include_registry: bool,
}

/// Template scope used when wrapping a user manifest
#[derive(Debug, Serialize)]
struct UserManifestParams<'a> {
    data: &'a str,
    name: &'a str,
}

/// ConfigMap name for a user manifest file, e.g. `etcd_secret.yaml` →
/// `user-manifest-etcd-secret`
pub fn user_config_map_name(file: &str) -> String {
    let stem = file.split('.').next().unwrap_or(file);
    format!("{}{}", USER_MANIFEST_PREFIX, stem.replace('_', "-"))
}

fn base_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, base)| base)
}

/// Builds the manifests of one hosted control plane
pub struct ClusterManifestContext<'a> {
    ctx: RenderContext<'a, ClusterParams>,
    user_manifest_files: Vec<String>,
    user_manifests: ManifestSet,
}

impl<'a> ClusterManifestContext<'a> {
    pub fn new(
        assets: &'a dyn AssetSource,
        images: BTreeMap<String, String>,
        versions: BTreeMap<String, String>,
        params: ClusterParams,
        pki_dir: &Path,
        output_dir: &Path,
        include_vpn: bool,
    ) -> Self {
        let funcs = TemplateFuncs::new(images, versions, pki_dir, include_vpn);
        Self {
            ctx: RenderContext::new(params, output_dir, assets, funcs),
            user_manifest_files: Vec::new(),
            user_manifests: ManifestSet::new(),
        }
    }

    /// Reinstall the helper set with a seeded `randomString`
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        let funcs = self.ctx.funcs().seeded(seed);
        self.ctx.set_funcs(funcs);
        self
    }

    /// Run every requested manifest group in its fixed order
    pub fn setup_manifests(&mut self, flags: FeatureFlags) -> Result<(), ManifestError> {
        if flags.etcd {
            self.etcd()?;
        }
        self.kube_api_server()?;
        self.cluster_bootstrap()?;
        if flags.external_oauth {
            self.oauth_openshift_server();
        }
        if flags.vpn {
            self.open_vpn()?;
        }
        if flags.include_registry {
            self.registry();
        }
        // Must follow every group that registers user manifests
        self.user_manifests_bootstrapper()?;
        self.router_proxy()?;
        self.hypershift_operator()
    }

    fn etcd(&mut self) -> Result<(), ManifestError> {
        info!("Adding etcd manifests");
        self.ctx.add_manifest_files(&[
            "etcd/etcd-cluster-crd.yaml",
            "etcd/etcd-cluster.yaml",
            "etcd/etcd-operator-cluster-role-binding.yaml",
            "etcd/etcd-operator-cluster-role.yaml",
            "etcd/etcd-operator.yaml",
        ])
    }

    fn kube_api_server(&mut self) -> Result<(), ManifestError> {
        info!("Adding kube-apiserver manifests");
        self.ctx
            .add_manifest_files(&["kube-apiserver/kube-apiserver-deployment.yaml"])?;
        self.ctx.add_patch(
            "kube-apiserver/kube-apiserver-deployment.yaml",
            "kube-apiserver/kube-apiserver-deployment-patch.yaml",
        )?;
        self.ctx
            .add_manifest_files(&["kube-apiserver/kube-apiserver-vpnclient-config.yaml"])
    }

    fn cluster_bootstrap(&mut self) -> Result<(), ManifestError> {
        info!("Adding cluster bootstrap manifests");
        let manifests = self.ctx.assets().list_dir("cluster-bootstrap")?;
        for m in manifests {
            self.user_manifest_files.push(format!("cluster-bootstrap/{}", m));
        }
        Ok(())
    }

    fn oauth_openshift_server(&mut self) {
        info!("Adding external OAuth manifests");
        self.add_user_manifest_files(&["oauth-openshift/ingress-certs-secret.yaml"]);
    }

    fn open_vpn(&mut self) -> Result<(), ManifestError> {
        info!("Adding OpenVPN manifests");
        self.ctx.add_manifest_files(&[
            "openvpn/openvpn-serviceaccount.yaml",
            "openvpn/openvpn-server-deployment.yaml",
            "openvpn/openvpn-ccd-configmap.yaml",
            "openvpn/openvpn-server-configmap.yaml",
        ])?;
        self.add_user_manifest_files(&[
            "openvpn/openvpn-client-deployment.yaml",
            "openvpn/openvpn-client-configmap.yaml",
        ]);
        Ok(())
    }

    fn registry(&mut self) {
        info!("Adding image registry manifests");
        self.add_user_manifest_files(&["registry/cluster-imageregistry-config.yaml"]);
    }

    fn router_proxy(&mut self) -> Result<(), ManifestError> {
        info!("Adding router proxy manifests");
        self.ctx.add_manifest_files(&[
            "router-proxy/router-proxy-deployment.yaml",
            "router-proxy/router-proxy-configmap.yaml",
            "router-proxy/router-proxy-vpnclient-configmap.yaml",
            "router-proxy/router-proxy-http-service.yaml",
            "router-proxy/router-proxy-https-service.yaml",
        ])
    }

    fn hypershift_operator(&mut self) -> Result<(), ManifestError> {
        info!("Adding hypershift operator manifests");
        self.ctx
            .add_manifest_files(&["hypershift-operator/hypershift-operator-deployment.yaml"])
    }

    /// Wrap every registered user manifest into a bootstrap ConfigMap
    fn user_manifests_bootstrapper(&mut self) -> Result<(), ManifestError> {
        info!(
            "Wrapping {} user manifests",
            self.user_manifest_files.len() + self.user_manifests.len()
        );
        self.ctx.add_manifest_files(&[
            "user-manifests-bootstrapper/user-manifests-bootstrapper-pod.yaml",
        ])?;

        for file in &self.user_manifest_files {
            let data = self.ctx.substitute_params(self.ctx.params(), file)?;
            let name = base_name(file);
            let manifest = wrap_user_manifest(&self.ctx, name, &data)?;
            self.ctx
                .add_manifest(format!("{}{}", USER_MANIFEST_PREFIX, name), manifest);
        }

        for entry in self.user_manifests.iter() {
            let manifest = wrap_user_manifest(&self.ctx, &entry.name, &entry.content)?;
            self.ctx
                .add_manifest(format!("{}{}", USER_MANIFEST_PREFIX, entry.name), manifest);
        }
        Ok(())
    }

    /// Register assets to be delivered as user manifests
    pub fn add_user_manifest_files(&mut self, paths: &[&str]) {
        self.user_manifest_files
            .extend(paths.iter().map(|p| p.to_string()));
    }

    /// Register literal content to be delivered as a user manifest
    pub fn add_user_manifest(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.user_manifests.insert(name, content);
    }

    /// Register the pull secret as an `openshift-config/pull-secret` user manifest
    pub fn add_pull_secret(&mut self, pull_secret: &Path) -> Result<(), ManifestError> {
        let secret = std::fs::read_to_string(pull_secret)
            .map_err(|e| ManifestError::io(pull_secret, e))?;
        let params = UserManifestParams {
            data: secret.trim_end(),
            name: "pull-secret",
        };
        let manifest = self
            .ctx
            .substitute_str(&params, "pull-secret.yaml", PULL_SECRET_TEMPLATE)?;
        self.add_user_manifest("pull-secret.yaml", manifest);
        Ok(())
    }

    pub fn render_manifests(self) -> RenderedManifests {
        self.ctx.render_manifests()
    }
}

fn wrap_user_manifest(
    ctx: &RenderContext<'_, ClusterParams>,
    file: &str,
    data: &str,
) -> Result<String, ManifestError> {
    let name = user_config_map_name(file);
    let params = UserManifestParams {
        data,
        name: &name,
    };
    ctx.substitute_params(&params, USER_MANIFEST_TEMPLATE)
}

/// Inputs of a full render pass
#[derive(Debug, Clone)]
pub struct RenderRequest<'r> {
    pub params: &'r ClusterParams,
    pub pull_secret: &'r Path,
    pub pki_dir: &'r Path,
    pub output_dir: PathBuf,
    pub flags: FeatureFlags,
    pub random_seed: Option<u64>,
}

/// Render every manifest of a hosted control plane.
///
/// Returns the complete ordered set or the first error; there is no
/// partial result.
pub async fn render_cluster_manifests<R: ReleaseResolver>(
    resolver: &R,
    assets: &dyn AssetSource,
    request: &RenderRequest<'_>,
) -> Result<RenderedManifests, ManifestError> {
    let params = request.params;
    info!("Rendering manifests for namespace {}", params.namespace);

    let release = resolver
        .resolve(
            &params.release_image,
            params.origin_release_prefix.as_deref(),
            request.pull_secret,
        )
        .await?
        .with_image_overrides(&params.image_overrides);

    let mut ctx = ClusterManifestContext::new(
        assets,
        release.images,
        release.versions,
        params.clone(),
        request.pki_dir,
        &request.output_dir,
        request.flags.vpn,
    );
    if let Some(seed) = request.random_seed {
        ctx = ctx.with_random_seed(seed);
    }
    ctx.add_pull_secret(request.pull_secret)?;
    ctx.setup_manifests(request.flags)?;

    let rendered = ctx.render_manifests();
    info!("Rendered {} manifests", rendered.manifests.len());
    Ok(rendered)
}
