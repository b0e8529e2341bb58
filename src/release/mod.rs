/// Release payload metadata: image references and component versions
pub mod oc;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;

use crate::render::ManifestError;

pub use oc::OcReleaseResolver;

/// Images and versions published by a release payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// Logical image name → pull reference
    #[serde(default)]
    pub images: BTreeMap<String, String>,

    /// Component name → version string
    #[serde(default)]
    pub versions: BTreeMap<String, String>,
}

impl ReleaseInfo {
    /// Load release metadata from a JSON or YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ManifestError::io(path, e))?;
        serde_yaml::from_str(&content).map_err(|e| ManifestError::ReleaseResolution {
            image: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Layer image overrides on top of the payload images
    pub fn with_image_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        self.images
            .extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// Looks up the images and versions of a release image
pub trait ReleaseResolver {
    fn resolve(
        &self,
        release_image: &str,
        origin_release_prefix: Option<&str>,
        pull_secret: &Path,
    ) -> impl Future<Output = Result<ReleaseInfo, ManifestError>> + Send;
}

/// Resolver returning fixed metadata, for offline rendering
#[derive(Debug, Clone, Default)]
pub struct StaticReleaseResolver {
    info: ReleaseInfo,
}

impl StaticReleaseResolver {
    pub fn new(info: ReleaseInfo) -> Self {
        Self { info }
    }
}

impl ReleaseResolver for StaticReleaseResolver {
    async fn resolve(
        &self,
        _release_image: &str,
        _origin_release_prefix: Option<&str>,
        _pull_secret: &Path,
    ) -> Result<ReleaseInfo, ManifestError> {
        Ok(self.info.clone())
    }
}
