/// Release metadata lookup through `oc adm release info`
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::{ReleaseInfo, ReleaseResolver};
use crate::render::ManifestError;
use crate::utils::CommandBuilder;

/// Resolves a release image by asking the registry through `oc`
#[derive(Debug, Clone)]
pub struct OcReleaseResolver {
    oc_binary: String,
}

impl Default for OcReleaseResolver {
    fn default() -> Self {
        Self {
            oc_binary: "oc".to_string(),
        }
    }
}

impl OcReleaseResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `oc` binary
    pub fn with_binary(mut self, oc_binary: impl Into<String>) -> Self {
        self.oc_binary = oc_binary.into();
        self
    }

    /// Check that the `oc` client can be executed
    pub async fn check_installed(&self) -> anyhow::Result<()> {
        CommandBuilder::new(&self.oc_binary)
            .args(["version", "--client"])
            .context(format!(
                "{} is not installed or not in PATH. Please install the OpenShift client",
                self.oc_binary
            ))
            .run()
            .await
            .map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseInfoOutput {
    metadata: ReleaseMetadata,
    references: ImageStream,
    #[serde(default)]
    display_versions: BTreeMap<String, DisplayVersion>,
}

#[derive(Debug, Deserialize)]
struct ReleaseMetadata {
    version: String,
}

#[derive(Debug, Deserialize)]
struct ImageStream {
    spec: ImageStreamSpec,
}

#[derive(Debug, Deserialize)]
struct ImageStreamSpec {
    #[serde(default)]
    tags: Vec<TagReference>,
}

#[derive(Debug, Deserialize)]
struct TagReference {
    name: String,
    from: Option<ObjectReference>,
}

#[derive(Debug, Deserialize)]
struct ObjectReference {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DisplayVersion {
    #[serde(rename = "Version")]
    version: String,
}

/// Turn `oc adm release info -o json` output into release tables
fn parse_release_info(
    release_image: &str,
    origin_release_prefix: Option<&str>,
    json: &str,
) -> Result<ReleaseInfo, ManifestError> {
    let output: ReleaseInfoOutput =
        serde_json::from_str(json).map_err(|e| ManifestError::ReleaseResolution {
            image: release_image.to_string(),
            reason: format!("unexpected release info output: {}", e),
        })?;

    let mut images: BTreeMap<String, String> = output
        .references
        .spec
        .tags
        .into_iter()
        .filter_map(|tag| tag.from.map(|from| (tag.name, from.name)))
        .collect();

    let release_ref = match origin_release_prefix {
        Some(prefix) => format!("{}:{}", prefix, output.metadata.version),
        None => release_image.to_string(),
    };
    images.insert("release".to_string(), release_ref);

    let mut versions: BTreeMap<String, String> = output
        .display_versions
        .into_iter()
        .map(|(component, v)| (component, v.version))
        .collect();
    versions.insert("release".to_string(), output.metadata.version);

    Ok(ReleaseInfo { images, versions })
}

impl ReleaseResolver for OcReleaseResolver {
    async fn resolve(
        &self,
        release_image: &str,
        origin_release_prefix: Option<&str>,
        pull_secret: &Path,
    ) -> Result<ReleaseInfo, ManifestError> {
        info!("Resolving release image {}...", release_image);

        let stdout = CommandBuilder::new(&self.oc_binary)
            .args(["adm", "release", "info", "--registry-config"])
            .arg(pull_secret)
            .args(["-o", "json", release_image])
            .context("Failed to execute oc adm release info")
            .run()
            .await
            .map_err(|e| ManifestError::ReleaseResolution {
                image: release_image.to_string(),
                reason: format!("{:#}", e),
            })?;

        let info = parse_release_info(release_image, origin_release_prefix, &stdout)?;
        info!(
            "Resolved {} images and {} versions",
            info.images.len(),
            info.versions.len()
        );
        Ok(info)
    }
}
