/// Render context: template substitution and the accumulated manifest set
use handlebars::Handlebars;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::error::ManifestError;
use super::funcs::{self, TemplateFuncs};
use super::manifest::{ManifestSet, RenderedManifests};
use crate::assets::AssetSource;

/// Accumulates named manifests rendered from an asset library.
///
/// A context is created for a single render pass and consumed by
/// [`RenderContext::render_manifests`]. It always carries an installed helper
/// set; [`RenderContext::set_funcs`] replaces it.
pub struct RenderContext<'a, P> {
    params: P,
    output_dir: PathBuf,
    assets: &'a dyn AssetSource,
    funcs: Arc<TemplateFuncs>,
    registry: Handlebars<'a>,
    manifests: ManifestSet,
}

impl<'a, P: Serialize> RenderContext<'a, P> {
    pub fn new(
        params: P,
        output_dir: impl Into<PathBuf>,
        assets: &'a dyn AssetSource,
        funcs: TemplateFuncs,
    ) -> Self {
        let funcs = Arc::new(funcs);
        let registry = funcs::registry(&funcs, assets);
        Self {
            params,
            output_dir: output_dir.into(),
            assets,
            funcs,
            registry,
            manifests: ManifestSet::new(),
        }
    }

    /// Install a new helper set for subsequent substitutions
    pub fn set_funcs(&mut self, funcs: TemplateFuncs) {
        self.funcs = Arc::new(funcs);
        self.registry = funcs::registry(&self.funcs, self.assets);
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    pub fn assets(&self) -> &'a dyn AssetSource {
        self.assets
    }

    pub fn funcs(&self) -> &TemplateFuncs {
        &self.funcs
    }

    /// Expand the asset at `asset_path` with `params` as the root scope
    pub fn substitute_params<T: Serialize>(
        &self,
        params: &T,
        asset_path: &str,
    ) -> Result<String, ManifestError> {
        let body = self.assets.get(asset_path)?;
        self.substitute_str(params, asset_path, body)
    }

    /// Expand a raw template string; `name` is only used for error reporting
    pub fn substitute_str<T: Serialize>(
        &self,
        params: &T,
        name: &str,
        template: &str,
    ) -> Result<String, ManifestError> {
        self.registry
            .render_template(template, params)
            .map_err(|err| {
                self.funcs
                    .take_failure()
                    .unwrap_or_else(|| ManifestError::template(name, err))
            })
    }

    /// Insert or overwrite a rendered manifest
    pub fn add_manifest(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        debug!("Rendered manifest {}", name);
        self.manifests.insert(name, text);
    }

    /// Render each asset with the context parameters, named by its asset path
    pub fn add_manifest_files(&mut self, asset_paths: &[&str]) -> Result<(), ManifestError> {
        for path in asset_paths {
            let text = self.substitute_params(&self.params, path)?;
            self.add_manifest(*path, text);
        }
        Ok(())
    }

    /// Append the expansion of `patch_asset` to the manifest named `base_name`.
    ///
    /// This is a textual override: later keys win when the result is parsed
    /// as YAML.
    pub fn add_patch(&mut self, base_name: &str, patch_asset: &str) -> Result<(), ManifestError> {
        let base = self
            .manifests
            .get(base_name)
            .ok_or_else(|| ManifestError::PatchTargetMissing {
                name: base_name.to_string(),
            })?
            .to_string();
        let patch = self.substitute_params(&self.params, patch_asset)?;
        debug!("Patched manifest {} with {}", base_name, patch_asset);
        self.manifests.insert(base_name, base + &patch);
        Ok(())
    }

    /// Consume the context, yielding manifests in insertion order
    pub fn render_manifests(self) -> RenderedManifests {
        RenderedManifests {
            output_dir: self.output_dir,
            manifests: self.manifests.into_vec(),
        }
    }
}
