/// Template helper functions available inside manifest assets
///
/// | Helper              | Usage                                     |
/// |---------------------|-------------------------------------------|
/// | `version`           | `{{version "kubernetes"}}`                |
/// | `imageFor`          | `{{imageFor "hyperkube"}}`                |
/// | `base64String`      | `{{base64String (pki "root-ca.pem")}}`    |
/// | `indent`            | `{{indent 4 (include "some/asset.yaml")}}`|
/// | `address`           | `{{address service_cidr 1}}`              |
/// | `mask`              | `{{mask service_cidr}}`                   |
/// | `include`           | `{{include "some/asset.yaml"}}`           |
/// | `includeVPN`        | `{{includeVPN "some/asset.yaml"}}`        |
/// | `includeData`       | `{{includeData data}}`                    |
/// | `trimTrailingSpace` | `{{trimTrailingSpace (include "x.yaml")}}`|
/// | `pki`               | `{{pki "root-ca.pem"}}`                   |
/// | `randomString`      | `{{randomString 32}}`                     |
///
/// `includeVPN` takes no flag argument: the VPN flag is bound when the helper
/// set is built, and the helper expands its asset only when that flag is set.
/// `include` chains nest at most `MAX_INCLUDE_DEPTH` deep.
use base64::{engine::general_purpose::STANDARD, Engine as _};
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderError,
    RenderErrorReason,
};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::error::{LookupKind, ManifestError};
use crate::assets::AssetSource;
use crate::utils::Cidr;

const MAX_INCLUDE_DEPTH: usize = 16;

/// Capabilities closed over by the template helpers for one render pass
pub struct TemplateFuncs {
    images: BTreeMap<String, String>,
    versions: BTreeMap<String, String>,
    pki_dir: PathBuf,
    include_vpn: bool,
    rng: Mutex<StdRng>,
    failure: Mutex<Option<ManifestError>>,
    include_depth: AtomicUsize,
}

impl TemplateFuncs {
    /// Create a helper set over resolved release tables
    pub fn new(
        images: BTreeMap<String, String>,
        versions: BTreeMap<String, String>,
        pki_dir: impl Into<PathBuf>,
        include_vpn: bool,
    ) -> Self {
        Self {
            images,
            versions,
            pki_dir: pki_dir.into(),
            include_vpn,
            rng: Mutex::new(StdRng::from_entropy()),
            failure: Mutex::new(None),
            include_depth: AtomicUsize::new(0),
        }
    }

    /// Copy of this helper set whose `randomString` output is reproducible
    pub fn seeded(&self, seed: u64) -> Self {
        Self {
            images: self.images.clone(),
            versions: self.versions.clone(),
            pki_dir: self.pki_dir.clone(),
            include_vpn: self.include_vpn,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            failure: Mutex::new(None),
            include_depth: AtomicUsize::new(0),
        }
    }

    /// Version string for a release component
    pub fn version(&self, component: &str) -> Result<String, ManifestError> {
        self.versions
            .get(component)
            .cloned()
            .ok_or_else(|| ManifestError::Lookup {
                kind: LookupKind::Version,
                name: component.to_string(),
            })
    }

    /// Pull reference for a logical image name
    pub fn image_for(&self, name: &str) -> Result<String, ManifestError> {
        self.images
            .get(name)
            .cloned()
            .ok_or_else(|| ManifestError::Lookup {
                kind: LookupKind::Image,
                name: name.to_string(),
            })
    }

    /// Contents of a file in the PKI directory
    pub fn pki(&self, file: &str) -> Result<String, ManifestError> {
        let path = self.pki_dir.join(file);
        std::fs::read_to_string(&path).map_err(|e| ManifestError::io(path, e))
    }

    pub fn include_vpn(&self) -> bool {
        self.include_vpn
    }

    /// Alphanumeric string of `len` characters; each call advances the generator
    pub fn random_string(&self, len: usize) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        (0..len)
            .map(|_| rng.sample(Alphanumeric) as char)
            .collect()
    }

    /// Keep the first helper failure of a pass
    fn record_failure(&self, err: ManifestError) {
        let mut slot = self.failure.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Take the helper failure recorded since the last call, if any
    pub(crate) fn take_failure(&self) -> Option<ManifestError> {
        self.failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

pub fn base64_string(s: &str) -> String {
    STANDARD.encode(s)
}

/// Prefix every line of `s` with `spaces` spaces
pub fn indent(spaces: usize, s: &str) -> String {
    let pad = " ".repeat(spaces);
    format!("{}{}", pad, s.replace('\n', &format!("\n{}", pad)))
}

pub fn address(cidr: &str, offset: u64) -> Result<String, ManifestError> {
    let cidr: Cidr = cidr.parse()?;
    Ok(cidr.address(offset)?.to_string())
}

pub fn mask(cidr: &str) -> Result<String, ManifestError> {
    let cidr: Cidr = cidr.parse()?;
    Ok(cidr.mask().to_string())
}

pub fn trim_trailing_space(s: &str) -> String {
    s.split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy)]
enum Func {
    Version,
    ImageFor,
    Base64String,
    Indent,
    Address,
    Mask,
    Include,
    IncludeVpn,
    IncludeData,
    TrimTrailingSpace,
    Pki,
    RandomString,
}

const HELPERS: &[(&str, Func)] = &[
    ("version", Func::Version),
    ("imageFor", Func::ImageFor),
    ("base64String", Func::Base64String),
    ("indent", Func::Indent),
    ("address", Func::Address),
    ("mask", Func::Mask),
    ("include", Func::Include),
    ("includeVPN", Func::IncludeVpn),
    ("includeData", Func::IncludeData),
    ("trimTrailingSpace", Func::TrimTrailingSpace),
    ("pki", Func::Pki),
    ("randomString", Func::RandomString),
];

fn bad_param(h: &Helper<'_>, idx: usize, expected: &str) -> RenderError {
    RenderErrorReason::Other(format!(
        "{}: expected {} argument at position {}",
        h.name(),
        expected,
        idx
    ))
    .into()
}

fn str_param<'h>(h: &'h Helper<'_>, idx: usize) -> Result<&'h str, RenderError> {
    h.param(idx)
        .and_then(|p| p.value().as_str())
        .ok_or_else(|| bad_param(h, idx, "string"))
}

fn u64_param(h: &Helper<'_>, idx: usize) -> Result<u64, RenderError> {
    h.param(idx)
        .and_then(|p| p.value().as_u64())
        .ok_or_else(|| bad_param(h, idx, "integer"))
}

/// One registered helper bound to the pass's capabilities
struct FuncHelper<'a> {
    func: Func,
    funcs: Arc<TemplateFuncs>,
    assets: &'a dyn AssetSource,
}

impl FuncHelper<'_> {
    fn fail(&self, err: ManifestError) -> RenderError {
        let msg = err.to_string();
        self.funcs.record_failure(err);
        RenderErrorReason::Other(msg).into()
    }

    fn include(
        &self,
        path: &str,
        r: &Handlebars<'_>,
        ctx: &Context,
    ) -> Result<String, RenderError> {
        debug!("Including asset {}", path);
        let body = self.assets.get(path).map_err(|e| self.fail(e))?;

        let depth = &self.funcs.include_depth;
        if depth.fetch_add(1, Ordering::SeqCst) >= MAX_INCLUDE_DEPTH {
            depth.fetch_sub(1, Ordering::SeqCst);
            let reason = RenderErrorReason::Other(format!(
                "include nested deeper than {} levels",
                MAX_INCLUDE_DEPTH
            ));
            return Err(self.fail(ManifestError::template(path, reason.into())));
        }
        let result = r.render_template(body, ctx.data());
        depth.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn eval(
        &self,
        h: &Helper<'_>,
        r: &Handlebars<'_>,
        ctx: &Context,
    ) -> Result<String, RenderError> {
        let funcs = &self.funcs;
        let result = match self.func {
            Func::Version => funcs.version(str_param(h, 0)?),
            Func::ImageFor => funcs.image_for(str_param(h, 0)?),
            Func::Base64String => Ok(base64_string(str_param(h, 0)?)),
            Func::Indent => Ok(indent(u64_param(h, 0)? as usize, str_param(h, 1)?)),
            Func::Address => address(str_param(h, 0)?, u64_param(h, 1)?),
            Func::Mask => mask(str_param(h, 0)?),
            Func::Include => return self.include(str_param(h, 0)?, r, ctx),
            Func::IncludeVpn => {
                if !funcs.include_vpn() {
                    return Ok(String::new());
                }
                return self.include(str_param(h, 0)?, r, ctx);
            }
            Func::IncludeData => {
                let value = h.param(0).ok_or_else(|| bad_param(h, 0, "data"))?.value();
                Ok(match value.as_str() {
                    Some(s) => s.to_string(),
                    None => value.to_string(),
                })
            }
            Func::TrimTrailingSpace => Ok(trim_trailing_space(str_param(h, 0)?)),
            Func::Pki => funcs.pki(str_param(h, 0)?),
            Func::RandomString => Ok(funcs.random_string(u64_param(h, 0)? as usize)),
        };
        result.map_err(|e| self.fail(e))
    }
}

impl HelperDef for FuncHelper<'_> {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let text = self.eval(h, r, ctx)?;
        out.write(&text)?;
        Ok(())
    }
}

/// Build a strict, non-escaping registry with every helper installed
pub fn registry<'a>(funcs: &Arc<TemplateFuncs>, assets: &'a dyn AssetSource) -> Handlebars<'a> {
    let mut hb = Handlebars::new();
    hb.set_strict_mode(true);
    hb.register_escape_fn(handlebars::no_escape);

    for (name, func) in HELPERS {
        hb.register_helper(
            name,
            Box::new(FuncHelper {
                func: *func,
                funcs: Arc::clone(funcs),
                assets,
            }),
        );
    }
    hb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use serde_json::json;
    use std::path::Path;

    fn tables() -> (BTreeMap<String, String>, BTreeMap<String, String>) {
        let images = BTreeMap::from([(
            "hyperkube".to_string(),
            "quay.io/openshift/hyperkube@sha256:abc".to_string(),
        )]);
        let versions = BTreeMap::from([("kubernetes".to_string(), "1.18.3".to_string())]);
        (images, versions)
    }

    fn funcs(pki_dir: &Path, include_vpn: bool) -> Arc<TemplateFuncs> {
        let (images, versions) = tables();
        Arc::new(TemplateFuncs::new(images, versions, pki_dir, include_vpn).seeded(7))
    }

    fn render(funcs: &Arc<TemplateFuncs>, assets: &MemoryAssets, template: &str) -> Result<String, RenderError> {
        let hb = registry(funcs, assets);
        hb.render_template(template, &json!({"service_cidr": "172.30.0.0/16", "name": "demo"}))
    }

    #[test]
    fn test_table_lookups() {
        let funcs = funcs(Path::new("/nonexistent"), false);
        assert_eq!(funcs.version("kubernetes").unwrap(), "1.18.3");
        assert_eq!(
            funcs.image_for("hyperkube").unwrap(),
            "quay.io/openshift/hyperkube@sha256:abc"
        );
        assert!(matches!(
            funcs.image_for("nonexistent"),
            Err(ManifestError::Lookup { kind: LookupKind::Image, .. })
        ));
        assert!(matches!(
            funcs.version("etcd"),
            Err(ManifestError::Lookup { kind: LookupKind::Version, .. })
        ));
    }

    #[test]
    fn test_pure_helpers() {
        assert_eq!(base64_string("hello"), "aGVsbG8=");
        assert_eq!(indent(2, "a\nb"), "  a\n  b");
        assert_eq!(trim_trailing_space("a  \nb\t\nc"), "a\nb\nc");
        assert_eq!(address("10.0.0.0/24", 10).unwrap(), "10.0.0.10");
        assert_eq!(mask("10.0.0.0/24").unwrap(), "255.255.255.0");
        assert!(matches!(mask("bogus"), Err(ManifestError::InvalidCidr { .. })));
    }

    #[test]
    fn test_random_string_shape() {
        let funcs = funcs(Path::new("/nonexistent"), false);
        let a = funcs.random_string(32);
        let b = funcs.random_string(32);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let first = funcs(Path::new("/nonexistent"), false).random_string(16);
        let second = funcs(Path::new("/nonexistent"), false).random_string(16);
        assert_eq!(first, second);
    }

    #[test]
    fn test_helpers_in_templates() {
        let funcs = funcs(Path::new("/nonexistent"), false);
        let assets = MemoryAssets::new();
        let out = render(
            &funcs,
            &assets,
            "image: {{imageFor \"hyperkube\"}}\nversion: {{version \"kubernetes\"}}\ndns: {{address service_cidr 10}}\nmask: {{mask service_cidr}}",
        )
        .unwrap();
        assert_eq!(
            out,
            "image: quay.io/openshift/hyperkube@sha256:abc\nversion: 1.18.3\ndns: 172.30.0.10\nmask: 255.255.0.0"
        );
    }

    #[test]
    fn test_no_html_escaping() {
        let funcs = funcs(Path::new("/nonexistent"), false);
        let assets = MemoryAssets::new();
        let out = render(&funcs, &assets, "{{includeData \"a<b>&'c'\"}}").unwrap();
        assert_eq!(out, "a<b>&'c'");
    }

    #[test]
    fn test_include_and_indent() {
        let funcs = funcs(Path::new("/nonexistent"), false);
        let assets = MemoryAssets::new().with("parts/labels.yaml", "app: {{name}}\ntier: control");
        let out = render(&funcs, &assets, "labels:\n{{indent 2 (include \"parts/labels.yaml\")}}").unwrap();
        assert_eq!(out, "labels:\n  app: demo\n  tier: control");
    }

    #[test]
    fn test_include_vpn_gated() {
        let assets = MemoryAssets::new().with("vpn/container.yaml", "- name: openvpn-client");
        let template = "containers:\n{{includeVPN \"vpn/container.yaml\"}}";

        let off = render(&funcs(Path::new("/nonexistent"), false), &assets, template).unwrap();
        assert_eq!(off, "containers:\n");

        let on = render(&funcs(Path::new("/nonexistent"), true), &assets, template).unwrap();
        assert_eq!(on, "containers:\n- name: openvpn-client");
    }

    #[test]
    fn test_pki_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("root-ca.pem"), "CERT").unwrap();
        let funcs = funcs(dir.path(), false);
        let assets = MemoryAssets::new();

        let out = render(&funcs, &assets, "ca: {{base64String (pki \"root-ca.pem\")}}").unwrap();
        assert_eq!(out, "ca: Q0VSVA==");
    }

    #[test]
    fn test_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let funcs = funcs(dir.path(), false);
        let assets = MemoryAssets::new();

        assert!(render(&funcs, &assets, "{{pki \"missing.pem\"}}").is_err());
        assert!(matches!(funcs.take_failure(), Some(ManifestError::Io { .. })));
        assert!(funcs.take_failure().is_none());
    }

    #[test]
    fn test_first_failure_wins() {
        let funcs = funcs(Path::new("/nonexistent"), false);
        let assets = MemoryAssets::new().with("inner.yaml", "{{imageFor \"nonexistent\"}}");

        assert!(render(&funcs, &assets, "{{include \"inner.yaml\"}}").is_err());
        assert!(matches!(
            funcs.take_failure(),
            Some(ManifestError::Lookup { kind: LookupKind::Image, .. })
        ));
    }

    #[test]
    fn test_self_include_is_bounded() {
        let funcs = funcs(Path::new("/nonexistent"), false);
        let assets = MemoryAssets::new()
            .with("loop/a.yaml", "a: {{include \"loop/b.yaml\"}}")
            .with("loop/b.yaml", "b: {{include \"loop/a.yaml\"}}");

        assert!(render(&funcs, &assets, "{{include \"loop/a.yaml\"}}").is_err());
        assert!(matches!(
            funcs.take_failure(),
            Some(ManifestError::Template { ref name, .. }) if name.starts_with("loop/")
        ));

        // The depth counter unwinds, so later includes still work
        let assets = assets.with("plain.yaml", "ok");
        assert_eq!(render(&funcs, &assets, "{{include \"plain.yaml\"}}").unwrap(), "ok");
    }

    #[test]
    fn test_seeded_copy_keeps_tables() {
        let funcs = funcs(Path::new("/nonexistent"), true);
        let copy = funcs.seeded(7);
        assert_eq!(copy.version("kubernetes").unwrap(), "1.18.3");
        assert!(copy.include_vpn());
        assert_eq!(copy.random_string(16), funcs.seeded(7).random_string(16));
    }

    #[test]
    fn test_unknown_variable_is_error() {
        let funcs = funcs(Path::new("/nonexistent"), false);
        let assets = MemoryAssets::new();
        assert!(render(&funcs, &assets, "{{does_not_exist}}").is_err());
        assert!(funcs.take_failure().is_none());
    }
}
