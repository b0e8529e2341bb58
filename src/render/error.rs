/// Error taxonomy for manifest rendering
use std::path::PathBuf;
use thiserror::Error;

/// Every failure the rendering core can report.
///
/// Rendering is all-or-nothing: the first error aborts the pass and no
/// partial manifest set is returned.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("asset not found: {path}")]
    AssetNotFound { path: String },

    #[error("failed to render template {name}: {source}")]
    Template {
        name: String,
        #[source]
        source: Box<handlebars::RenderError>,
    },

    #[error("no {kind} found for {name:?}")]
    Lookup { kind: LookupKind, name: String },

    #[error("invalid CIDR {cidr:?}: {reason}")]
    InvalidCidr { cidr: String, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot patch {name}: manifest has not been rendered")]
    PatchTargetMissing { name: String },

    #[error("failed to resolve release {image}: {reason}")]
    ReleaseResolution { image: String, reason: String },
}

/// Which release table a failed lookup went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Image,
    Version,
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupKind::Image => write!(f, "image"),
            LookupKind::Version => write!(f, "version"),
        }
    }
}

impl ManifestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ManifestError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn template(name: impl Into<String>, source: handlebars::RenderError) -> Self {
        ManifestError::Template {
            name: name.into(),
            source: Box::new(source),
        }
    }
}
