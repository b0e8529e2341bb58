/// Manifest rendering for hosted control planes
pub mod cluster;
pub mod context;
pub mod error;
pub mod funcs;
pub mod manifest;

pub use cluster::{render_cluster_manifests, FeatureFlags, RenderRequest};
pub use error::ManifestError;
pub use manifest::RenderedManifests;
