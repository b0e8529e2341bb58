/// Rendered manifests and the ordered set that accumulates them
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::ManifestError;

/// A fully rendered unit of output text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub content: String,
}

/// Insertion-ordered name → text mapping.
///
/// Inserting an existing name replaces its content in place, so a name keeps
/// the position of its first insertion.
#[derive(Debug, Clone, Default)]
pub struct ManifestSet {
    entries: Vec<Manifest>,
    index: HashMap<String, usize>,
}

impl ManifestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a manifest
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        let name = name.into();
        let content = content.into();
        debug_assert!(!name.is_empty(), "manifest names must not be empty");

        match self.index.get(&name) {
            Some(&pos) => self.entries[pos].content = content,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push(Manifest { name, content });
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.index
            .get(name)
            .map(|&pos| self.entries[pos].content.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Manifest> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Manifest> {
        self.entries
    }
}

/// Final output of a render pass, ready to be written out
#[derive(Debug, Clone)]
pub struct RenderedManifests {
    pub output_dir: PathBuf,
    pub manifests: Vec<Manifest>,
}

impl RenderedManifests {
    /// Output path for a manifest name
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.output_dir.join(Path::new(name))
    }

    /// Write every manifest under the output directory
    pub fn write_all(&self) -> Result<(), ManifestError> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| ManifestError::io(&self.output_dir, e))?;

        for manifest in &self.manifests {
            let path = self.path_for(&manifest.name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ManifestError::io(parent, e))?;
            }
            std::fs::write(&path, &manifest.content).map_err(|e| ManifestError::io(&path, e))?;
            debug!("Wrote {}", path.display());
        }

        info!(
            "Wrote {} manifests to {}",
            self.manifests.len(),
            self.output_dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
impl RenderedManifests {
    /// Manifest names in output order
    pub fn names(&self) -> Vec<&str> {
        self.manifests.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.manifests
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.content.as_str())
    }
}
