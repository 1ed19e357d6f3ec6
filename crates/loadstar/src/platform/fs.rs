use anyhow::Context;
use async_trait::async_trait;
use indexmap::IndexMap;
use log::debug;
use std::path::{Path, PathBuf};

use super::Platform;
use crate::config::ModuleManifest;
use crate::exports::Exports;
use crate::loader::Loader;

/// Exported value of a module read from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceModule {
    /// Module id
    pub id: String,
    /// File the source was read from
    pub path: PathBuf,
    /// Raw file contents
    pub source: String,
}

/// Platform reading module files below a root directory.
///
/// Files are not evaluated. Their dependency declarations come from the
/// manifest: `symbols` are declared while the module is on the context,
/// `requires` become the dependencies of its init step.
#[derive(Debug, Clone)]
pub struct FsPlatform {
    root: PathBuf,
    manifest: IndexMap<String, ModuleManifest>,
}

impl FsPlatform {
    /// Read modules relative to `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest: IndexMap::new(),
        }
    }

    /// Declarations keyed by module id
    #[must_use]
    pub fn with_manifest(mut self, manifest: IndexMap<String, ModuleManifest>) -> Self {
        self.manifest = manifest;
        self
    }

    /// Directory module paths are joined to
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Platform for FsPlatform {
    async fn fetch(&self, loader: &Loader, id: &str, path: &str) -> anyhow::Result<Option<Exports>> {
        let file = self.root.join(path);
        debug!("Reading module {} from {:?}", id, file);
        let source = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("Failed to read module source: {:?}", file))?;

        if source.trim().is_empty() {
            return Ok(None);
        }

        let entry = self.manifest.get(id);
        if let Some(entry) = entry {
            for symbol in &entry.symbols {
                loader.symbol(symbol);
            }
        }

        let mut exports = Exports::new(SourceModule {
            id: id.to_owned(),
            path: file,
            source,
        });
        if let Some(entry) = entry {
            if !entry.requires.is_empty() {
                exports = exports.with_dependencies(entry.requires.iter().cloned());
            }
            if entry.init {
                exports = exports.with_init(|_, _| async { anyhow::Ok(()) });
            }
        }
        Ok(Some(exports))
    }
}
