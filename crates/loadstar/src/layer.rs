//! Override chain for path resolution, fetching and error reporting.
//!
//! Layers are stacked on a [`Loader`]; the most recently installed layer is
//! asked first. Every operation receives a [`Next`] handle that runs the
//! same operation on the layers installed before it, bottoming out in the
//! built-in behavior and the platform.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::error::LoaderError;
use crate::exports::Exports;
use crate::loader::Loader;
use crate::platform::Platform;

/// Ids that already carry a short lowercase extension are used verbatim
static EXTENSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*)\.([a-z0-9]{1,4})$").expect("Invalid regex pattern for extension detection")
});

/// Built-in mapping from module id to fetch location
pub fn default_path(id: &str) -> String {
    if id.ends_with('/') {
        format!("{id}main.js")
    } else if EXTENSION_RE.is_match(id) {
        id.to_owned()
    } else {
        format!("{id}.js")
    }
}

/// A set of behavioral overrides.
///
/// Each method defaults to delegating to `next`, so a layer only implements
/// what it changes.
#[async_trait]
pub trait Layer: Send + Sync {
    /// Map a module id to the location handed to `fetch`
    fn path(&self, id: &str, next: Next<'_>) -> String {
        next.path(id)
    }

    /// Execute the module at `path` and return its exports
    async fn fetch(&self, id: &str, path: &str, next: Next<'_>) -> anyhow::Result<Option<Exports>> {
        next.fetch(id, path).await
    }

    /// Surface a load failure
    fn report(&self, error: &LoaderError, next: Next<'_>) {
        next.report(error);
    }
}

/// Handle to the behavior installed below the current layer
#[derive(Clone, Copy)]
pub struct Next<'a> {
    loader: &'a Loader,
    layers: &'a [Arc<dyn Layer>],
    platform: &'a dyn Platform,
}

impl<'a> Next<'a> {
    /// The loader the chain belongs to, for re-entrant calls through the
    /// full chain
    pub fn loader(&self) -> &'a Loader {
        self.loader
    }

    fn below(self, layers: &'a [Arc<dyn Layer>]) -> Self {
        Self { layers, ..self }
    }

    /// Path of `id` according to the layers below
    pub fn path(self, id: &str) -> String {
        match self.layers.split_last() {
            Some((layer, rest)) => layer.path(id, self.below(rest)),
            None => default_path(id),
        }
    }

    /// Fetch through the layers below, ending at the platform
    pub async fn fetch(self, id: &str, path: &str) -> anyhow::Result<Option<Exports>> {
        match self.layers.split_last() {
            Some((layer, rest)) => layer.fetch(id, path, self.below(rest)).await,
            None => self.platform.fetch(self.loader, id, path).await,
        }
    }

    /// Report through the layers below, ending at the error log
    pub fn report(self, error: &LoaderError) {
        match self.layers.split_last() {
            Some((layer, rest)) => layer.report(error, self.below(rest)),
            None => log::error!("Error loading module: {}: {}", error.id(), error),
        }
    }
}

/// Snapshot of the installed layers and the platform beneath them
pub(crate) struct Chain {
    layers: Vec<Arc<dyn Layer>>,
    platform: Arc<dyn Platform>,
}

impl Chain {
    pub(crate) fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            layers: Vec::new(),
            platform,
        }
    }

    pub(crate) fn with_layer(&self, layer: Arc<dyn Layer>) -> Self {
        let mut layers = self.layers.clone();
        layers.push(layer);
        Self {
            layers,
            platform: Arc::clone(&self.platform),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.layers.len()
    }

    pub(crate) fn top<'a>(&'a self, loader: &'a Loader) -> Next<'a> {
        Next {
            loader,
            layers: &self.layers,
            platform: self.platform.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path() {
        assert_eq!(default_path("modules/"), "modules/main.js");
        assert_eq!(default_path("modules/component"), "modules/component.js");
        assert_eq!(default_path("styles/theme.css"), "styles/theme.css");
        assert_eq!(default_path("data/v2.json"), "data/v2.json");
        assert_eq!(default_path("lib.es2015"), "lib.es2015.js");
        assert_eq!(default_path("Upper.JS"), "Upper.JS.js");
        assert_eq!(default_path("a.b/c"), "a.b/c.js");
        assert_eq!(default_path(".rc"), ".rc");
    }
}
