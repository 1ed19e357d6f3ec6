//! Single-file bundle generation from a preloaded module graph.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use cow_utils::CowUtils;
use indexmap::IndexSet;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::exports::Exports;
use crate::graph::Module;
use crate::layer::{Layer, Next};
use crate::loader::Loader;

/// Blocking requires inside module sources, rewritten for the bundled runtime
static REQUIRE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"await\s+loader\.require").expect("Invalid regex pattern for require detection")
});

/// Decides whether a resolved module goes into the bundle
pub type ModuleFilter = Arc<dyn Fn(&Module) -> bool + Send + Sync>;

/// How a bundle is assembled
#[derive(Clone)]
pub struct BundleOptions {
    /// Prepended to every module id before path resolution
    pub prefix: String,
    /// Modules rejected by the filter are left out
    pub filter: Option<ModuleFilter>,
    /// Text placed at the top of the bundle
    pub header: String,
    /// Directory module sources are read from
    pub root: PathBuf,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            prefix: "./".to_owned(),
            filter: None,
            header: String::new(),
            root: PathBuf::from("."),
        }
    }
}

impl BundleOptions {
    /// Set the path prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the header text
    #[must_use]
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Set the source directory
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Keep only the modules `filter` accepts
    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Module) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Leave the given ids out of the bundle
    #[must_use]
    pub fn excluding(self, ids: IndexSet<String>) -> Self {
        if ids.is_empty() {
            return self;
        }
        self.with_filter(move |module| !ids.contains(module.id()))
    }
}

impl fmt::Debug for BundleOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleOptions")
            .field("prefix", &self.prefix)
            .field("filter", &self.filter.is_some())
            .field("header", &self.header)
            .field("root", &self.root)
            .finish()
    }
}

/// One module as it appears in the bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    /// Module id
    pub id: String,
    /// Raw module source
    pub source: String,
    /// Whether the aggregate init awaits this module's init hook
    pub has_init: bool,
}

type Sources = Arc<Mutex<FxHashMap<String, String>>>;

/// Prefixes paths and records the raw source of every fetched module
struct CaptureLayer {
    prefix: String,
    root: PathBuf,
    sources: Sources,
}

#[async_trait]
impl Layer for CaptureLayer {
    fn path(&self, id: &str, next: Next<'_>) -> String {
        next.path(&format!("{}{}", self.prefix, id))
    }

    async fn fetch(&self, id: &str, path: &str, next: Next<'_>) -> anyhow::Result<Option<Exports>> {
        let file = self.root.join(path);
        let source = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("Failed to read module source: {:?}", file))?;
        self.sources.lock().insert(id.to_owned(), source);
        next.fetch(id, path).await
    }
}

/// Turns the dependency graph of an entry module into one artifact
pub struct Bundler {
    loader: Loader,
    options: BundleOptions,
    sources: Sources,
}

impl Bundler {
    /// Install the source-capturing layer on `loader`.
    ///
    /// Modules already loaded before this call have no captured source and
    /// cannot be bundled.
    pub fn new(loader: Loader, options: BundleOptions) -> Self {
        let sources = Sources::default();
        loader.use_layer(CaptureLayer {
            prefix: options.prefix.clone(),
            root: options.root.clone(),
            sources: Arc::clone(&sources),
        });
        Self {
            loader,
            options,
            sources,
        }
    }

    /// The loader driving this bundler
    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// Preload `id` and render it with its whole dependency closure
    pub async fn generate(&self, id: &str, name: &str) -> Result<String> {
        info!("Generating bundle '{}' from {}", name, id);
        self.loader
            .preload(id)
            .await
            .with_context(|| format!("Failed to preload module '{}'", id))?;

        let root = self
            .loader
            .module(id)
            .ok_or_else(|| anyhow!("Module '{}' is not registered", id))?;
        let mut modules = vec![root];
        modules.extend(
            self.loader
                .deep_dependencies(id)
                .iter()
                .filter_map(|dep| self.loader.module(dep)),
        );
        if let Some(filter) = &self.options.filter {
            modules.retain(|module| filter(module));
        }

        let selected: IndexSet<&str> = modules.iter().map(Module::id).collect();
        for group in self.loader.circular_groups() {
            if group.iter().any(|id| selected.contains(id.as_str())) {
                warn!(
                    "Circular dependency between modules: {}; bundle relies on registration order",
                    group.join(", ")
                );
            }
        }

        let entries = {
            let sources = self.sources.lock();
            modules
                .iter()
                .map(|module| {
                    let source = sources.get(module.id()).cloned().ok_or_else(|| {
                        anyhow!(
                            "No source captured for module '{}'; defined modules cannot be bundled",
                            module.id()
                        )
                    })?;
                    Ok(BundleEntry {
                        id: module.id().to_owned(),
                        source,
                        has_init: module.exports().is_some_and(Exports::has_init),
                    })
                })
                .collect::<Result<Vec<_>>>()?
        };

        debug!("Bundling {} modules", entries.len());
        let bundle = render_bundle(&entries, name, &self.options.header);
        Ok(rewrite_requires(&bundle).into_owned())
    }
}

fn escape(value: &str) -> String {
    value
        .cow_replace('\\', "\\\\")
        .cow_replace('\'', "\\'")
        .into_owned()
}

/// Lay entries out as an artifact that registers every module and exports
/// `{ name, init }`
pub fn render_bundle(entries: &[BundleEntry], name: &str, header: &str) -> String {
    let modules = entries
        .iter()
        .map(|entry| {
            format!(
                "{}\nloader.define('{}', module.exports);\n",
                entry.source,
                escape(&entry.id)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let inits = entries
        .iter()
        .filter(|entry| entry.has_init)
        .map(|entry| format!("loader.get('{}').init(),", escape(&entry.id)))
        .collect::<Vec<_>>()
        .join("\n      ");

    format!(
        "{header}\n\n{modules}\n{{\n  module.exports = {{\n    name: '{}',\n    init: () => Promise.all([\n      {inits}\n    ]),\n  }};\n}}\n",
        escape(name)
    )
}

/// Replace every blocking `await loader.require` with a synchronous
/// `loader.get`
pub fn rewrite_requires(text: &str) -> Cow<'_, str> {
    REQUIRE_PATTERN.replace_all(text, "loader.get")
}
