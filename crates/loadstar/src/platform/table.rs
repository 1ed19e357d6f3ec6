use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;

use super::Platform;
use crate::exports::Exports;
use crate::loader::Loader;

/// Executable body of a programmatic module
pub type ModuleBody = Arc<dyn Fn(&Loader) -> anyhow::Result<Option<Exports>> + Send + Sync>;

/// In-memory platform mapping paths to module bodies.
///
/// Every fetch is counted per path, which makes single-flight behavior
/// observable. An optional latency suspends each fetch before the body runs.
#[derive(Default)]
pub struct ModuleTable {
    bodies: RwLock<FxHashMap<String, ModuleBody>>,
    fetches: Mutex<FxHashMap<String, usize>>,
    latency: Option<Duration>,
}

impl ModuleTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend every fetch for `latency` before running the module body
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register the body executed when `path` is fetched
    pub fn insert<F>(&self, path: impl Into<String>, body: F) -> &Self
    where
        F: Fn(&Loader) -> anyhow::Result<Option<Exports>> + Send + Sync + 'static,
    {
        self.bodies.write().insert(path.into(), Arc::new(body));
        self
    }

    /// Register a module that exports `exports` without side effects
    pub fn insert_exports(&self, path: impl Into<String>, exports: Exports) -> &Self {
        self.insert(path, move |_| Ok(Some(exports.clone())))
    }

    /// How many times `path` was fetched
    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetches.lock().get(path).copied().unwrap_or(0)
    }

    /// Fetches across all paths
    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().values().sum()
    }
}

#[async_trait]
impl Platform for ModuleTable {
    async fn fetch(&self, loader: &Loader, _id: &str, path: &str) -> anyhow::Result<Option<Exports>> {
        *self.fetches.lock().entry(path.to_owned()).or_default() += 1;

        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }

        let body = self
            .bodies
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("Module not found: {}", path))?;
        body(loader)
    }
}
