//! Fetch collaborators: where module exports actually come from.

mod fs;
mod table;

pub use fs::{FsPlatform, SourceModule};
pub use table::{ModuleBody, ModuleTable};

use async_trait::async_trait;

use crate::exports::Exports;
use crate::loader::Loader;

/// Executes a module and hands back its exports.
///
/// Called with the module on top of the resolution context, so `symbol` and
/// `require` calls made through `loader` are attributed to it. Returning
/// `Ok(None)` means the module ran but exported nothing.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Run the module `id` found at `path`
    async fn fetch(&self, loader: &Loader, id: &str, path: &str) -> anyhow::Result<Option<Exports>>;
}
