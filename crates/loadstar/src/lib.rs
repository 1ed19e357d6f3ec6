//! Asynchronous module loader with a dependency graph, an override chain
//! and a single-file bundler.

pub mod bundler;
pub mod combine;
pub mod config;
pub mod context;
pub mod dirs;
pub mod error;
pub mod exports;
pub mod graph;
pub mod layer;
pub mod loader;
pub mod platform;
pub mod prefix;

pub use bundler::{BundleOptions, Bundler};
pub use config::Config;
pub use error::LoaderError;
pub use exports::Exports;
pub use graph::{Dependency, Module};
pub use layer::{Layer, Next};
pub use loader::{Loader, Symbol};
pub use platform::{FsPlatform, ModuleTable, Platform};
pub use prefix::PrefixLayer;
