//! Hierarchical `loadstar.toml` configuration.

use anyhow::{Context, Result, bail};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::combine::Combine;
use crate::dirs::{project_config_file, system_config_file, user_config_file};

/// Dependency declarations for one module read from disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleManifest {
    /// Ids required, in order, before the module counts as initialized
    pub requires: Vec<String>,

    /// Ids the module references without needing them loaded first
    pub symbols: Vec<String>,

    /// Whether the bundle's aggregate init awaits this module
    pub init: bool,
}

/// Settings for the CLI: where modules live and how bundles are built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory module files are read from
    pub root: PathBuf,

    /// Prepended to module ids when bundling
    pub prefix: String,

    /// Text placed at the top of generated bundles
    pub header: String,

    /// Module ids left out of generated bundles
    pub exclude: IndexSet<String>,

    /// Id prefix to path prefix mapping
    pub prefixes: IndexMap<String, String>,

    /// Per-module dependency declarations
    pub modules: IndexMap<String, ModuleManifest>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            prefix: "./".to_owned(),
            header: String::new(),
            exclude: IndexSet::new(),
            prefixes: IndexMap::new(),
            modules: IndexMap::new(),
        }
    }
}

/// `value` unless it still holds the default, in which case `fallback`
fn prefer<T: PartialEq>(value: T, fallback: T, default: &T) -> T {
    if value == *default { fallback } else { value }
}

impl Combine for Config {
    fn combine(self, other: Self) -> Self {
        let defaults = Config::default();
        Self {
            root: prefer(self.root, other.root, &defaults.root),
            prefix: prefer(self.prefix, other.prefix, &defaults.prefix),
            header: prefer(self.header, other.header, &defaults.header),
            exclude: self.exclude.combine(other.exclude),
            prefixes: self.prefixes.combine(other.prefixes),
            modules: self.modules.combine(other.modules),
        }
    }
}

/// Configuration values from environment variables with LOADSTAR_ prefix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    /// `LOADSTAR_ROOT`
    pub root: Option<PathBuf>,
    /// `LOADSTAR_PREFIX`
    pub prefix: Option<String>,
    /// `LOADSTAR_HEADER`
    pub header: Option<String>,
    /// `LOADSTAR_EXCLUDE`
    pub exclude: Option<IndexSet<String>>,
}

impl EnvConfig {
    /// Read every `LOADSTAR_*` variable that is set
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(root) = env::var("LOADSTAR_ROOT") {
            if !root.trim().is_empty() {
                config.root = Some(PathBuf::from(root.trim()));
            }
        }

        if let Ok(prefix) = env::var("LOADSTAR_PREFIX") {
            config.prefix = Some(prefix);
        }

        if let Ok(header) = env::var("LOADSTAR_HEADER") {
            config.header = Some(header);
        }

        // Comma-separated list of module ids
        if let Ok(exclude) = env::var("LOADSTAR_EXCLUDE") {
            let ids: IndexSet<String> = exclude
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
                .collect();
            if !ids.is_empty() {
                config.exclude = Some(ids);
            }
        }

        config
    }

    /// Override the values of `config` with the ones set here
    pub fn apply_to(self, mut config: Config) -> Config {
        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(prefix) = self.prefix {
            config.prefix = prefix;
        }
        if let Some(header) = self.header {
            config.header = header;
        }
        if let Some(exclude) = self.exclude {
            config.exclude = exclude;
        }
        config
    }
}

impl Config {
    /// Reject declarations that name an empty module id
    pub fn validate(&self) -> Result<()> {
        if self.exclude.iter().any(|id| id.is_empty()) {
            bail!("Empty module id in exclude");
        }
        for (id, manifest) in &self.modules {
            if id.is_empty() {
                bail!("Empty module id in [modules]");
            }
            if manifest.requires.iter().any(String::is_empty) {
                bail!("Empty module id in requires of module '{}'", id);
            }
            if manifest.symbols.iter().any(String::is_empty) {
                bail!("Empty module id in symbols of module '{}'", id);
            }
        }
        Ok(())
    }

    /// Read, parse and validate one config file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        Ok(config)
    }

    fn try_load_and_combine(config: &mut Config, path: &Path, context: &str) -> Result<()> {
        if path.exists() {
            log::debug!("Loading {} from: {:?}", context, path);
            let loaded = Self::load_from_file(path)
                .with_context(|| format!("Failed to load {} from {:?}", context, path))?;
            *config = loaded.combine(std::mem::take(config));
        }
        Ok(())
    }

    /// Load configuration with hierarchical precedence, highest first:
    /// 1. CLI-provided config path
    /// 2. Environment variables (LOADSTAR_*)
    /// 3. Project config (loadstar.toml in the current directory)
    /// 4. User config (e.g. ~/.config/loadstar/loadstar.toml)
    /// 5. System config (e.g. /etc/xdg/loadstar/loadstar.toml)
    /// 6. Default values
    pub fn load(cli_config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = system_config_file() {
            Self::try_load_and_combine(&mut config, &path, "system config")?;
        }

        if let Some(path) = user_config_file() {
            Self::try_load_and_combine(&mut config, &path, "user config")?;
        }

        let project = project_config_file(&env::current_dir().context("Failed to get current directory")?);
        Self::try_load_and_combine(&mut config, &project, "project config")?;

        config = EnvConfig::from_env().apply_to(config);

        if let Some(path) = cli_config_path {
            Self::try_load_and_combine(&mut config, path, "CLI config")?;
        }

        config.validate().context("Invalid final configuration")?;
        Ok(config)
    }
}
