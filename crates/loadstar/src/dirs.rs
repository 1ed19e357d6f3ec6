//! Locations of the configuration files merged by [`crate::config::Config::load`].

use std::env;
use std::path::{Path, PathBuf};

use etcetera::BaseStrategy;

const CONFIG_DIR: &str = "loadstar";

/// File name of every config layer
pub const CONFIG_FILE: &str = "loadstar.toml";

/// `loadstar.toml` inside the user configuration directory.
///
/// The directory follows the platform convention: `XDG_CONFIG_HOME` or
/// `~/.config` on Linux and macOS, the roaming AppData folder on Windows.
pub fn user_config_file() -> Option<PathBuf> {
    let strategy = etcetera::choose_base_strategy().ok()?;
    Some(strategy.config_dir().join(CONFIG_DIR).join(CONFIG_FILE))
}

/// `loadstar.toml` in the given project directory
pub fn project_config_file(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Candidate system configuration files, most specific first
#[cfg(not(windows))]
fn system_config_candidates(xdg_config_dirs: Option<&str>) -> Vec<PathBuf> {
    let dirs = xdg_config_dirs
        .filter(|dirs| !dirs.is_empty())
        .unwrap_or("/etc/xdg");
    dirs.split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(CONFIG_DIR).join(CONFIG_FILE))
        .chain(std::iter::once(
            Path::new("/etc").join(CONFIG_DIR).join(CONFIG_FILE),
        ))
        .collect()
}

#[cfg(windows)]
fn system_config_candidates(system_drive: Option<&str>) -> Vec<PathBuf> {
    system_drive
        .map(|drive| {
            Path::new(drive)
                .join("ProgramData")
                .join(CONFIG_DIR)
                .join(CONFIG_FILE)
        })
        .into_iter()
        .collect()
}

/// The first existing system configuration file.
///
/// Searches `XDG_CONFIG_DIRS` (default `/etc/xdg`) and then `/etc` on
/// Unix-like systems, `%SYSTEMDRIVE%\ProgramData` on Windows.
pub fn system_config_file() -> Option<PathBuf> {
    #[cfg(windows)]
    let hint = env::var("SYSTEMDRIVE").ok();
    #[cfg(not(windows))]
    let hint = env::var("XDG_CONFIG_DIRS").ok();

    system_config_candidates(hint.as_deref())
        .into_iter()
        .find(|candidate| match candidate.try_exists() {
            Ok(exists) => exists && candidate.is_file(),
            Err(err) => {
                log::warn!("Failed to query system configuration file {candidate:?}: {err}");
                false
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(windows))]
    fn test_system_config_candidates() {
        let etc = Path::new("/etc/loadstar/loadstar.toml").to_path_buf();

        assert_eq!(
            system_config_candidates(None),
            vec![Path::new("/etc/xdg/loadstar/loadstar.toml").to_path_buf(), etc.clone()]
        );
        assert_eq!(
            system_config_candidates(Some("")),
            system_config_candidates(None)
        );
        assert_eq!(system_config_candidates(Some(":")), vec![etc.clone()]);
        assert_eq!(
            system_config_candidates(Some("/opt/a:/opt/b")),
            vec![
                Path::new("/opt/a/loadstar/loadstar.toml").to_path_buf(),
                Path::new("/opt/b/loadstar/loadstar.toml").to_path_buf(),
                etc,
            ]
        );
    }

    #[test]
    fn test_project_and_user_files() {
        assert_eq!(
            project_config_file(Path::new("demo")),
            Path::new("demo").join("loadstar.toml")
        );
        if let Some(path) = user_config_file() {
            assert!(path.ends_with("loadstar/loadstar.toml"));
        }
    }
}
