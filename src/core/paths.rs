//! Target-directory layout: where the heartbeat and config files live.

use std::env;
use std::path::{Component, Path, PathBuf};

use crate::core::config::CONFIG_FILENAME;

/// Resolved locations for one run of the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Directory on the drive being kept awake.
    pub target_dir: PathBuf,
    /// JSON config file.
    pub config_file: PathBuf,
}

impl AppPaths {
    /// Build paths rooted at `target_dir`, with an optional explicit config path.
    #[must_use]
    pub fn new(target_dir: &Path, config_override: Option<&Path>) -> Self {
        let target_dir = resolve_absolute_path(target_dir);
        let config_file = config_override.map_or_else(
            || target_dir.join(CONFIG_FILENAME),
            resolve_absolute_path,
        );
        Self {
            target_dir,
            config_file,
        }
    }

    /// Heartbeat file path for the given file name.
    #[must_use]
    pub fn heartbeat_file(&self, file_name: &str) -> PathBuf {
        self.target_dir.join(file_name)
    }
}

/// The directory containing the running executable.
///
/// The drive to keep awake is the one the tool was launched from, so this is
/// the default target. Falls back to the current directory.
pub fn default_target_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// True when `name` is a single normal path component (no separators, no `..`).
#[must_use]
pub fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components.
///
/// If it fails (e.g. path does not exist), the path is made absolute relative
/// to CWD and `..`/`.` components are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return strip_verbatim_prefix(canonical);
    }

    normalize_syntactic(&absolute)
}

// `canonicalize` on Windows yields `\\?\C:\...`, which `explorer` and most
// shell handlers refuse.
#[cfg(windows)]
fn strip_verbatim_prefix(path: PathBuf) -> PathBuf {
    let stripped = path
        .to_str()
        .and_then(|raw| raw.strip_prefix(r"\\?\"))
        .filter(|rest| !rest.starts_with("UNC"))
        .map(PathBuf::from);
    stripped.unwrap_or(path)
}

#[cfg(not(windows))]
fn strip_verbatim_prefix(path: PathBuf) -> PathBuf {
    path
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
