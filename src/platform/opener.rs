//! Hand a file or folder to the OS default handler (Explorer, Finder, xdg-open).

use std::path::Path;
use std::process::{Command, Stdio};

use crate::core::errors::{Result, WtdError};

/// Opens paths with whatever the desktop associates with them.
pub trait FileOpener: Send + Sync {
    /// Launch the handler for `path`. Does not wait for it to exit.
    fn open(&self, path: &Path) -> Result<()>;
}

/// Shells out to the platform launcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl SystemOpener {
    /// Launcher program for the host platform.
    #[must_use]
    pub const fn launcher() -> &'static str {
        if cfg!(windows) {
            "explorer"
        } else if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        }
    }
}

impl FileOpener for SystemOpener {
    fn open(&self, path: &Path) -> Result<()> {
        Command::new(Self::launcher())
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(drop)
            .map_err(|source| WtdError::io(path, source))
    }
}

/// Open `path`, logging instead of failing. Returns whether the launch worked.
pub fn open_best_effort(opener: &dyn FileOpener, path: &Path) -> bool {
    match opener.open(path) {
        Ok(()) => true,
        Err(err) => {
            eprintln!("[WTD-OPEN] warning: could not open {}: {err}", path.display());
            false
        }
    }
}
