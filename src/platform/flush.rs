//! Durable flush primitives: push written bytes past the OS cache to the device.
//!
//! `fsync` on macOS only hands data to the drive's volatile write cache, so the
//! Apple implementation issues `F_FULLFSYNC` first and drops back to `fsync`
//! on filesystems that reject it (SMB, some FAT/exFAT drivers). Everywhere else
//! `File::sync_all` already maps to the strongest primitive available
//! (`fsync` on Linux, `FlushFileBuffers` on Windows).

use std::fs::File;
use std::sync::Arc;

use crate::core::errors::{Result, WtdError};

/// Forces data already written to an open handle onto physical media.
pub trait PlatformFlush: Send + Sync {
    /// Short name of the primitive, for logs.
    fn name(&self) -> &'static str;

    /// Block until the handle's data is durable.
    fn flush(&self, file: &File) -> Result<()>;
}

/// Ordinary file sync via `File::sync_all`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncAllFlush;

impl PlatformFlush for SyncAllFlush {
    fn name(&self) -> &'static str {
        if cfg!(windows) {
            "FlushFileBuffers"
        } else {
            "fsync"
        }
    }

    fn flush(&self, file: &File) -> Result<()> {
        file.sync_all().map_err(|source| WtdError::Flush {
            primitive: self.name(),
            source,
        })
    }
}

/// `F_FULLFSYNC` with an `fsync` fallback.
#[cfg(target_os = "macos")]
#[derive(Debug, Default)]
pub struct FullSyncFlush {
    fallback_reported: std::sync::atomic::AtomicBool,
}

#[cfg(target_os = "macos")]
impl PlatformFlush for FullSyncFlush {
    fn name(&self) -> &'static str {
        "F_FULLFSYNC"
    }

    fn flush(&self, file: &File) -> Result<()> {
        use std::os::fd::AsRawFd;
        use std::sync::atomic::Ordering;

        use nix::fcntl::{FcntlArg, fcntl};

        let fd = file.as_raw_fd();
        match fcntl(fd, FcntlArg::F_FULLFSYNC) {
            Ok(_) => Ok(()),
            Err(errno) => {
                if !self.fallback_reported.swap(true, Ordering::Relaxed) {
                    eprintln!("[WTD-PULSE] F_FULLFSYNC unavailable ({errno}), falling back to fsync");
                }
                nix::unistd::fsync(fd).map_err(|errno| WtdError::Flush {
                    primitive: "fsync",
                    source: errno.into(),
                })
            }
        }
    }
}

/// Pick the strongest flush primitive for the host platform.
pub fn detect_flush() -> Arc<dyn PlatformFlush> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(FullSyncFlush::default())
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(SyncAllFlush)
    }
}
