//! Map the heartbeat directory to the volume it keeps awake.
//!
//! Linux reads `/proc/self/mounts` and picks the longest mount-point prefix.
//! Windows reports the drive prefix. Other platforms report the filesystem
//! root with an unknown device.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WtdError};

/// Mount-point metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountPoint {
    pub path: PathBuf,
    pub device: String,
    pub fs_type: String,
    pub is_ram_backed: bool,
}

/// The volume holding the heartbeat file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetVolume {
    pub mount_point: PathBuf,
    pub device: String,
    pub fs_type: String,
    /// Pulsing a RAM-backed filesystem wakes no drive.
    pub is_ram_backed: bool,
}

impl fmt::Display for TargetVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {})",
            self.mount_point.display(),
            self.device,
            self.fs_type
        )
    }
}

impl From<&MountPoint> for TargetVolume {
    fn from(mount: &MountPoint) -> Self {
        Self {
            mount_point: mount.path.clone(),
            device: mount.device.clone(),
            fs_type: mount.fs_type.clone(),
            is_ram_backed: mount.is_ram_backed,
        }
    }
}

/// Find the volume that `path` lives on.
pub fn probe_target_volume(path: &Path) -> Result<TargetVolume> {
    #[cfg(target_os = "linux")]
    {
        let mounts_path = Path::new("/proc/self/mounts");
        let raw = std::fs::read_to_string(mounts_path)
            .map_err(|source| WtdError::io(mounts_path, source))?;
        let mounts = parse_proc_mounts(&raw);
        find_mount(path, &mounts)
            .map(TargetVolume::from)
            .ok_or_else(|| WtdError::Runtime {
                details: format!("could not map {} to a mount point", path.display()),
            })
    }
    #[cfg(not(target_os = "linux"))]
    {
        root_volume(path)
    }
}

#[cfg_attr(target_os = "linux", allow(dead_code))]
fn root_volume(path: &Path) -> Result<TargetVolume> {
    let mut root = PathBuf::new();
    let mut device = String::from("unknown");
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => {
                device = prefix.as_os_str().to_string_lossy().into_owned();
                root.push(prefix.as_os_str());
            }
            Component::RootDir => {
                root.push(component.as_os_str());
                break;
            }
            _ => break,
        }
    }
    if root.as_os_str().is_empty() {
        return Err(WtdError::Runtime {
            details: format!("{} is not an absolute path", path.display()),
        });
    }
    Ok(TargetVolume {
        mount_point: root,
        device,
        fs_type: "unknown".to_string(),
        is_ram_backed: false,
    })
}

fn parse_proc_mounts(raw: &str) -> Vec<MountPoint> {
    let mut mounts = Vec::new();
    for line in raw.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        let fs_type = fields[2].to_string();
        mounts.push(MountPoint {
            path: unescape_mount_path(fields[1]),
            device: fields[0].to_string(),
            is_ram_backed: is_ram_fs(&fs_type),
            fs_type,
        });
    }
    mounts
}

// Later entries shadow earlier ones on the same mount point (overmounts);
// `max_by_key` keeps the last of equal keys.
fn find_mount<'a>(path: &Path, mounts: &'a [MountPoint]) -> Option<&'a MountPoint> {
    mounts
        .iter()
        .filter(|mount| path.starts_with(&mount.path))
        .max_by_key(|mount| mount.path.as_os_str().len())
}

fn is_ram_fs(fs_type: &str) -> bool {
    matches!(
        fs_type.to_ascii_lowercase().as_str(),
        "tmpfs" | "ramfs" | "devtmpfs"
    )
}

/// Decode the kernel's octal escapes (`\040` for space, ...).
fn unescape_mount_path(raw: &str) -> PathBuf {
    let raw_bytes = raw.as_bytes();
    let mut bytes = Vec::with_capacity(raw_bytes.len());
    let mut i = 0;
    while i < raw_bytes.len() {
        if raw_bytes[i] == b'\\' && i + 3 < raw_bytes.len() {
            let digits = &raw_bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0_u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    bytes.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        bytes.push(raw_bytes[i]);
        i += 1;
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_vec(bytes))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}
