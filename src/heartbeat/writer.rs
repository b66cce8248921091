//! One pulse: overwrite the heartbeat file and force it to the device.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::core::errors::{PulseStage, Result, WtdError};
use crate::platform::flush::{PlatformFlush, detect_flush};

/// `strftime` layout of the payload timestamp.
pub const PAYLOAD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Writes the heartbeat file at a fixed path.
///
/// The file must stay a plain file. On Windows a create-and-truncate open
/// fails with access denied once the file is hidden, so no attributes are set.
pub struct HeartbeatWriter {
    path: PathBuf,
    flusher: Arc<dyn PlatformFlush>,
}

impl HeartbeatWriter {
    /// Writer using the host's strongest flush primitive.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_flusher(path, detect_flush())
    }

    pub fn with_flusher(path: impl Into<PathBuf>, flusher: Arc<dyn PlatformFlush>) -> Self {
        Self {
            path: path.into(),
            flusher,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush_primitive(&self) -> &'static str {
        self.flusher.name()
    }

    /// Overwrite the file with a payload stamped `at`, then make it durable.
    ///
    /// Returns `at` on success. The handle is closed on every path out.
    pub fn pulse(&self, at: DateTime<Local>) -> Result<DateTime<Local>> {
        let mut file = self.open().map_err(|e| self.failed(PulseStage::Open, e))?;
        file.write_all(format_payload(at).as_bytes())
            .map_err(|e| self.failed(PulseStage::Write, e))?;
        file.flush().map_err(|e| self.failed(PulseStage::Flush, e))?;
        self.flusher.flush(&file).map_err(|err| match err {
            WtdError::Flush { source, .. } => self.failed(PulseStage::Sync, source),
            other => other,
        })?;
        Ok(at)
    }

    /// Delete the heartbeat file. `Ok(false)` when it was already gone.
    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(WtdError::io(&self.path, source)),
        }
    }

    fn open(&self) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
    }

    fn failed(&self, stage: PulseStage, source: io::Error) -> WtdError {
        WtdError::pulse(stage, &self.path, source)
    }
}

impl std::fmt::Debug for HeartbeatWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatWriter")
            .field("path", &self.path)
            .field("flusher", &self.flusher.name())
            .finish()
    }
}

/// `Last pulse: 2024-05-01 13:45:09.123\n`
#[must_use]
pub fn format_payload(at: DateTime<Local>) -> String {
    format!("Last pulse: {}\n", at.format(PAYLOAD_TIME_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct FailingFlush;

    impl PlatformFlush for FailingFlush {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn flush(&self, _file: &File) -> Result<()> {
            Err(WtdError::Flush {
                primitive: "failing",
                source: io::Error::other("simulated media error"),
            })
        }
    }

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 13, 45, 9).unwrap()
            + chrono::Duration::milliseconds(123)
    }

    #[test]
    fn payload_format_is_stable() {
        assert_eq!(
            format_payload(fixed_time()),
            "Last pulse: 2024-05-01 13:45:09.123\n"
        );
    }

    #[test]
    fn pulse_creates_file_with_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hb.txt");
        let writer = HeartbeatWriter::new(&path);

        let at = fixed_time();
        assert_eq!(writer.pulse(at).unwrap(), at);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), format_payload(at));
    }

    #[test]
    fn pulse_truncates_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hb.txt");
        std::fs::write(&path, "x".repeat(500)).unwrap();

        let writer = HeartbeatWriter::new(&path);
        writer.pulse(fixed_time()).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format_payload(fixed_time())
        );
    }

    #[test]
    fn missing_directory_fails_at_open_stage() {
        let dir = tempfile::tempdir().unwrap();
        let writer = HeartbeatWriter::new(dir.path().join("gone").join("hb.txt"));
        let err = writer.pulse(fixed_time()).unwrap_err();
        assert_eq!(err.pulse_stage(), Some(PulseStage::Open));
        assert!(err.is_retryable());
    }

    #[test]
    fn flush_failure_maps_to_sync_stage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hb.txt");
        let writer = HeartbeatWriter::with_flusher(&path, Arc::new(FailingFlush));
        let err = writer.pulse(fixed_time()).unwrap_err();
        assert_eq!(err.pulse_stage(), Some(PulseStage::Sync));
        assert_eq!(err.code(), "WTD-2001");
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hb.txt");
        let writer = HeartbeatWriter::new(&path);
        writer.pulse(fixed_time()).unwrap();

        assert!(writer.remove().unwrap());
        assert!(!path.exists());
        assert!(!writer.remove().unwrap());
    }

    #[test]
    fn pulse_recreates_externally_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hb.txt");
        let writer = HeartbeatWriter::new(&path);
        writer.pulse(fixed_time()).unwrap();
        std::fs::remove_file(&path).unwrap();
        writer.pulse(fixed_time()).unwrap();
        assert!(path.exists());
    }
}
