//! WTD-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, WtdError>;

/// Which step of a pulse failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseStage {
    /// Opening (create + truncate) the heartbeat file.
    Open,
    /// Writing the payload.
    Write,
    /// Ordinary userspace flush of the handle.
    Flush,
    /// Durable sync to the device.
    Sync,
}

impl PulseStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Write => "write",
            Self::Flush => "flush",
            Self::Sync => "sync",
        }
    }
}

impl fmt::Display for PulseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for WakeTheDrive.
#[derive(Debug, Error)]
pub enum WtdError {
    #[error("[WTD-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[WTD-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[WTD-2001] pulse failed at {stage} for {path}: {source}")]
    Pulse {
        stage: PulseStage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[WTD-2002] {primitive} failed: {source}")]
    Flush {
        primitive: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("[WTD-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[WTD-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[WTD-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl WtdError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "WTD-1001",
            Self::ConfigParse { .. } => "WTD-1003",
            Self::Pulse { .. } => "WTD-2001",
            Self::Flush { .. } => "WTD-2002",
            Self::Serialization { .. } => "WTD-2101",
            Self::Io { .. } => "WTD-3002",
            Self::Runtime { .. } => "WTD-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// A failed pulse is always worth retrying on the next tick.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Pulse { .. }
                | Self::Flush { .. }
                | Self::Io { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for a failed pulse stage.
    #[must_use]
    pub fn pulse(stage: PulseStage, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Pulse {
            stage,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// The pulse stage that failed, if this is a pulse error.
    #[must_use]
    pub const fn pulse_stage(&self) -> Option<PulseStage> {
        match self {
            Self::Pulse { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for WtdError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn other(msg: &str) -> std::io::Error {
        std::io::Error::other(msg.to_string())
    }

    #[test]
    fn error_codes_are_unique() {
        let errors: Vec<WtdError> = vec![
            WtdError::InvalidConfig {
                details: String::new(),
            },
            WtdError::ConfigParse {
                context: "",
                details: String::new(),
            },
            WtdError::pulse(PulseStage::Open, "", other("test")),
            WtdError::Flush {
                primitive: "fsync",
                source: other("test"),
            },
            WtdError::Serialization {
                context: "",
                details: String::new(),
            },
            WtdError::io("", other("test")),
            WtdError::Runtime {
                details: String::new(),
            },
        ];

        let codes: Vec<&str> = errors.iter().map(WtdError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
        for code in codes {
            assert!(code.starts_with("WTD-"), "code {code} must start with WTD-");
        }
    }

    #[test]
    fn pulse_error_display_names_stage_and_path() {
        let err = WtdError::pulse(
            PulseStage::Sync,
            "/mnt/usb/WakeTheDrive.heartbeat.txt",
            other("device gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("WTD-2001"), "missing code: {msg}");
        assert!(msg.contains("at sync"), "missing stage: {msg}");
        assert!(msg.contains("/mnt/usb"), "missing path: {msg}");
        assert!(msg.contains("device gone"), "missing cause: {msg}");
        assert_eq!(err.pulse_stage(), Some(PulseStage::Sync));
    }

    #[test]
    fn retryable_errors_are_correct() {
        assert!(WtdError::pulse(PulseStage::Write, "", other("x")).is_retryable());
        assert!(
            WtdError::Flush {
                primitive: "F_FULLFSYNC",
                source: other("x"),
            }
            .is_retryable()
        );

        assert!(
            !WtdError::InvalidConfig {
                details: String::new()
            }
            .is_retryable()
        );
        assert!(
            !WtdError::ConfigParse {
                context: "json",
                details: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn io_convenience_constructor() {
        let err = WtdError::io(
            "/tmp/test.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "WTD-3002");
        assert!(err.to_string().contains("/tmp/test.txt"));
        assert_eq!(err.pulse_stage(), None);
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: WtdError = json_err.into();
        assert_eq!(err.code(), "WTD-2101");
    }
}
