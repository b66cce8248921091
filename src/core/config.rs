//! Configuration: JSON file + env var overrides + built-in defaults.
//!
//! Loading never fails. A missing file yields defaults, a corrupt file yields
//! defaults with a warning, and each recognized key is type-checked on its own
//! so one bad value does not discard the rest. Unknown keys are ignored.

#![allow(missing_docs)]

use std::env;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::{Result, WtdError};
use crate::core::paths::is_plain_file_name;

pub const APP_NAME: &str = "WakeTheDrive";
pub const DEFAULT_INTERVAL_SECS: u64 = 1;
pub const HEARTBEAT_FILENAME: &str = "WakeTheDrive.heartbeat.txt";
pub const CONFIG_FILENAME: &str = "WakeTheDrive.config.json";

const ENV_INTERVAL: &str = "WTD_INTERVAL_SECONDS";
const ENV_HEARTBEAT_FILENAME: &str = "WTD_HEARTBEAT_FILENAME";

/// Persisted WakeTheDrive settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between pulses. Always >= 1.
    pub interval_seconds: u64,
    /// Heartbeat file name, created inside the target directory.
    pub heartbeat_filename: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECS,
            heartbeat_filename: HEARTBEAT_FILENAME.to_string(),
        }
    }
}

impl Config {
    /// Load the config at `path`, falling back to defaults on any failure.
    ///
    /// Env overrides are applied on top. Problems are reported as
    /// `[WTD-CONFIG]` warnings on stderr.
    pub fn load(path: &Path) -> Self {
        let mut cfg = match Self::try_load(path) {
            Ok((cfg, warnings)) => {
                for warning in warnings {
                    eprintln!("[WTD-CONFIG] {}: {warning}", path.display());
                }
                cfg
            }
            Err(WtdError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(err) => {
                eprintln!(
                    "[WTD-CONFIG] warning: could not read config file '{}', using defaults: {err}",
                    path.display()
                );
                Self::default()
            }
        };
        for warning in cfg.apply_env_overrides_from(|name| env::var(name).ok()) {
            eprintln!("[WTD-CONFIG] {warning}");
        }
        cfg
    }

    /// Create the config file with defaults when it does not exist, then load it.
    pub fn ensure(path: &Path) -> Self {
        if !path.exists() {
            match Self::default().save(path) {
                Ok(()) => eprintln!("[WTD-CONFIG] created default config: {}", path.display()),
                Err(err) => eprintln!(
                    "[WTD-CONFIG] warning: could not write default config '{}': {err}",
                    path.display()
                ),
            }
        }
        Self::load(path)
    }

    /// Read and parse `path` strictly. Returns the config plus per-key warnings.
    pub fn try_load(path: &Path) -> Result<(Self, Vec<String>)> {
        let raw = fs::read_to_string(path).map_err(|source| WtdError::io(path, source))?;
        Self::from_json_str(&raw)
    }

    /// Parse config JSON. Only a malformed document or a non-object top level
    /// is an error; bad individual values fall back to their defaults.
    pub fn from_json_str(raw: &str) -> Result<(Self, Vec<String>)> {
        let doc: Value = serde_json::from_str(raw).map_err(|err| WtdError::ConfigParse {
            context: "json",
            details: err.to_string(),
        })?;
        let Value::Object(map) = doc else {
            return Err(WtdError::ConfigParse {
                context: "json",
                details: "top-level value must be an object".to_string(),
            });
        };

        let mut cfg = Self::default();
        let mut warnings = Vec::new();

        if let Some(value) = map.get("interval_seconds") {
            match value.as_u64().filter(|secs| *secs > 0) {
                Some(secs) => cfg.interval_seconds = secs,
                None => warnings.push(format!(
                    "interval_seconds must be a positive integer, got {value}; using {DEFAULT_INTERVAL_SECS}"
                )),
            }
        }

        if let Some(value) = map.get("heartbeat_filename") {
            match value.as_str().filter(|name| is_plain_file_name(name)) {
                Some(name) => cfg.heartbeat_filename = name.to_string(),
                None => warnings.push(format!(
                    "heartbeat_filename must be a non-empty file name, got {value}; using {HEARTBEAT_FILENAME}"
                )),
            }
        }

        Ok((cfg, warnings))
    }

    /// Write the config as pretty JSON: temp file, fsync, rename over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| WtdError::io(parent, source))?;
        }

        let tmp_path = path.with_extension("json.tmp");
        let result = (|| -> io::Result<()> {
            {
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&tmp_path)?;
                file.write_all(json.as_bytes())?;
                file.sync_all()?;
            }
            fs::rename(&tmp_path, path)
        })();

        if let Err(source) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(WtdError::io(path, source));
        }
        Ok(())
    }

    /// Check the invariants the pulse loop relies on.
    pub fn validate(&self) -> Result<()> {
        if self.interval_seconds == 0 {
            return Err(WtdError::InvalidConfig {
                details: "interval_seconds must be >= 1".to_string(),
            });
        }
        if !is_plain_file_name(&self.heartbeat_filename) {
            return Err(WtdError::InvalidConfig {
                details: format!(
                    "heartbeat_filename must be a plain file name, got {:?}",
                    self.heartbeat_filename
                ),
            });
        }
        Ok(())
    }

    /// Apply `WTD_*` overrides using `lookup`. Invalid values are skipped and
    /// returned as warnings.
    pub fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Vec<String>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        let mut get = |name: &str| lookup(name).filter(|raw| !raw.trim().is_empty());

        if let Some(raw) = get(ENV_INTERVAL) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.interval_seconds = secs,
                Ok(_) => warnings.push(format!("ignoring {ENV_INTERVAL}={raw:?}: must be >= 1")),
                Err(err) => warnings.push(format!("ignoring {ENV_INTERVAL}={raw:?}: {err}")),
            }
        }

        if let Some(raw) = get(ENV_HEARTBEAT_FILENAME) {
            if is_plain_file_name(&raw) {
                self.heartbeat_filename = raw;
            } else {
                warnings.push(format!(
                    "ignoring {ENV_HEARTBEAT_FILENAME}={raw:?}: not a plain file name"
                ));
            }
        }

        warnings
    }
}
