//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use wake_the_drive::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{PulseStage, Result, WtdError};
pub use crate::core::paths::AppPaths;

// Platform
pub use crate::platform::flush::{PlatformFlush, detect_flush};
pub use crate::platform::opener::{FileOpener, SystemOpener};
pub use crate::platform::sleep_guard::{SleepGuard, detect_sleep_guard};
pub use crate::platform::volume::{TargetVolume, probe_target_volume};

// Pulse loop
pub use crate::daemon::pulse_loop::{LoopConfig, PulseHandle, PulseLoop, StopSignal};
pub use crate::daemon::status::{LoopPhase, PulseSnapshot, StatusSink, StatusUpdate};
pub use crate::heartbeat::writer::HeartbeatWriter;

// Logging
pub use crate::logger::activity::{ActivityLoggerHandle, spawn_logger};
pub use crate::logger::jsonl::JsonlConfig;
