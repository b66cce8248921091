//! System sleep inhibition.
//!
//! `set(true)` asks the OS to keep the machine awake until `set(false)`. Both
//! directions are best-effort: failures are logged and never reach the caller.
//!
//! - Windows: `SetThreadExecutionState`. The request belongs to the calling
//!   thread, so arm and disarm must happen on the same thread.
//! - macOS: a `caffeinate -i -w <pid>` child. `-w` ties the assertion to this
//!   process, so the OS drops it even if we die without cleaning up.
//! - Elsewhere: no-op.

#![allow(missing_docs)]

use std::sync::Arc;

/// Process-wide "keep the system awake" switch.
pub trait SleepGuard: Send + Sync {
    fn name(&self) -> &'static str;

    /// Arm (`true`) or release (`false`). Idempotent in both directions.
    fn set(&self, active: bool);
}

/// Guard for platforms without a sleep-inhibit API.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSleepGuard;

impl SleepGuard for NoopSleepGuard {
    fn name(&self) -> &'static str {
        "none"
    }

    fn set(&self, _active: bool) {}
}

#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutionStateGuard;

#[cfg(windows)]
impl SleepGuard for ExecutionStateGuard {
    fn name(&self) -> &'static str {
        "SetThreadExecutionState"
    }

    #[allow(unsafe_code)]
    fn set(&self, active: bool) {
        use windows_sys::Win32::System::Power::{
            ES_CONTINUOUS, ES_SYSTEM_REQUIRED, SetThreadExecutionState,
        };

        let flags = if active {
            ES_CONTINUOUS | ES_SYSTEM_REQUIRED
        } else {
            ES_CONTINUOUS
        };
        // SAFETY: takes a flag word by value and touches no caller memory.
        let previous = unsafe { SetThreadExecutionState(flags) };
        if previous == 0 {
            eprintln!("[WTD-SLEEP] SetThreadExecutionState({flags:#x}) failed");
        }
    }
}

#[cfg(target_os = "macos")]
#[derive(Debug, Default)]
pub struct CaffeinateGuard {
    child: parking_lot::Mutex<Option<std::process::Child>>,
}

#[cfg(target_os = "macos")]
impl SleepGuard for CaffeinateGuard {
    fn name(&self) -> &'static str {
        "caffeinate"
    }

    fn set(&self, active: bool) {
        use std::process::{Command, Stdio};

        let mut slot = self.child.lock();
        if active {
            if let Some(child) = slot.as_mut()
                && matches!(child.try_wait(), Ok(None))
            {
                return;
            }
            let pid = std::process::id().to_string();
            match Command::new("caffeinate")
                .args(["-i", "-w", &pid])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
            {
                Ok(child) => *slot = Some(child),
                Err(err) => eprintln!("[WTD-SLEEP] failed to start caffeinate: {err}"),
            }
        } else if let Some(mut child) = slot.take() {
            if let Err(err) = child.kill() {
                // Already exited is fine.
                if err.kind() != std::io::ErrorKind::InvalidInput {
                    eprintln!("[WTD-SLEEP] failed to stop caffeinate: {err}");
                }
            }
            if let Err(err) = child.wait() {
                eprintln!("[WTD-SLEEP] failed to reap caffeinate: {err}");
            }
        }
    }
}

#[cfg(target_os = "macos")]
impl Drop for CaffeinateGuard {
    fn drop(&mut self) {
        self.set(false);
    }
}

/// Pick the sleep guard for the host platform.
pub fn detect_sleep_guard() -> Arc<dyn SleepGuard> {
    #[cfg(windows)]
    {
        Arc::new(ExecutionStateGuard)
    }
    #[cfg(target_os = "macos")]
    {
        Arc::new(CaffeinateGuard::default())
    }
    #[cfg(not(any(windows, target_os = "macos")))]
    {
        Arc::new(NoopSleepGuard)
    }
}
