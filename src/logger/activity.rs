//! Activity logger thread.
//!
//! A dedicated thread owns the [`JsonlWriter`]. The pulse loop sends
//! [`ActivityEvent`]s over a bounded crossbeam channel with `try_send`, so a
//! slow or broken log never delays a pulse.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{Result, WtdError};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum ActivityEvent {
    LoopStarted {
        path: String,
        interval_secs: u64,
        version: String,
    },
    PulseWritten {
        path: String,
        duration_ms: u64,
    },
    PulseFailed {
        path: String,
        stage: Option<String>,
        error_code: String,
        error_message: String,
    },
    CleanupFailed {
        path: String,
        error_code: String,
        error_message: String,
    },
    LoopStopped {
        path: String,
        pulses_ok: u64,
        pulses_failed: u64,
    },
    ConfigLoaded {
        path: String,
        details: String,
    },
    /// Flush and stop the logger thread.
    Shutdown,
}

impl ActivityEvent {
    /// Failed pulse built from the error that caused it.
    pub fn pulse_failed(path: &std::path::Path, err: &WtdError) -> Self {
        Self::PulseFailed {
            path: path.display().to_string(),
            stage: err.pulse_stage().map(|stage| stage.as_str().to_string()),
            error_code: err.code().to_string(),
            error_message: err.to_string(),
        }
    }

    /// Failed heartbeat removal built from its error.
    pub fn cleanup_failed(path: &std::path::Path, err: &WtdError) -> Self {
        Self::CleanupFailed {
            path: path.display().to_string(),
            error_code: err.code().to_string(),
            error_message: err.to_string(),
        }
    }
}

/// Cloneable sender side. A disabled handle accepts and drops everything.
#[derive(Clone, Default)]
pub struct ActivityLoggerHandle {
    tx: Option<Sender<ActivityEvent>>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Handle with no logger behind it.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Queue an event without blocking. A full queue drops it and counts the drop.
    pub fn send(&self, event: ActivityEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(TrySendError::Full(_)) = tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Blocks only until the request is queued.
    pub fn shutdown(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ActivityEvent::Shutdown);
        }
    }
}

/// Start the logger thread writing to `config.path`.
pub fn spawn_logger(config: JsonlConfig) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(CHANNEL_CAPACITY);
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx: Some(tx),
        dropped_events: Arc::clone(&dropped),
    };

    let join = thread::Builder::new()
        .name("wtd-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config, &dropped))
        .map_err(|e| WtdError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config);

    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{lost} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        if let Some(entry) = event_to_log_entry(&event) {
            jsonl.write_entry(&entry);
        }
    }

    jsonl.fsync();
}

fn event_to_log_entry(event: &ActivityEvent) -> Option<LogEntry> {
    let entry = match event {
        ActivityEvent::LoopStarted {
            path,
            interval_secs,
            version,
        } => {
            let mut e = LogEntry::new(EventType::LoopStart, Severity::Info);
            e.path = Some(path.clone());
            e.details = Some(format!("interval={interval_secs}s version={version}"));
            e
        }
        ActivityEvent::PulseWritten { path, duration_ms } => {
            let mut e = LogEntry::new(EventType::Pulse, Severity::Info);
            e.path = Some(path.clone());
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e
        }
        ActivityEvent::PulseFailed {
            path,
            stage,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::PulseFailed, Severity::Warning);
            e.path = Some(path.clone());
            e.stage.clone_from(stage);
            e.ok = Some(false);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::CleanupFailed {
            path,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::CleanupFailed, Severity::Error);
            e.path = Some(path.clone());
            e.ok = Some(false);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::LoopStopped {
            path,
            pulses_ok,
            pulses_failed,
        } => {
            let mut e = LogEntry::new(EventType::LoopStop, Severity::Info);
            e.path = Some(path.clone());
            e.details = Some(format!("pulses_ok={pulses_ok} pulses_failed={pulses_failed}"));
            e
        }
        ActivityEvent::ConfigLoaded { path, details } => {
            let mut e = LogEntry::new(EventType::ConfigLoad, Severity::Info);
            e.path = Some(path.clone());
            e.details = Some(details.clone());
            e
        }
        ActivityEvent::Shutdown => return None,
    };
    Some(entry)
}
