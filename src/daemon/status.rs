//! Pulse status as seen from outside the loop.
//!
//! The loop publishes a [`PulseSnapshot`] after every pulse through a
//! [`StatusSink`]. Sinks must not block. The channel sink hands snapshots to
//! the foreground, which renders them on its own thread.

#![allow(missing_docs)]

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde::Serialize;

/// Lifecycle of one loop instance. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        })
    }
}

/// Point-in-time copy of the loop state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PulseSnapshot {
    pub phase: LoopPhase,
    pub heartbeat_path: PathBuf,
    pub interval_seconds: u64,
    /// Time of the last durable pulse.
    pub last_pulse: Option<DateTime<Local>>,
    pub pulses_ok: u64,
    pub pulses_failed: u64,
    pub last_error: Option<String>,
}

impl PulseSnapshot {
    pub fn new(heartbeat_path: PathBuf, interval_seconds: u64) -> Self {
        Self {
            phase: LoopPhase::Created,
            heartbeat_path,
            interval_seconds,
            last_pulse: None,
            pulses_ok: 0,
            pulses_failed: 0,
            last_error: None,
        }
    }

    pub const fn is_running(&self) -> bool {
        matches!(self.phase, LoopPhase::Running)
    }

    /// `HH:MM:SS` of the last pulse, or `Never`.
    pub fn last_pulse_label(&self) -> String {
        self.last_pulse
            .map_or_else(|| "Never".to_string(), |at| at.format("%H:%M:%S").to_string())
    }

    /// One-line summary for a status display.
    pub fn status_line(&self) -> String {
        format!(
            "Last pulse: {} ({} ok, {} failed, every {}s)",
            self.last_pulse_label(),
            self.pulses_ok,
            self.pulses_failed,
            self.interval_seconds
        )
    }
}

/// Receives loop updates. Every method must return promptly.
pub trait StatusSink: Send + Sync {
    fn pulse_recorded(&self, snapshot: &PulseSnapshot);

    fn pulse_failed(&self, _snapshot: &PulseSnapshot) {}

    fn loop_stopped(&self, _snapshot: &PulseSnapshot) {}
}

/// Sink for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn pulse_recorded(&self, _snapshot: &PulseSnapshot) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Pulse(PulseSnapshot),
    Failure(PulseSnapshot),
    Stopped(PulseSnapshot),
}

impl StatusUpdate {
    pub const fn snapshot(&self) -> &PulseSnapshot {
        match self {
            Self::Pulse(s) | Self::Failure(s) | Self::Stopped(s) => s,
        }
    }
}

/// Forwards updates over a bounded channel. Full channel: update dropped and counted.
pub struct ChannelStatusSink {
    tx: Sender<StatusUpdate>,
    dropped: AtomicU64,
}

impl ChannelStatusSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<StatusUpdate>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub fn dropped_updates(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward(&self, update: StatusUpdate) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(update) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl StatusSink for ChannelStatusSink {
    fn pulse_recorded(&self, snapshot: &PulseSnapshot) {
        self.forward(StatusUpdate::Pulse(snapshot.clone()));
    }

    fn pulse_failed(&self, snapshot: &PulseSnapshot) {
        self.forward(StatusUpdate::Failure(snapshot.clone()));
    }

    fn loop_stopped(&self, snapshot: &PulseSnapshot) {
        self.forward(StatusUpdate::Stopped(snapshot.clone()));
    }
}

/// Channel-backed sink when `enabled`, otherwise the null sink.
pub fn select_status_sink(
    enabled: bool,
    capacity: usize,
) -> (Arc<dyn StatusSink>, Option<Receiver<StatusUpdate>>) {
    if enabled {
        let (sink, rx) = ChannelStatusSink::bounded(capacity);
        (Arc::new(sink), Some(rx))
    } else {
        (Arc::new(NullStatusSink), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> PulseSnapshot {
        PulseSnapshot::new(PathBuf::from("/mnt/usb/hb.txt"), 5)
    }

    #[test]
    fn label_is_never_before_first_pulse() {
        let snap = snapshot();
        assert_eq!(snap.last_pulse_label(), "Never");
        assert!(!snap.is_running());
        assert_eq!(snap.phase, LoopPhase::Created);
    }

    #[test]
    fn status_line_shows_time_and_counters() {
        let mut snap = snapshot();
        snap.last_pulse = Some(Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        snap.pulses_ok = 7;
        snap.pulses_failed = 1;
        assert_eq!(
            snap.status_line(),
            "Last pulse: 03:04:05 (7 ok, 1 failed, every 5s)"
        );
    }

    #[test]
    fn phases_are_ordered() {
        assert!(LoopPhase::Created < LoopPhase::Running);
        assert!(LoopPhase::Running < LoopPhase::Stopping);
        assert!(LoopPhase::Stopping < LoopPhase::Stopped);
        assert_eq!(LoopPhase::Stopping.to_string(), "stopping");
    }

    #[test]
    fn channel_sink_forwards_each_kind() {
        let (sink, rx) = ChannelStatusSink::bounded(8);
        sink.pulse_recorded(&snapshot());
        sink.pulse_failed(&snapshot());
        sink.loop_stopped(&snapshot());

        assert!(matches!(rx.try_recv().unwrap(), StatusUpdate::Pulse(_)));
        assert!(matches!(rx.try_recv().unwrap(), StatusUpdate::Failure(_)));
        let last = rx.try_recv().unwrap();
        assert!(matches!(last, StatusUpdate::Stopped(_)));
        assert_eq!(last.snapshot().interval_seconds, 5);
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let (sink, rx) = ChannelStatusSink::bounded(1);
        for _ in 0..4 {
            sink.pulse_recorded(&snapshot());
        }
        assert_eq!(sink.dropped_updates(), 3);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn disconnected_receiver_is_not_a_drop() {
        let (sink, rx) = ChannelStatusSink::bounded(1);
        drop(rx);
        sink.pulse_recorded(&snapshot());
        assert_eq!(sink.dropped_updates(), 0);
    }

    #[test]
    fn select_returns_receiver_only_when_enabled() {
        let (_sink, rx) = select_status_sink(true, 4);
        assert!(rx.is_some());
        let (sink, rx) = select_status_sink(false, 4);
        assert!(rx.is_none());
        sink.pulse_recorded(&snapshot());
    }
}
