//! The pulse loop: one background thread that rewrites the heartbeat file on a
//! fixed schedule until stopped, then removes it and releases the sleep guard.
//!
//! Lifecycle is `Created -> Running -> Stopping -> Stopped`. Loops are
//! single-use. Cleanup lives in a drop guard created at thread entry, so it runs
//! on normal exit and while unwinding from a panic.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use parking_lot::RwLock;

use crate::core::config::Config;
use crate::core::errors::{Result, WtdError};
use crate::core::paths::AppPaths;
use crate::daemon::status::{LoopPhase, NullStatusSink, PulseSnapshot, StatusSink};
use crate::heartbeat::writer::HeartbeatWriter;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::platform::flush::PlatformFlush;
use crate::platform::sleep_guard::{SleepGuard, detect_sleep_guard};

/// Longest uninterrupted sleep between stop-flag checks.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Immutable parameters of one loop instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    pub interval: Duration,
    pub heartbeat_path: PathBuf,
    pub tick: Duration,
}

impl LoopConfig {
    /// Pulse `heartbeat_path` every `interval_seconds` (must be >= 1).
    pub fn new(interval_seconds: u64, heartbeat_path: impl Into<PathBuf>) -> Result<Self> {
        if interval_seconds == 0 {
            return Err(WtdError::InvalidConfig {
                details: "interval_seconds must be at least 1".to_string(),
            });
        }
        Ok(Self {
            interval: Duration::from_secs(interval_seconds),
            heartbeat_path: heartbeat_path.into(),
            tick: DEFAULT_TICK,
        })
    }

    pub fn from_config(config: &Config, paths: &AppPaths) -> Result<Self> {
        config.validate()?;
        Self::new(
            config.interval_seconds,
            paths.heartbeat_file(&config.heartbeat_filename),
        )
    }

    /// Override the wait granularity. Clamped to at least one millisecond.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    /// Sub-second intervals for tests; production goes through [`LoopConfig::new`].
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub const fn interval_seconds(&self) -> u64 {
        self.interval.as_secs()
    }
}

/// Fire-and-forget stop request, shareable with signal handlers.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; the flag never clears.
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The raw flag, for `signal_hook::flag::register`.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

struct Shared {
    stop: StopSignal,
    snapshot: RwLock<PulseSnapshot>,
}

impl Shared {
    fn update(&self, apply: impl FnOnce(&mut PulseSnapshot)) -> PulseSnapshot {
        let mut snap = self.snapshot.write();
        apply(&mut snap);
        snap.clone()
    }

    fn advance_phase(&self, phase: LoopPhase) -> PulseSnapshot {
        self.update(|snap| snap.phase = snap.phase.max(phase))
    }
}

/// A configured loop that has not started yet.
pub struct PulseLoop {
    config: LoopConfig,
    writer: HeartbeatWriter,
    sleep_guard: Arc<dyn SleepGuard>,
    sink: Arc<dyn StatusSink>,
    logger: ActivityLoggerHandle,
    stop: StopSignal,
}

impl PulseLoop {
    /// Loop with the host's flush primitive and sleep guard, no status sink and
    /// no activity log.
    pub fn new(config: LoopConfig) -> Self {
        Self {
            writer: HeartbeatWriter::new(config.heartbeat_path.clone()),
            config,
            sleep_guard: detect_sleep_guard(),
            sink: Arc::new(NullStatusSink),
            logger: ActivityLoggerHandle::disabled(),
            stop: StopSignal::new(),
        }
    }

    #[must_use]
    pub fn with_flusher(mut self, flusher: Arc<dyn PlatformFlush>) -> Self {
        self.writer = HeartbeatWriter::with_flusher(self.config.heartbeat_path.clone(), flusher);
        self
    }

    #[must_use]
    pub fn with_sleep_guard(mut self, sleep_guard: Arc<dyn SleepGuard>) -> Self {
        self.sleep_guard = sleep_guard;
        self
    }

    #[must_use]
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_activity_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = logger;
        self
    }

    /// Stop signal for this loop. Can be wired to OS signals before `start`.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub const fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Name of the flush primitive each pulse ends with.
    pub fn flush_primitive(&self) -> &'static str {
        self.writer.flush_primitive()
    }

    pub fn sleep_guard_name(&self) -> &'static str {
        self.sleep_guard.name()
    }

    /// Spawn the `wtd-pulse` thread. Failing to spawn is the only startup error.
    pub fn start(self) -> Result<PulseHandle> {
        let shared = Arc::new(Shared {
            stop: self.stop.clone(),
            snapshot: RwLock::new(PulseSnapshot::new(
                self.config.heartbeat_path.clone(),
                self.config.interval_seconds(),
            )),
        });
        let thread_shared = Arc::clone(&shared);

        let join = thread::Builder::new()
            .name("wtd-pulse".to_string())
            .spawn(move || self.run(&thread_shared))
            .map_err(|e| WtdError::Runtime {
                details: format!("failed to spawn pulse thread: {e}"),
            })?;

        Ok(PulseHandle {
            shared,
            join: Some(join),
        })
    }

    fn run(self, shared: &Shared) {
        let _cleanup = CleanupGuard {
            writer: &self.writer,
            sleep_guard: self.sleep_guard.as_ref(),
            sink: self.sink.as_ref(),
            logger: &self.logger,
            shared,
        };

        // Armed and released on this thread (Windows execution state is per-thread).
        self.sleep_guard.set(true);
        shared.advance_phase(LoopPhase::Running);
        self.logger.send(ActivityEvent::LoopStarted {
            path: self.writer.path().display().to_string(),
            interval_secs: self.config.interval_seconds(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        let interval = self.config.interval;
        let mut next_due = Instant::now();
        let mut failure_streak: u64 = 0;

        while !shared.stop.is_requested() {
            self.pulse_once(shared, &mut failure_streak);

            match next_slot(next_due, interval, Instant::now()) {
                Some(due) => {
                    next_due = due;
                    wait_until(Some(due), self.config.tick, &shared.stop);
                }
                // The next slot is past what `Instant` can represent: idle until stopped.
                None => wait_until(None, self.config.tick, &shared.stop),
            }
        }

        shared.advance_phase(LoopPhase::Stopping);
    }

    fn pulse_once(&self, shared: &Shared, failure_streak: &mut u64) {
        let started = Instant::now();
        match self.writer.pulse(Local::now()) {
            Ok(at) => {
                if *failure_streak > 0 {
                    eprintln!(
                        "[WTD-PULSE] recovered after {failure_streak} failed pulse(s): {}",
                        self.writer.path().display()
                    );
                }
                *failure_streak = 0;
                let snap = shared.update(|snap| {
                    snap.last_pulse = Some(at);
                    snap.pulses_ok += 1;
                    snap.last_error = None;
                });
                self.sink.pulse_recorded(&snap);
                self.logger.send(ActivityEvent::PulseWritten {
                    path: self.writer.path().display().to_string(),
                    duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                });
            }
            Err(err) => {
                *failure_streak += 1;
                if *failure_streak == 1 {
                    eprintln!("[WTD-PULSE] {err}; retrying on schedule");
                }
                let snap = shared.update(|snap| {
                    snap.pulses_failed += 1;
                    snap.last_error = Some(err.to_string());
                });
                self.sink.pulse_failed(&snap);
                self.logger
                    .send(ActivityEvent::pulse_failed(self.writer.path(), &err));
            }
        }
    }
}

/// First slot after `prev` that is not already behind `now`. Slots missed while
/// a pulse stalled or the machine slept are skipped. `None` on `Instant` overflow.
fn next_slot(prev: Instant, interval: Duration, now: Instant) -> Option<Instant> {
    let mut due = prev.checked_add(interval)?;
    while due < now {
        due = due.checked_add(interval)?;
    }
    Some(due)
}

/// Sleep until `deadline` in steps of at most `tick`, returning early on stop.
/// Without a deadline, sleeps until stop is requested.
fn wait_until(deadline: Option<Instant>, tick: Duration, stop: &StopSignal) {
    loop {
        if stop.is_requested() {
            return;
        }
        let step = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return;
                }
                remaining.min(tick)
            }
            None => tick,
        };
        // `PulseHandle::stop` unparks the thread; signal handlers rely on the tick.
        thread::park_timeout(step);
    }
}

/// Runs the stop sequence when the pulse thread leaves `run`, however it leaves.
struct CleanupGuard<'a> {
    writer: &'a HeartbeatWriter,
    sleep_guard: &'a dyn SleepGuard,
    sink: &'a dyn StatusSink,
    logger: &'a ActivityLoggerHandle,
    shared: &'a Shared,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.shared.stop.request();
        self.shared.advance_phase(LoopPhase::Stopping);
        if thread::panicking() {
            eprintln!("[WTD-CLEANUP] pulse thread panicked, cleaning up");
        }

        if let Err(err) = self.writer.remove() {
            eprintln!("[WTD-CLEANUP] could not remove heartbeat file: {err}");
            self.logger
                .send(ActivityEvent::cleanup_failed(self.writer.path(), &err));
        }
        self.sleep_guard.set(false);

        let snap = self.shared.advance_phase(LoopPhase::Stopped);
        self.sink.loop_stopped(&snap);
        self.logger.send(ActivityEvent::LoopStopped {
            path: self.writer.path().display().to_string(),
            pulses_ok: snap.pulses_ok,
            pulses_failed: snap.pulses_failed,
        });
    }
}

/// Control side of a started loop. Dropping it stops the loop and waits for cleanup.
pub struct PulseHandle {
    shared: Arc<Shared>,
    join: Option<JoinHandle<()>>,
}

impl PulseHandle {
    /// Request stop. Safe to call any number of times, from any thread.
    pub fn stop(&self) {
        self.shared.stop.request();
        if let Some(join) = &self.join {
            join.thread().unpark();
        }
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.shared.stop.clone()
    }

    pub fn snapshot(&self) -> PulseSnapshot {
        self.shared.snapshot.read().clone()
    }

    pub fn last_pulse(&self) -> Option<DateTime<Local>> {
        self.shared.snapshot.read().last_pulse
    }

    pub fn phase(&self) -> LoopPhase {
        self.shared.snapshot.read().phase
    }

    /// True once the pulse thread has exited (cleanup included).
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the thread to exit on its own. Call [`PulseHandle::stop`] first
    /// unless something else (a signal) will.
    pub fn join(mut self) -> Result<PulseSnapshot> {
        if let Some(join) = self.join.take() {
            join.join().map_err(|_| WtdError::Runtime {
                details: "pulse thread panicked".to_string(),
            })?;
        }
        Ok(self.snapshot())
    }

    pub fn stop_and_join(self) -> Result<PulseSnapshot> {
        self.stop();
        self.join()
    }
}

impl Drop for PulseHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            self.shared.stop.request();
            join.thread().unpark();
            let _ = join.join();
        }
    }
}
