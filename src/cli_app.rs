//! Command-line front end: parse flags, resolve config, run the pulse loop in
//! the background and render its status until stopped.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use colored::{Colorize, control};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use thiserror::Error;

use wake_the_drive::core::config::{APP_NAME, Config};
use wake_the_drive::core::paths::{AppPaths, default_target_dir, resolve_absolute_path};
use wake_the_drive::daemon::pulse_loop::{LoopConfig, PulseHandle, PulseLoop};
use wake_the_drive::daemon::signals;
use wake_the_drive::daemon::status::{PulseSnapshot, StatusUpdate, select_status_sink};
use wake_the_drive::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
use wake_the_drive::logger::jsonl::JsonlConfig;
use wake_the_drive::platform::opener::{FileOpener, SystemOpener, open_best_effort};
use wake_the_drive::platform::volume::probe_target_volume;

const STATUS_CHANNEL_CAPACITY: usize = 64;
const STATUS_POLL: Duration = Duration::from_millis(250);

/// WakeTheDrive: keep a drive awake by pulsing a heartbeat file on it.
#[derive(Debug, Parser)]
#[command(
    name = "wtd",
    author,
    version,
    about = "WakeTheDrive - keep external drives from sleeping",
    long_about = None
)]
pub struct Cli {
    /// Seconds between pulses (overrides the config file).
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,
    /// Config file path. Defaults to WakeTheDrive.config.json in the target directory.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Directory on the drive to keep awake. Defaults to the executable's directory.
    #[arg(long, value_name = "PATH")]
    dir: Option<PathBuf>,
    /// Append a JSONL activity log to this file.
    #[arg(long, value_name = "PATH")]
    activity_log: Option<PathBuf>,
    /// Do not print a status line per pulse.
    #[arg(short, long)]
    quiet: bool,
    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
    /// Open the target directory in the file manager and exit.
    #[arg(long)]
    open_folder: bool,
    /// Open the config file with the default editor and exit.
    #[arg(long)]
    open_config: bool,
}

/// Top-level CLI error with a stable exit code.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) => 2,
            Self::Internal(_) => 3,
        }
    }
}

/// Run the CLI to completion. Returns after the loop has stopped and cleaned up.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color || !io::stdout().is_terminal() {
        control::set_override(false);
    }

    let target_dir = cli.dir.clone().unwrap_or_else(default_target_dir);
    if !target_dir.is_dir() {
        return Err(CliError::User(format!(
            "target directory does not exist: {}",
            target_dir.display()
        )));
    }
    let paths = AppPaths::new(&target_dir, cli.config.as_deref());

    if cli.open_folder || cli.open_config {
        run_open(cli, &paths, &SystemOpener);
        return Ok(());
    }

    let mut config = Config::ensure(&paths.config_file);
    if let Some(interval) = cli.interval {
        config.interval_seconds = interval;
    }
    let loop_config =
        LoopConfig::from_config(&config, &paths).map_err(|e| CliError::User(e.to_string()))?;

    let (logger, logger_join) = start_activity_log(cli, &paths, &config)?;
    let (sink, updates) = select_status_sink(!cli.quiet, STATUS_CHANNEL_CAPACITY);
    let pulse_loop = PulseLoop::new(loop_config)
        .with_status_sink(sink)
        .with_activity_logger(logger.clone());
    print_banner(&pulse_loop, &paths);

    // Hooked before start so an early Ctrl+C still goes through cleanup.
    let _signals = signals::install(&pulse_loop.stop_signal());
    let handle = pulse_loop
        .start()
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    eprintln!("Press Ctrl+C to stop.");

    follow_status(&handle, updates.as_ref(), &paths);
    let summary = handle
        .join()
        .map_err(|e| CliError::Internal(e.to_string()))?;

    logger.shutdown();
    if let Some(join) = logger_join {
        let _ = join.join();
    }
    if logger.dropped_events() > 0 {
        eprintln!(
            "[WTD-JSONL] {} activity events dropped",
            logger.dropped_events()
        );
    }

    print_summary(&summary);
    Ok(())
}

fn run_open(cli: &Cli, paths: &AppPaths, opener: &dyn FileOpener) {
    if cli.open_config {
        if !paths.config_file.exists() {
            let _ = Config::ensure(&paths.config_file);
        }
        open_best_effort(opener, &paths.config_file);
    }
    if cli.open_folder {
        open_best_effort(opener, &paths.target_dir);
    }
}

fn start_activity_log(
    cli: &Cli,
    paths: &AppPaths,
    config: &Config,
) -> Result<(ActivityLoggerHandle, Option<thread::JoinHandle<()>>), CliError> {
    let Some(log_path) = &cli.activity_log else {
        return Ok((ActivityLoggerHandle::disabled(), None));
    };
    let (logger, join) = spawn_logger(JsonlConfig::at(resolve_absolute_path(log_path)))
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    logger.send(ActivityEvent::ConfigLoaded {
        path: paths.config_file.display().to_string(),
        details: format!(
            "interval_seconds={} heartbeat_filename={}",
            config.interval_seconds, config.heartbeat_filename
        ),
    });
    Ok((logger, Some(join)))
}

fn print_banner(pulse_loop: &PulseLoop, paths: &AppPaths) {
    let loop_config = pulse_loop.config();
    println!("{} {}", APP_NAME.bold(), env!("CARGO_PKG_VERSION"));
    println!("  heartbeat: {}", loop_config.heartbeat_path.display());
    println!("  interval:  {}s", loop_config.interval_seconds());
    println!("  config:    {}", paths.config_file.display());
    match probe_target_volume(&paths.target_dir) {
        Ok(volume) => {
            println!("  volume:    {volume}");
            if volume.is_ram_backed {
                let warning = format!(
                    "warning: {} is RAM-backed ({}); pulses will not keep any drive awake",
                    volume.mount_point.display(),
                    volume.fs_type
                );
                println!("  {}", warning.yellow());
            }
        }
        Err(err) => println!("  volume:    unknown ({err})"),
    }
    println!("  flush:     {}", pulse_loop.flush_primitive());
    println!("  sleep:     {}", pulse_loop.sleep_guard_name());
}

fn follow_status(
    handle: &PulseHandle,
    updates: Option<&Receiver<StatusUpdate>>,
    paths: &AppPaths,
) {
    let Some(rx) = updates else {
        while !handle.is_finished() {
            thread::sleep(STATUS_POLL);
        }
        return;
    };

    loop {
        match rx.recv_timeout(STATUS_POLL) {
            Ok(StatusUpdate::Stopped(_)) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(update) => render_update(&update, paths),
            Err(RecvTimeoutError::Timeout) => {
                if handle.is_finished() {
                    break;
                }
            }
        }
    }
}

fn render_update(update: &StatusUpdate, paths: &AppPaths) {
    match update {
        StatusUpdate::Pulse(snap) => println!(
            "[{}] {} {}",
            snap.last_pulse_label(),
            "Pulse sent to".green(),
            paths.target_dir.display()
        ),
        StatusUpdate::Failure(snap) => println!(
            "[{}] {} {}",
            chrono::Local::now().format("%H:%M:%S"),
            "Pulse failed:".red(),
            snap.last_error.as_deref().unwrap_or("unknown error")
        ),
        StatusUpdate::Stopped(_) => {}
    }
}

fn print_summary(summary: &PulseSnapshot) {
    println!(
        "Stopped. {} pulse(s) sent, {} failed, last pulse {}.",
        summary.pulses_ok,
        summary.pulses_failed,
        summary.last_pulse_label()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use parking_lot::Mutex;
    use std::ffi::OsString;
    use std::path::Path;

    #[derive(Default)]
    struct RecordingOpener {
        opened: Mutex<Vec<PathBuf>>,
    }

    impl FileOpener for RecordingOpener {
        fn open(&self, path: &Path) -> wake_the_drive::core::errors::Result<()> {
            self.opened.lock().push(path.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn clap_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_all_flags() {
        let cli = Cli::try_parse_from([
            "wtd",
            "--interval",
            "30",
            "--dir",
            "/mnt/usb",
            "--config",
            "/etc/wtd.json",
            "--activity-log",
            "/tmp/wtd.jsonl",
            "--quiet",
            "--no-color",
        ])
        .unwrap();
        assert_eq!(cli.interval, Some(30));
        assert_eq!(cli.dir.as_deref(), Some(Path::new("/mnt/usb")));
        assert_eq!(cli.config.as_deref(), Some(Path::new("/etc/wtd.json")));
        assert!(cli.activity_log.is_some());
        assert!(cli.quiet && cli.no_color);
        assert!(!cli.open_folder && !cli.open_config);
    }

    #[test]
    fn zero_interval_is_rejected_by_parser() {
        assert!(Cli::try_parse_from(["wtd", "--interval", "0"]).is_err());
        assert!(Cli::try_parse_from(["wtd", "--interval", "-3"]).is_err());
        assert!(Cli::try_parse_from(["wtd", "--interval", "abc"]).is_err());
    }

    #[test]
    fn no_arguments_is_valid() {
        let cli = Cli::try_parse_from(["wtd"]).unwrap();
        assert!(cli.interval.is_none());
        assert!(cli.dir.is_none());
    }

    #[test]
    fn exit_codes_follow_contract() {
        assert_eq!(CliError::User("bad".into()).exit_code(), 1);
        assert_eq!(CliError::Runtime("io".into()).exit_code(), 2);
        assert_eq!(CliError::Internal("bug".into()).exit_code(), 3);
    }

    #[test]
    fn open_actions_use_opener_and_create_config() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path(), None);
        let cli = Cli::try_parse_from(["wtd", "--open-config", "--open-folder"]).unwrap();
        let opener = RecordingOpener::default();

        run_open(&cli, &paths, &opener);

        assert!(paths.config_file.exists());
        let opened = opener.opened.lock();
        assert_eq!(
            opened.as_slice(),
            [paths.config_file.clone(), paths.target_dir.clone()]
        );
    }

    #[test]
    fn missing_target_dir_is_user_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let cli = Cli::try_parse_from([
            OsString::from("wtd"),
            OsString::from("--dir"),
            missing.into_os_string(),
        ])
        .unwrap();
        let err = run(&cli).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }
}
