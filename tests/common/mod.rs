#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_wtd") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "wtd.exe" } else { "wtd" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve wtd binary path for integration test"),
    }
}

fn write_case_log(
    case_name: &str,
    args: &[&str],
    status: ExitStatus,
    stdout: &str,
    stderr: &str,
) -> PathBuf {
    let root = std::env::temp_dir().join("wtd-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");
    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={status}\n"));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");
    log_path
}

/// Run `wtd` to completion.
pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let output = Command::new(resolve_bin_path())
        .args(args)
        .env_remove("WTD_INTERVAL_SECONDS")
        .env_remove("WTD_HEARTBEAT_FILENAME")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute wtd command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let log_path = write_case_log(case_name, args, output.status, &stdout, &stderr);

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Start `wtd` in the background with captured output.
pub fn spawn_cli(args: &[&str]) -> Child {
    Command::new(resolve_bin_path())
        .args(args)
        .env_remove("WTD_INTERVAL_SECONDS")
        .env_remove("WTD_HEARTBEAT_FILENAME")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn wtd command")
}

/// Wait for a spawned `wtd` and record its output like [`run_cli_case`].
pub fn finish_cli(case_name: &str, args: &[&str], child: Child) -> CmdResult {
    let output = child.wait_with_output().expect("wait for wtd");
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let log_path = write_case_log(case_name, args, output.status, &stdout, &stderr);
    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Poll `condition` every 20ms until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

pub fn heartbeat_in(dir: &Path) -> PathBuf {
    dir.join("WakeTheDrive.heartbeat.txt")
}
