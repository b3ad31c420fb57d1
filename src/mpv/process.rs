//! MPV process detection and spawning.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("MPV executable not found")]
  NotFound,
  #[error("Failed to spawn MPV: {0}")]
  SpawnFailed(#[from] std::io::Error),
  #[error("{0}")]
  EarlyExit(String),
}

/// Flags every instance is started with, besides the IPC server.
pub const BASE_ARGS: &[&str] = &["--idle=once"];

/// Pick a fresh IPC socket/pipe path for one instance.
pub fn ipc_path(dir: &Path) -> PathBuf {
  let name = format!("nvimpv-{}", uuid::Uuid::new_v4());
  #[cfg(windows)]
  {
    let _ = dir;
    PathBuf::from(format!(r"\\.\pipe\{}", name))
  }
  #[cfg(not(windows))]
  {
    dir.join(format!("{}.sock", name))
  }
}

/// Install locations checked when `mpv` is not on PATH.
#[cfg(windows)]
const FALLBACK_PATHS: &[&str] = &[
  r"C:\Program Files\mpv\mpv.exe",
  r"C:\Program Files (x86)\mpv\mpv.exe",
  r"C:\mpv\mpv.exe",
];
#[cfg(target_os = "macos")]
const FALLBACK_PATHS: &[&str] = &[
  "/opt/homebrew/bin/mpv",
  "/usr/local/bin/mpv",
  "/Applications/mpv.app/Contents/MacOS/mpv",
];
#[cfg(not(any(windows, target_os = "macos")))]
const FALLBACK_PATHS: &[&str] = &["/usr/bin/mpv", "/usr/local/bin/mpv", "/snap/bin/mpv"];

/// Locate the MPV binary: PATH first, then the usual install locations.
pub fn find_mpv() -> Option<PathBuf> {
  which::which("mpv").ok().or_else(|| {
    FALLBACK_PATHS
      .iter()
      .map(PathBuf::from)
      .find(|candidate| candidate.exists())
  })
}

/// Full argument list: caller flags, then the IPC server and base flags.
pub fn build_args(args: &[String], ipc: &Path) -> Vec<String> {
  let mut all: Vec<String> = args.to_vec();
  all.push(format!("--input-ipc-server={}", ipc.display()));
  all.extend(BASE_ARGS.iter().map(|s| s.to_string()));
  all
}

/// Spawn MPV with the IPC server enabled and watch its stdout for
/// `read_timeout`.
///
/// If stdout reaches end-of-file inside the window the process has already
/// given up, and whatever it printed is returned as the error. Otherwise the
/// remaining output is drained into the debug log.
pub async fn spawn_mpv(
  mpv_path: Option<&Path>,
  args: &[String],
  ipc: &Path,
  read_timeout: Duration,
) -> Result<Child, ProcessError> {
  let mpv_exe = mpv_path
    .map(Path::to_path_buf)
    .or_else(find_mpv)
    .ok_or(ProcessError::NotFound)?;

  let args = build_args(args, ipc);
  log::info!("Spawning MPV: {:?} {:?}", mpv_exe, args);

  let mut child = Command::new(&mpv_exe)
    .args(&args)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .kill_on_drop(true)
    .spawn()?;

  let Some(mut stdout) = child.stdout.take() else {
    return Ok(child);
  };

  let mut output = Vec::new();
  match tokio::time::timeout(read_timeout, stdout.read_to_end(&mut output)).await {
    Ok(result) => {
      if let Err(e) = result {
        log::warn!("Reading MPV output failed: {}", e);
      }
      let _ = child.kill().await;
      let text = String::from_utf8_lossy(&output).trim().to_string();
      if text.is_empty() {
        Err(ProcessError::EarlyExit("mpv exited during startup".to_string()))
      } else {
        Err(ProcessError::EarlyExit(text))
      }
    }
    Err(_) => {
      drain_output(stdout, output);
      Ok(child)
    }
  }
}

/// Keep the pipe from filling up once startup succeeded.
fn drain_output(stdout: ChildStdout, early: Vec<u8>) {
  if !early.is_empty() {
    log::debug!("mpv: {}", String::from_utf8_lossy(&early).trim_end());
  }
  tokio::spawn(async move {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
      log::debug!("mpv: {}", line);
    }
  });
}

/// Remove a stale socket file.
pub fn cleanup_ipc(path: &Path) {
  #[cfg(not(windows))]
  {
    let _ = std::fs::remove_file(path);
  }
  #[cfg(windows)]
  {
    // Windows named pipes are cleaned up automatically
    let _ = path;
  }
}
