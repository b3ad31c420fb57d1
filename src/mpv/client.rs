//! High-level MPV client: one process, one IPC connection, one engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::Child;

use super::engine::{EngineEvent, ProtocolEngine};
use super::ipc::{IpcError, MpvIpc};
use super::process::{cleanup_ipc, spawn_mpv, ProcessError};
use super::protocol::MpvCommand;

/// How long a quitting MPV gets before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum MpvError {
  #[error(transparent)]
  Process(#[from] ProcessError),
  #[error(transparent)]
  Ipc(#[from] IpcError),
}

/// Everything needed to start one MPV instance.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
  /// Explicit binary (None = auto-detect).
  pub mpv_path: Option<PathBuf>,
  /// Arguments before the IPC flags.
  pub args: Vec<String>,
  /// IPC socket/pipe path.
  pub socket: PathBuf,
  /// Window in which startup output counts as failure.
  pub startup_timeout: Duration,
  /// Upper bound for connecting to the socket.
  pub connect_timeout: Duration,
}

/// Connected MPV instance.
pub struct MpvClient {
  engine: Arc<ProtocolEngine>,
  events: Receiver<EngineEvent>,
  ipc: MpvIpc,
  process: Mutex<Option<Child>>,
  socket: Option<PathBuf>,
}

impl MpvClient {
  /// Start MPV and connect to its IPC server.
  pub async fn launch(options: &LaunchOptions) -> Result<Self, MpvError> {
    // Cleanup any existing socket
    cleanup_ipc(&options.socket);

    let mut child = spawn_mpv(
      options.mpv_path.as_deref(),
      &options.args,
      &options.socket,
      options.startup_timeout,
    )
    .await?;

    let (engine, channels) = ProtocolEngine::new();
    let ipc = match MpvIpc::connect(
      &options.socket,
      options.connect_timeout,
      engine.clone(),
      channels.writes,
    )
    .await
    {
      Ok(ipc) => ipc,
      Err(e) => {
        log::error!("Could not connect to MPV at {:?}: {}", options.socket, e);
        let _ = child.kill().await;
        cleanup_ipc(&options.socket);
        return Err(e.into());
      }
    };

    log::info!("MPV client connected on {:?}", options.socket);
    Ok(Self {
      engine,
      events: channels.events,
      ipc,
      process: Mutex::new(Some(child)),
      socket: Some(options.socket.clone()),
    })
  }

  /// Wrap an already-open stream speaking the MPV IPC protocol.
  pub fn attach<R, W>(reader: R, writer: W) -> Self
  where
    R: tokio::io::AsyncRead + Send + Unpin + 'static,
    W: tokio::io::AsyncWrite + Send + Unpin + 'static,
  {
    let (engine, channels) = ProtocolEngine::new();
    let ipc = MpvIpc::attach(reader, writer, engine.clone(), channels.writes);
    Self {
      engine,
      events: channels.events,
      ipc,
      process: Mutex::new(None),
      socket: None,
    }
  }

  pub fn engine(&self) -> &Arc<ProtocolEngine> {
    &self.engine
  }

  /// Event stream for the session dispatch loop.
  pub fn events(&self) -> Receiver<EngineEvent> {
    self.events.clone()
  }

  /// Check if the IPC connection is still up.
  pub fn is_connected(&self) -> bool {
    !self.engine.is_closed() && !self.ipc.is_finished()
  }

  fn send(&self, cmd: MpvCommand) -> Result<(), MpvError> {
    self.engine.send(cmd).map_err(MpvError::from)
  }

  /// Append a file to the playlist.
  pub fn loadfile(&self, filename: &str, play: bool) -> Result<(), MpvError> {
    log::debug!("Loading file: {}", filename);
    self.send(MpvCommand::loadfile(filename, play))
  }

  /// Jump to a playlist index.
  pub fn play_index(&self, index: i64) -> Result<(), MpvError> {
    self.send(MpvCommand::playlist_play_index(index))
  }

  /// Remove a playlist index.
  pub fn remove_index(&self, index: usize) -> Result<(), MpvError> {
    self.send(MpvCommand::playlist_remove(index))
  }

  /// Seek to absolute position in seconds.
  pub fn seek(&self, time: f64) -> Result<(), MpvError> {
    self.send(MpvCommand::seek(time))
  }

  pub fn keypress(&self, key: &str) -> Result<(), MpvError> {
    self.send(MpvCommand::keypress(key))
  }

  pub fn cycle(&self, property: &str) -> Result<(), MpvError> {
    self.send(MpvCommand::cycle(property))
  }

  /// Ask MPV to quit. The connection closes once it does.
  pub fn quit(&self) -> Result<(), MpvError> {
    self.send(MpvCommand::quit())
  }

  /// Close the connection and reap the process.
  pub async fn stop(&self) {
    self.engine.close_writer();

    let child = self.process.lock().take();
    if let Some(mut child) = child {
      let pid = child.id();
      match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
        Ok(Ok(status)) => log::info!("MPV process exited with: {}", status),
        Ok(Err(e)) => log::error!("wait() failed: {}", e),
        Err(_) => {
          log::warn!("MPV (pid: {:?}) did not exit, killing", pid);
          if let Err(e) = child.kill().await {
            log::error!("kill() failed: {}", e);
          }
        }
      }
    }

    if let Some(socket) = &self.socket {
      cleanup_ipc(socket);
    }
    log::info!("MPV client stopped");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

  #[tokio::test]
  async fn request_over_attached_stream() {
    let (ours, theirs) = tokio::io::duplex(4096);
    let (reader, writer) = tokio::io::split(ours);
    let client = MpvClient::attach(reader, writer);
    let (mpv_read, mut mpv_write) = tokio::io::split(theirs);

    // A tiny fake mpv answering every request with its own command name.
    tokio::spawn(async move {
      let mut lines = BufReader::new(mpv_read).lines();
      while let Ok(Some(line)) = lines.next_line().await {
        let cmd: serde_json::Value = serde_json::from_str(&line).unwrap();
        let reply = serde_json::json!({
          "request_id": cmd["request_id"],
          "error": "success",
          "data": cmd["command"][1],
        });
        mpv_write
          .write_all(format!("{}\n", reply).as_bytes())
          .await
          .unwrap();
      }
    });

    let engine = client.engine().clone();
    let (a, b) = tokio::join!(engine.get("path"), engine.get("volume"));
    assert_eq!(a.unwrap(), "path");
    assert_eq!(b.unwrap(), "volume");
    assert!(client.is_connected());
  }
}
