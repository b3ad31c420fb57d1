//! Async IPC connection to MPV.
//!
//! Handles platform-specific socket/pipe connections and the reader/writer
//! tasks. Decoding and correlation live in the engine; this module only moves
//! lines.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::engine::ProtocolEngine;

#[derive(Error, Debug)]
pub enum IpcError {
  #[error("Could not connect to mpv! ({0})")]
  ConnectionFailed(String),
  #[error("Timed out connecting to mpv")]
  Timeout,
  #[error("Write failed: {0}")]
  WriteFailed(#[from] std::io::Error),
  #[error("mpv responded '{message}'{}", property_suffix(.property))]
  Rejected {
    message: String,
    property: Option<String>,
  },
  #[error("Connection closed")]
  Disconnected,
}

fn property_suffix(property: &Option<String>) -> String {
  match property {
    Some(name) => format!(" to request for property '{}'", name),
    None => String::new(),
  }
}

/// Writer channel message.
#[derive(Debug)]
pub enum WriteMessage {
  Line(Vec<u8>),
  Close,
}

#[cfg(unix)]
type IpcStream = tokio::net::UnixStream;
#[cfg(windows)]
type IpcStream = tokio::net::windows::named_pipe::NamedPipeClient;

/// Reader and writer tasks bound to one engine.
pub struct MpvIpc {
  reader_handle: JoinHandle<()>,
  _writer_handle: JoinHandle<()>,
}

impl MpvIpc {
  /// Connect to the MPV IPC socket/pipe, retrying until `timeout` expires.
  ///
  /// A refused or missing socket is retried with a growing delay; the last
  /// refusal is reported as `ConnectionFailed`, running out of time without
  /// any answer as `Timeout`.
  pub async fn connect(
    path: &Path,
    timeout: Duration,
    engine: Arc<ProtocolEngine>,
    writes: Receiver<WriteMessage>,
  ) -> Result<Self, IpcError> {
    let deadline = Instant::now() + timeout;
    let mut attempt: u64 = 0;

    let stream = loop {
      match tokio::time::timeout_at(deadline, Self::try_connect(path)).await {
        Ok(Ok(stream)) => break stream,
        Ok(Err(e)) => {
          attempt += 1;
          log::debug!("IPC connect attempt {} failed: {}", attempt, e);
          let delay = Duration::from_millis(50 * attempt.min(10));
          if Instant::now() + delay >= deadline {
            return Err(e);
          }
          tokio::time::sleep(delay).await;
        }
        Err(_) => return Err(IpcError::Timeout),
      }
    };

    let (reader, writer) = tokio::io::split(stream);
    Ok(Self::attach(reader, writer, engine, writes))
  }

  #[cfg(windows)]
  async fn try_connect(path: &Path) -> Result<IpcStream, IpcError> {
    use tokio::net::windows::named_pipe::ClientOptions;

    ClientOptions::new()
      .open(path)
      .map_err(|e| IpcError::ConnectionFailed(e.to_string()))
  }

  #[cfg(unix)]
  async fn try_connect(path: &Path) -> Result<IpcStream, IpcError> {
    tokio::net::UnixStream::connect(path)
      .await
      .map_err(|e| IpcError::ConnectionFailed(e.to_string()))
  }

  /// Spawn the reader and writer tasks over an already-open stream.
  pub fn attach<R, W>(
    reader: R,
    writer: W,
    engine: Arc<ProtocolEngine>,
    writes: Receiver<WriteMessage>,
  ) -> Self
  where
    R: tokio::io::AsyncRead + Send + Unpin + 'static,
    W: tokio::io::AsyncWrite + Send + Unpin + 'static,
  {
    let reader_handle = tokio::spawn(async move {
      Self::reader_loop(reader, engine).await;
    });

    let writer_handle = tokio::spawn(async move {
      Self::writer_loop(writer, writes).await;
    });

    Self {
      reader_handle,
      _writer_handle: writer_handle,
    }
  }

  async fn reader_loop<R: tokio::io::AsyncRead + Unpin>(reader: R, engine: Arc<ProtocolEngine>) {
    log::debug!("MPV IPC reader loop started");
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
      line.clear();
      match buf_reader.read_line(&mut line).await {
        Ok(0) => {
          log::info!("MPV IPC connection closed");
          break;
        }
        Ok(_) => {
          let trimmed = line.trim();
          if trimmed.is_empty() {
            continue;
          }
          engine.handle_line(trimmed);
        }
        Err(e) => {
          log::error!("MPV IPC read error: {}", e);
          break;
        }
      }
    }

    engine.handle_close();
  }

  async fn writer_loop<W: tokio::io::AsyncWrite + Unpin>(
    mut writer: W,
    writes: Receiver<WriteMessage>,
  ) {
    log::debug!("MPV IPC writer loop started");

    while let Ok(msg) = writes.recv().await {
      match msg {
        WriteMessage::Line(data) => {
          if let Err(e) = writer.write_all(&data).await {
            log::error!("MPV IPC write error: {}", e);
            break;
          }
          if let Err(e) = writer.write_all(b"\n").await {
            log::error!("MPV IPC write newline error: {}", e);
            break;
          }
          if let Err(e) = writer.flush().await {
            log::error!("MPV IPC flush error: {}", e);
            break;
          }
        }
        WriteMessage::Close => {
          log::debug!("MPV IPC writer closing");
          let _ = writer.shutdown().await;
          break;
        }
      }
    }
  }

  /// Whether the reader has seen the end of the stream.
  pub fn is_finished(&self) -> bool {
    self.reader_handle.is_finished()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mpv::engine::EngineEvent;
  use crate::mpv::protocol::MpvCommand;
  use tokio::io::AsyncReadExt;

  #[test]
  fn rejection_names_property() {
    let err = IpcError::Rejected {
      message: "property not found".into(),
      property: Some("chapter".into()),
    };
    assert_eq!(
      err.to_string(),
      "mpv responded 'property not found' to request for property 'chapter'"
    );
  }

  #[tokio::test]
  async fn lines_flow_both_ways() {
    let (engine, channels) = ProtocolEngine::new();
    let (ours, theirs) = tokio::io::duplex(4096);
    let (reader, writer) = tokio::io::split(ours);
    let _ipc = MpvIpc::attach(reader, writer, engine.clone(), channels.writes);
    let (mut mpv_read, mut mpv_write) = tokio::io::split(theirs);

    engine.send(MpvCommand::quit()).unwrap();
    let mut buf = vec![0u8; 64];
    let n = mpv_read.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"{\"command\":[\"quit\"],\"request_id\":0}\n");

    mpv_write.write_all(b"{\"event\":\"idle\"}\n").await.unwrap();
    match channels.events.recv().await.unwrap() {
      EngineEvent::Mpv(event) => assert_eq!(event.event, "idle"),
      other => panic!("unexpected {:?}", other),
    }

    drop(mpv_write);
    drop(mpv_read);
    assert!(matches!(
      channels.events.recv().await.unwrap(),
      EngineEvent::Closed
    ));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn connect_refused_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.sock");
    let (engine, channels) = ProtocolEngine::new();
    let result = MpvIpc::connect(&path, Duration::from_millis(120), engine, channels.writes).await;
    assert!(matches!(result, Err(IpcError::ConnectionFailed(_))));
  }
}
