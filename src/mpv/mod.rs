//! MPV IPC module - spawns and controls an external MPV player via JSON IPC.
//!
//! Architecture:
//! - `process.rs` - MPV binary detection, process spawning and the startup check
//! - `ipc.rs` - Async IPC connection (Unix sockets, Named Pipes on Windows)
//! - `protocol.rs` - JSON command/response types and serialization
//! - `engine.rs` - Request correlation, event routing and the property cache
//! - `client.rs` - One connected MPV instance with command helpers

mod client;
mod engine;
mod ipc;
mod process;
mod protocol;

pub use client::{LaunchOptions, MpvClient, MpvError};
pub use engine::{
  EngineChannels, EngineEvent, EventWait, PlaylistDelta, ProtocolEngine, ProtocolFailure,
  PLAYLIST_DELTA_EVENT,
};
pub use ipc::{IpcError, MpvIpc, WriteMessage};
pub use process::{build_args, cleanup_ipc, find_mpv, ipc_path, ProcessError, BASE_ARGS};
pub use protocol::{MpvCommand, MpvEvent, MpvMessage, MpvResponse, PlaylistEntry};
