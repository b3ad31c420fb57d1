//! MPV JSON IPC protocol types.
//!
//! Reference: https://mpv.io/manual/master/#json-ipc

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command sent to MPV via IPC.
///
/// `request_id` 0 means no reply is expected; the engine assigns real ids
/// when a command is correlated.
#[derive(Debug, Clone, Serialize)]
pub struct MpvCommand {
  pub command: Vec<Value>,
  pub request_id: i64,
}

impl MpvCommand {
  /// Create an uncorrelated command.
  pub fn new(args: Vec<Value>) -> Self {
    Self {
      command: args,
      request_id: 0,
    }
  }

  /// Same command tagged with a correlation id.
  pub fn with_request_id(mut self, request_id: i64) -> Self {
    self.request_id = request_id;
    self
  }

  /// Append a file to the playlist. `play` starts playback when idle.
  pub fn loadfile(filename: &str, play: bool) -> Self {
    let mode = if play { "append-play" } else { "append" };
    Self::new(vec!["loadfile".into(), filename.into(), mode.into()])
  }

  /// Seek to absolute position in seconds.
  pub fn seek(time: f64) -> Self {
    Self::new(vec!["seek".into(), time.into(), "absolute".into()])
  }

  /// Set a property to an arbitrary JSON value.
  pub fn set_property(name: &str, value: Value) -> Self {
    Self::new(vec!["set_property".into(), name.into(), value])
  }

  /// Observe a property for changes.
  pub fn observe_property(id: i64, name: &str) -> Self {
    Self::new(vec!["observe_property".into(), id.into(), name.into()])
  }

  /// Get a property value.
  pub fn get_property(name: &str) -> Self {
    Self::new(vec!["get_property".into(), name.into()])
  }

  /// Send a key as if pressed in the player window.
  pub fn keypress(key: &str) -> Self {
    Self::new(vec!["keypress".into(), key.into()])
  }

  /// Start playing the playlist entry at `index` (0-based).
  pub fn playlist_play_index(index: i64) -> Self {
    Self::new(vec!["playlist-play-index".into(), index.into()])
  }

  /// Remove the playlist entry at `index` (0-based).
  pub fn playlist_remove(index: usize) -> Self {
    Self::new(vec!["playlist-remove".into(), index.into()])
  }

  /// Quit MPV.
  pub fn quit() -> Self {
    Self::new(vec!["quit".into()])
  }

  /// Cycle (toggle) a property.
  pub fn cycle(property: &str) -> Self {
    Self::new(vec!["cycle".into(), property.into()])
  }

  /// Serialize as a single IPC line (without the trailing newline).
  pub fn to_line(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }
}

/// Response from MPV for a command.
#[derive(Debug, Clone, Deserialize)]
pub struct MpvResponse {
  /// "success" or error message.
  #[serde(default)]
  pub error: Option<String>,
  /// Response data (command-specific).
  #[serde(default)]
  pub data: Option<Value>,
  /// Matching request ID.
  #[serde(default)]
  pub request_id: i64,
}

impl MpvResponse {
  /// Check if the command succeeded. A missing error field counts as success.
  pub fn is_success(&self) -> bool {
    matches!(self.error.as_deref(), None | Some("success"))
  }
}

/// Event sent by MPV (property changes, playback events, etc.).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MpvEvent {
  /// Event type (e.g., "property-change", "start-file", "end-file").
  pub event: String,
  /// Observer ID for property-change events.
  #[serde(default)]
  pub id: Option<i64>,
  /// Property name for property-change events.
  #[serde(default)]
  pub name: Option<String>,
  /// Event data.
  #[serde(default)]
  pub data: Option<Value>,
  /// Reason for end-file events (e.g., "eof", "stop", "quit", "error", "redirect").
  #[serde(default)]
  pub reason: Option<String>,
  /// Playlist entry the event refers to (start-file, end-file, file-loaded).
  #[serde(default)]
  pub playlist_entry_id: Option<i64>,
  /// First entry inserted by a redirect.
  #[serde(default)]
  pub playlist_insert_id: Option<i64>,
  /// Number of entries inserted by a redirect.
  #[serde(default)]
  pub playlist_insert_num_entries: Option<i64>,
  /// Error text for end-file events with reason "error".
  #[serde(default)]
  pub file_error: Option<String>,
}

/// One entry of MPV's `playlist` property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
  pub id: i64,
  #[serde(default)]
  pub filename: String,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub current: bool,
  #[serde(default)]
  pub playing: bool,
}

impl PlaylistEntry {
  /// Decode the `playlist` property value, skipping malformed entries.
  pub fn parse_list(value: &Value) -> Vec<PlaylistEntry> {
    match value.as_array() {
      Some(items) => items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect(),
      None => Vec::new(),
    }
  }
}

/// Message received from MPV IPC (either response or event).
#[derive(Debug, Clone)]
pub enum MpvMessage {
  Response(MpvResponse),
  Event(MpvEvent),
}

impl MpvMessage {
  /// Parse a JSON line from MPV.
  pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    if value.get("event").is_some() {
      Ok(MpvMessage::Event(serde_json::from_value(value)?))
    } else {
      Ok(MpvMessage::Response(serde_json::from_value(value)?))
    }
  }
}
