//! Interface to the editor that shows players and playlists.
//!
//! The core never touches editor storage itself. Every visible effect goes
//! through [`DisplaySurface`], implemented by the integration layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Opaque editor-side identifier bound to a line (an extmark, say).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DisplayHandle(pub i64);

/// Editor-side container (a buffer).
pub type SurfaceId = i64;

/// Identifies one player on the display side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerKey {
  pub surface: SurfaceId,
  /// Handle of the player line itself.
  pub root: DisplayHandle,
}

/// Notification levels, numbered like the editor's log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
  Info = 2,
  Warn = 3,
  Error = 4,
}

#[derive(Debug, Error)]
#[error("Display error: {0}")]
pub struct DisplayError(pub String);

/// Operations the core needs from the editor.
///
/// Calls are synchronous and may come from any runtime thread, but never
/// concurrently for the same player.
pub trait DisplaySurface: Send + Sync {
  /// Create a player on `surface` with one handle per line.
  fn create_player(
    &self,
    surface: SurfaceId,
    lines: &[usize],
  ) -> Result<(DisplayHandle, Vec<DisplayHandle>), DisplayError>;

  /// Move the player line next to `handle`, optionally forcing interim text.
  fn move_player(
    &self,
    player: PlayerKey,
    handle: DisplayHandle,
    interim_text: Option<&str>,
  ) -> Result<(), DisplayError>;

  /// Replace the text of the line at `handle`.
  fn write_line(&self, player: PlayerKey, handle: DisplayHandle, text: &str)
    -> Result<(), DisplayError>;

  /// Show `title` as the now-playing text next to `handle`.
  fn show_playing(&self, player: PlayerKey, handle: DisplayHandle, title: &str)
    -> Result<(), DisplayError>;

  /// Overwrite the line at `at` with `lines`; `current_line` (1-based) is
  /// the entry playing now. Returns one handle per new line.
  fn paste_lines(
    &self,
    player: PlayerKey,
    at: DisplayHandle,
    lines: &[String],
    current_line: usize,
  ) -> Result<Vec<DisplayHandle>, DisplayError>;

  /// Open a new surface seeded with `lines` and move the player there.
  fn open_surface(
    &self,
    player: PlayerKey,
    origin: DisplayHandle,
    lines: &[String],
  ) -> Result<(PlayerKey, Vec<DisplayHandle>), DisplayError>;

  /// Redraw the player line from the property cache. `forced_text`
  /// overrides the formatted output.
  fn render_status(&self, player: PlayerKey, properties: &Map<String, Value>, forced_text: Option<&str>);

  /// The player is gone for good.
  fn remove_player(&self, player: PlayerKey);

  /// The player now lives under a different key.
  fn player_moved(&self, _old: PlayerKey, _new: PlayerKey) {}

  fn show_error(&self, message: &str, severity: Severity);
}

#[cfg(test)]
pub(crate) mod testing {
  //! Recording display used by the session and playlist tests.

  use super::*;
  use parking_lot::Mutex;

  #[derive(Debug, Clone, PartialEq)]
  pub enum Call {
    Create(SurfaceId, Vec<usize>),
    Move(DisplayHandle, Option<String>),
    Write(DisplayHandle, String),
    Playing(DisplayHandle, String),
    Paste(DisplayHandle, Vec<String>, usize),
    Open(DisplayHandle, Vec<String>),
    Status(Option<String>),
    Remove(PlayerKey),
    Moved(PlayerKey, PlayerKey),
    Error(String, Severity),
  }

  #[derive(Default)]
  pub struct RecordingDisplay {
    pub calls: Mutex<Vec<Call>>,
    next_handle: Mutex<i64>,
  }

  impl RecordingDisplay {
    pub fn new() -> Self {
      Self {
        calls: Mutex::new(Vec::new()),
        next_handle: Mutex::new(100),
      }
    }

    fn handle(&self) -> DisplayHandle {
      let mut next = self.next_handle.lock();
      *next += 1;
      DisplayHandle(*next)
    }

    fn record(&self, call: Call) {
      self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
      self.calls.lock().clone()
    }

    /// Calls other than status redraws.
    pub fn effects(&self) -> Vec<Call> {
      self
        .calls()
        .into_iter()
        .filter(|c| !matches!(c, Call::Status(_)))
        .collect()
    }

    pub fn errors(&self) -> Vec<String> {
      self
        .calls()
        .into_iter()
        .filter_map(|c| match c {
          Call::Error(message, _) => Some(message),
          _ => None,
        })
        .collect()
    }
  }

  impl DisplaySurface for RecordingDisplay {
    fn create_player(
      &self,
      surface: SurfaceId,
      lines: &[usize],
    ) -> Result<(DisplayHandle, Vec<DisplayHandle>), DisplayError> {
      self.record(Call::Create(surface, lines.to_vec()));
      let root = self.handle();
      Ok((root, lines.iter().map(|_| self.handle()).collect()))
    }

    fn move_player(
      &self,
      _player: PlayerKey,
      handle: DisplayHandle,
      interim_text: Option<&str>,
    ) -> Result<(), DisplayError> {
      self.record(Call::Move(handle, interim_text.map(str::to_string)));
      Ok(())
    }

    fn write_line(&self, _player: PlayerKey, handle: DisplayHandle, text: &str) -> Result<(), DisplayError> {
      self.record(Call::Write(handle, text.to_string()));
      Ok(())
    }

    fn show_playing(&self, _player: PlayerKey, handle: DisplayHandle, title: &str) -> Result<(), DisplayError> {
      self.record(Call::Playing(handle, title.to_string()));
      Ok(())
    }

    fn paste_lines(
      &self,
      _player: PlayerKey,
      at: DisplayHandle,
      lines: &[String],
      current_line: usize,
    ) -> Result<Vec<DisplayHandle>, DisplayError> {
      self.record(Call::Paste(at, lines.to_vec(), current_line));
      Ok(lines.iter().map(|_| self.handle()).collect())
    }

    fn open_surface(
      &self,
      player: PlayerKey,
      origin: DisplayHandle,
      lines: &[String],
    ) -> Result<(PlayerKey, Vec<DisplayHandle>), DisplayError> {
      self.record(Call::Open(origin, lines.to_vec()));
      let key = PlayerKey {
        surface: player.surface + 1,
        root: self.handle(),
      };
      Ok((key, lines.iter().map(|_| self.handle()).collect()))
    }

    fn render_status(&self, _player: PlayerKey, _properties: &Map<String, Value>, forced_text: Option<&str>) {
      self.record(Call::Status(forced_text.map(str::to_string)));
    }

    fn remove_player(&self, player: PlayerKey) {
      self.record(Call::Remove(player));
    }

    fn player_moved(&self, old: PlayerKey, new: PlayerKey) {
      self.record(Call::Moved(old, new));
    }

    fn show_error(&self, message: &str, severity: Severity) {
      self.record(Call::Error(message.to_string(), severity));
    }
  }
}
