//! Session error types.

use thiserror::Error;

use crate::display::{DisplayError, Severity};
use crate::mpv::{IpcError, MpvError};
use crate::playlist::PlaylistError;

/// Errors surfaced by the session command surface.
#[derive(Debug, Error)]
pub enum SessionError {
  /// MPV could not be started or connected to.
  #[error(transparent)]
  Startup(MpvError),

  #[error("Mpv not ready yet!")]
  NotReady,

  #[error("Already attempting to show video!")]
  AlreadyTransitioning,

  #[error(transparent)]
  Playlist(#[from] PlaylistError),

  #[error(transparent)]
  Mpv(#[from] MpvError),

  #[error(transparent)]
  Display(#[from] DisplayError),
}

impl From<IpcError> for SessionError {
  fn from(e: IpcError) -> Self {
    SessionError::Mpv(MpvError::Ipc(e))
  }
}

impl SessionError {
  pub fn severity(&self) -> Severity {
    match self {
      SessionError::Playlist(PlaylistError::SmallPlaylist) => Severity::Warn,
      _ => Severity::Error,
    }
  }

  /// MPV rejections already reach the user through the `error` event.
  pub fn is_reported_by_mpv(&self) -> bool {
    matches!(self, SessionError::Mpv(MpvError::Ipc(IpcError::Rejected { .. })))
  }
}
