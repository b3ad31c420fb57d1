//! Playlist reconciliation errors.

use thiserror::Error;

use crate::display::DisplayHandle;

/// Failures mapping between MPV playlist ids and display handles.
#[derive(Debug, Error, PartialEq)]
pub enum PlaylistError {
  #[error("Playlist transition failed!")]
  Unresolved(Option<i64>),

  #[error("Refusing to set playlist index on small playlist!")]
  SmallPlaylist,

  #[error("Could not find mpv item!")]
  UnknownHandle(DisplayHandle),

  #[error("Could not find mpv item!")]
  NotInPlaylist(i64),

  #[error("Attempted to update playlist, but could not find original player!")]
  MissingOrigin(i64),

  #[error("Cannot create new buffer for playlist of initial size {0}!")]
  ReplaceNeedsSingleItem(usize),

  #[error("Lines do not contain a file path or valid URL")]
  Empty,
}
