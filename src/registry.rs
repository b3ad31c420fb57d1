//! Table of live sessions, keyed by their player on the display.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::display::{PlayerKey, SurfaceId};
use crate::player::Session;

#[derive(Default)]
pub struct SessionRegistry {
  sessions: RwLock<HashMap<PlayerKey, Session>>,
}

impl SessionRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `session` under its current key. Returns any session it replaced.
  pub fn insert(&self, session: Session) -> Option<Session> {
    let key = session.key();
    log::debug!("Registering session {:?}", key);
    self.sessions.write().insert(key, session)
  }

  pub fn get(&self, key: &PlayerKey) -> Option<Session> {
    self.sessions.read().get(key).cloned()
  }

  pub fn remove(&self, key: &PlayerKey) -> Option<Session> {
    self.sessions.write().remove(key)
  }

  /// Move a session to a new key, after its player moved to another surface.
  pub fn rekey(&self, old: &PlayerKey, new: PlayerKey) -> bool {
    let mut sessions = self.sessions.write();
    match sessions.remove(old) {
      Some(session) => {
        log::debug!("Moving session {:?} to {:?}", old, new);
        sessions.insert(new, session);
        true
      }
      None => false,
    }
  }

  /// Sessions whose player lives on `surface`.
  pub fn in_surface(&self, surface: SurfaceId) -> Vec<Session> {
    self
      .sessions
      .read()
      .iter()
      .filter(|(key, _)| key.surface == surface)
      .map(|(_, session)| session.clone())
      .collect()
  }

  pub fn all(&self) -> Vec<Session> {
    self.sessions.read().values().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.sessions.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.sessions.read().is_empty()
  }

  /// Close every session, e.g. when the editor exits.
  pub async fn close_all(&self) {
    let sessions: Vec<Session> = self.sessions.write().drain().map(|(_, s)| s).collect();
    for session in sessions {
      session.close().await;
    }
  }
}
