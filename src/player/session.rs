//! Session - one MPV process, its playlist mapping and its player on the
//! display.
//!
//! The session owns the reconciler and the connected client. MPV events are
//! consumed by a listener task per client; user commands come in through the
//! async methods below and report failures to the display themselves.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::watch;

use super::error::SessionError;
use crate::config::PluginConfig;
use crate::display::{DisplayHandle, DisplaySurface, PlayerKey, Severity, SurfaceId};
use crate::mpv::{
  ipc_path, EngineEvent, LaunchOptions, MpvClient, MpvCommand, MpvEvent, PlaylistDelta,
  ProtocolEngine, ProtocolFailure,
};
use crate::playlist::{
  build_items, can_markdown, markdown_line, DeltaPlan, LoadResolution, PlaylistError,
  PlaylistItem, PlaylistSeed, Reconciler, UpdateAction,
};

/// Properties every session observes, whatever the status line shows.
const ALWAYS_OBSERVED: &[&str] = &["pause", "playlist", "video-format"];

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  Spawning,
  Ready,
  /// Relaunching MPV with a different capability set.
  Transitioning,
  Closed,
}

impl Lifecycle {
  fn is_busy(self) -> bool {
    matches!(self, Lifecycle::Spawning | Lifecycle::Transitioning)
  }
}

/// What a new session plays and how.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
  /// References per display line.
  pub seeds: Vec<PlaylistSeed>,
  /// Filetype of the surface. Lines are rewritten as markdown links when the
  /// configuration lists it as writable.
  pub filetype: Option<String>,
  /// MPV arguments for this session, after the configured defaults.
  pub args: Vec<String>,
  /// Overrides the configured update action.
  pub update_action: Option<UpdateAction>,
}

struct SessionState {
  key: PlayerKey,
  args: Vec<String>,
  update_action: UpdateAction,
  reconciler: Reconciler,
  /// Status redraws are suspended between a file starting and loading.
  no_draw: bool,
}

struct SessionInner {
  display: Arc<dyn DisplaySurface>,
  config: Arc<PluginConfig>,
  state: Mutex<SessionState>,
  client: Mutex<Option<Arc<MpvClient>>>,
  lifecycle: watch::Sender<Lifecycle>,
}

/// Handle to one session. Clones share the same session.
#[derive(Clone)]
pub struct Session {
  inner: Arc<SessionInner>,
}

/// Update action for a new playlist: an explicit request wins, then a
/// single query reference may pick its own, then the configured default.
fn initial_action(
  config: &PluginConfig,
  items: &BTreeMap<i64, PlaylistItem>,
  requested: Option<UpdateAction>,
) -> Result<UpdateAction, PlaylistError> {
  let mut action = config.on_playlist_update;
  if items.len() == 1 {
    if config.smart_query_playlist {
      if let Some(item) = items.values().next() {
        if let Some(smart) = config.query_predicate.evaluate(&item.filename) {
          action = smart;
        }
      }
    }
  } else if requested == Some(UpdateAction::Replace) {
    return Err(PlaylistError::ReplaceNeedsSingleItem(items.len()));
  }
  Ok(requested.unwrap_or(action))
}

impl Session {
  /// Create the player on the display and the id mapping. MPV is not started.
  pub fn create(
    display: Arc<dyn DisplaySurface>,
    config: Arc<PluginConfig>,
    surface: SurfaceId,
    options: SessionOptions,
  ) -> Result<Self, SessionError> {
    let result = Self::build(display.clone(), config, surface, options);
    if let Err(e) = &result {
      log::error!("Could not create session: {}", e);
      display.show_error(&e.to_string(), e.severity());
    }
    result
  }

  fn build(
    display: Arc<dyn DisplaySurface>,
    config: Arc<PluginConfig>,
    surface: SurfaceId,
    options: SessionOptions,
  ) -> Result<Self, SessionError> {
    let mut seeds: Vec<PlaylistSeed> = options
      .seeds
      .into_iter()
      .filter(|seed| !seed.references.is_empty())
      .collect();
    if seeds.is_empty() {
      return Err(PlaylistError::Empty.into());
    }
    seeds.sort_by_key(|seed| seed.line);

    let markdown = options
      .filetype
      .as_deref()
      .is_some_and(|filetype| config.is_markdown_writable(filetype));
    let lines: Vec<usize> = seeds.iter().map(|seed| seed.line).collect();
    let (root, handles) = display.create_player(surface, &lines)?;
    let items = build_items(&seeds, &handles, markdown);
    let update_action = initial_action(&config, &items, options.update_action)?;

    log::info!(
      "Created player {:?} with {} items, update action {:?}",
      root,
      items.len(),
      update_action
    );
    log::debug!("items: {:?}", items);

    let (lifecycle, _) = watch::channel(Lifecycle::Spawning);
    Ok(Self {
      inner: Arc::new(SessionInner {
        display,
        config,
        state: Mutex::new(SessionState {
          key: PlayerKey { surface, root },
          args: options.args,
          update_action,
          reconciler: Reconciler::new(items),
          no_draw: true,
        }),
        client: Mutex::new(None),
        lifecycle,
      }),
    })
  }

  /// Create a session and start MPV for it in the background.
  pub fn open(
    display: Arc<dyn DisplaySurface>,
    config: Arc<PluginConfig>,
    surface: SurfaceId,
    options: SessionOptions,
  ) -> Result<Self, SessionError> {
    let session = Self::create(display, config, surface, options)?;
    let spawning = session.clone();
    tokio::spawn(async move {
      let _ = spawning.spawn().await;
    });
    Ok(session)
  }

  pub fn key(&self) -> PlayerKey {
    self.inner.state.lock().key
  }

  pub fn lifecycle(&self) -> Lifecycle {
    *self.inner.lifecycle.borrow()
  }

  pub fn is_closed(&self) -> bool {
    self.lifecycle() == Lifecycle::Closed
  }

  pub fn update_action(&self) -> UpdateAction {
    self.inner.state.lock().update_action
  }

  fn launch_options(&self) -> LaunchOptions {
    let config = &self.inner.config;
    let mut args = config.default_args.clone();
    args.extend(self.inner.state.lock().args.iter().cloned());
    LaunchOptions {
      mpv_path: config.mpv_path.clone(),
      args,
      socket: ipc_path(&config.socket_dir()),
      startup_timeout: config.startup_timeout(),
      connect_timeout: config.connect_timeout(),
    }
  }

  /// Launch MPV and attach to it. A failed launch closes the session.
  pub async fn spawn(&self) -> Result<(), SessionError> {
    let options = self.launch_options();
    log::debug!("Spawning mpv with args {:?}", options.args);

    match MpvClient::launch(&options).await {
      Ok(client) => {
        if self.is_closed() {
          log::info!("Session closed while mpv was starting");
          client.stop().await;
          return Ok(());
        }
        self.attach_or_close(client).await
      }
      Err(e) => {
        let err = SessionError::Startup(e);
        log::error!("mpv encountered error: {}", err);
        self.inner.display.show_error(&err.to_string(), err.severity());
        self.close().await;
        Err(err)
      }
    }
  }

  /// Drive an already connected client, as if it had just been spawned.
  pub async fn attach(&self, client: MpvClient) -> Result<(), SessionError> {
    self.attach_or_close(client).await
  }

  /// A client that cannot be set up leaves nothing to play with.
  async fn attach_or_close(&self, client: MpvClient) -> Result<(), SessionError> {
    let result = self.attach_client(client, true);
    if result.is_err() {
      self.close().await;
    }
    self.report(result)
  }

  fn attach_client(&self, client: MpvClient, autoplay: bool) -> Result<(), SessionError> {
    if self.is_closed() {
      return Err(SessionError::NotReady);
    }
    let client = Arc::new(client);
    // Stored first so a failed setup is torn down by close().
    *self.inner.client.lock() = Some(client.clone());
    let engine = client.engine();

    for name in ALWAYS_OBSERVED {
      engine.observe(name)?;
    }
    for name in &self.inner.config.observed_properties {
      engine.observe(name)?;
    }

    let files = self.inner.state.lock().reconciler.load_order();
    log::info!("Loading playlist!");
    log::debug!("{:?}", files);
    for file in &files {
      client.loadfile(file, autoplay)?;
    }

    self.start_event_listener(client);
    self.inner.lifecycle.send_replace(Lifecycle::Ready);
    Ok(())
  }

  fn current_client(&self) -> Option<Arc<MpvClient>> {
    self.inner.client.lock().clone()
  }

  fn is_current(&self, client: &Arc<MpvClient>) -> bool {
    self
      .current_client()
      .is_some_and(|current| Arc::ptr_eq(&current, client))
  }

  fn ready_client(&self) -> Result<Arc<MpvClient>, SessionError> {
    if self.lifecycle() != Lifecycle::Ready {
      return Err(SessionError::NotReady);
    }
    self.current_client().ok_or(SessionError::NotReady)
  }

  /// Wait until the session is neither spawning nor relaunching.
  async fn settled(&self) {
    let mut rx = self.inner.lifecycle.subscribe();
    let _ = rx.wait_for(|state| !state.is_busy()).await;
  }

  fn report<T>(&self, result: Result<T, SessionError>) -> Result<T, SessionError> {
    if let Err(e) = &result {
      log::error!("{}", e);
      if !e.is_reported_by_mpv() {
        self.inner.display.show_error(&e.to_string(), e.severity());
      }
    }
    result
  }

  // ==========================================================================
  // Event handling
  // ==========================================================================

  fn start_event_listener(&self, client: Arc<MpvClient>) {
    let session = self.clone();
    let events = client.events();

    tokio::spawn(async move {
      log::info!("MPV event listener started");
      while let Ok(event) = events.recv().await {
        if !session.is_current(&client) {
          log::debug!("Dropping event {} from a replaced client", event.name());
          continue;
        }
        session.handle_event(&client, event).await;
      }
      log::debug!("MPV event listener finished");
    });
  }

  async fn handle_event(&self, client: &Arc<MpvClient>, event: EngineEvent) {
    match event {
      EngineEvent::Mpv(event) => match event.event.as_str() {
        "property-change" => self.draw_update(client.engine(), None),
        "start-file" => {
          let mut state = self.inner.state.lock();
          state.no_draw = true;
          state.reconciler.on_start_file(event.playlist_entry_id);
        }
        "file-loaded" => self.on_file_loaded(client.engine(), event.playlist_entry_id),
        "end-file" => self.on_end_file(&event),
        _ => {}
      },
      EngineEvent::Error(failure) => self.on_error(&failure),
      EngineEvent::PlaylistDelta(delta) => self.on_playlist_delta(&delta),
      EngineEvent::Closed => {
        if self.lifecycle() == Lifecycle::Transitioning {
          log::debug!("mpv closed during transition");
          return;
        }
        log::info!("mpv closed, closing session");
        self.close().await;
      }
    }
  }

  /// Redraw the player line. Without `forced_text` nothing is drawn while
  /// drawing is suspended.
  fn draw_update(&self, engine: &ProtocolEngine, forced_text: Option<&str>) {
    let key = {
      let state = self.inner.state.lock();
      if state.no_draw && forced_text.is_none() {
        return;
      }
      state.key
    };
    self
      .inner
      .display
      .render_status(key, &engine.properties(), forced_text);
  }

  fn on_end_file(&self, event: &MpvEvent) {
    let key = {
      let mut state = self.inner.state.lock();
      state.no_draw = true;
      state.key
    };
    self.inner.display.render_status(key, &Map::new(), Some(""));

    if event.reason.as_deref() == Some("error") {
      if let Some(error) = &event.file_error {
        self
          .inner
          .display
          .show_error(&format!("File ended: {}", error), Severity::Error);
      }
    }
  }

  fn on_error(&self, failure: &ProtocolFailure) {
    let mut message = format!("mpv responded '{}'", failure.message);
    if let Some(property) = &failure.property {
      message.push_str(&format!(" to request for property '{}'", property));
    }
    log::error!("Error occurred: {:?}", failure);
    self
      .inner
      .display
      .show_error(&message, Severity::Error);
  }

  fn on_file_loaded(&self, engine: &Arc<ProtocolEngine>, entry_id: Option<i64>) {
    let (resolution, key) = {
      let mut state = self.inner.state.lock();
      (state.reconciler.on_file_loaded(entry_id), state.key)
    };

    match resolution {
      LoadResolution::Stale { expected, got } => {
        log::debug!("Ignoring file-loaded for {} while expecting {:?}", got, expected);
      }
      LoadResolution::Direct { id, item } => {
        self.move_player(key, &item);
        if item.show_current {
          self.show_current_title(engine, id, item.handle);
        } else if item.rewrite {
          self.spawn_markdown_rewrite(engine.clone(), item);
        }
      }
      LoadResolution::Remapped { id, origin, .. } => {
        self.move_player(key, &origin);
        self.show_current_title(engine, id, origin.handle);
      }
      LoadResolution::Unresolved { id } => {
        log::debug!("No playlist item for mpv id {:?}", id);
        self.inner.state.lock().no_draw = false;
        let _ = self.report::<()>(Err(PlaylistError::Unresolved(id).into()));
      }
    }
  }

  fn move_player(&self, key: PlayerKey, item: &PlaylistItem) {
    if let Err(e) = self.inner.display.move_player(key, item.handle, None) {
      log::debug!("Could not move the player: {}", e);
      self.inner.display.show_error(
        &format!("Could not move the player (current file: {})!", item.filename),
        Severity::Error,
      );
    }
    self.inner.state.lock().no_draw = false;
  }

  fn show_current_title(&self, engine: &ProtocolEngine, id: i64, handle: DisplayHandle) {
    let snapshot = engine.playlist();
    let (title, key) = {
      let mut state = self.inner.state.lock();
      if let Some(entry) = snapshot.iter().find(|entry| entry.id == id) {
        if let Some(title) = &entry.title {
          state.reconciler.remember_title(&entry.filename, title);
        }
      }
      (state.reconciler.current_title(id, &snapshot), state.key)
    };

    let Some(title) = title else {
      log::info!("Currently playing title is None, ignoring currently playing update!");
      return;
    };
    log::info!("Updating currently playing!");
    if let Err(e) = self.inner.display.show_playing(key, handle, &title) {
      log::error!("Error updating currently playing title: {}", e);
      self.inner.display.show_error(
        "Error updating currently playing title!",
        Severity::Error,
      );
    }
  }

  /// Once MPV knows the title, rewrite the item's line as a markdown link.
  fn spawn_markdown_rewrite(&self, engine: Arc<ProtocolEngine>, item: PlaylistItem) {
    let session = self.clone();
    tokio::spawn(async move {
      let title = match engine.get("media-title").await {
        Ok(Value::String(title)) => title,
        Ok(other) => {
          log::debug!("media-title is not a string: {:?}", other);
          return;
        }
        Err(e) => {
          log::debug!("Could not get media-title: {}", e);
          return;
        }
      };
      let filename = match engine.get("filename").await {
        Ok(value) => value,
        Err(e) => {
          log::debug!("Could not get filename: {}", e);
          return;
        }
      };

      let key = {
        let mut state = session.inner.state.lock();
        state.reconciler.remember_title(&item.filename, &title);
        state.key
      };
      if filename.as_str() == Some(title.as_str()) || !can_markdown(&item.filename) {
        return;
      }

      let line = markdown_line(&title, &item.filename);
      let result = session
        .inner
        .display
        .write_line(key, item.handle, &line)
        .map_err(SessionError::from);
      let _ = session.report(result);
    });
  }

  fn on_playlist_delta(&self, delta: &PlaylistDelta) {
    let (plan, key) = {
      let mut state = self.inner.state.lock();
      let action = state.update_action;
      (state.reconciler.plan_delta(delta, action), state.key)
    };
    let plan = match plan {
      Ok(plan) => plan,
      Err(e) => {
        let _ = self.report::<()>(Err(e.into()));
        return;
      }
    };

    match plan {
      DeltaPlan::Stay { remapped } => {
        log::debug!("Kept display as is, remapped {} entries", remapped);
      }
      DeltaPlan::Paste {
        origin_id,
        origin,
        lines,
        current_line,
        markdown,
        entries,
      } => {
        log::info!("Pasting new playlist!");
        let result = self
          .inner
          .display
          .paste_lines(key, origin, &lines, current_line)
          .map_err(SessionError::from);
        if let Ok(handles) = self.report(result) {
          self
            .inner
            .state
            .lock()
            .reconciler
            .bind_pasted(origin_id, &entries, &handles, markdown);
        }
      }
      DeltaPlan::Replace {
        origin,
        lines,
        entries,
        ..
      } => {
        log::info!("Opening new playlist surface!");
        let result = self
          .inner
          .display
          .open_surface(key, origin, &lines)
          .map_err(SessionError::from);
        if let Ok((new_key, handles)) = self.report(result) {
          {
            let mut state = self.inner.state.lock();
            state.reconciler.rebuild(&entries, &handles);
            state.key = new_key;
          }
          self.inner.display.player_moved(key, new_key);
        }
      }
    }
  }

  // ==========================================================================
  // Commands
  // ==========================================================================

  pub async fn toggle_pause(&self) -> Result<(), SessionError> {
    let result = async {
      let client = self.ready_client()?;
      let engine = client.engine();
      let paused = engine
        .cached("pause")
        .and_then(|value| value.as_bool())
        .unwrap_or(false);
      engine.set("pause", Value::Bool(!paused), false).await?;
      Ok::<(), SessionError>(())
    }
    .await;
    self.report(result)
  }

  /// Send a raw command, e.g. `["seek", 10]`.
  pub fn send_command(&self, args: Vec<Value>) -> Result<(), SessionError> {
    let result = self.ready_client().and_then(|client| {
      client
        .engine()
        .send(MpvCommand::new(args))
        .map_err(SessionError::from)
    });
    self.report(result)
  }

  pub async fn get_property(&self, name: &str) -> Result<Value, SessionError> {
    let result = async {
      let client = self.ready_client()?;
      Ok::<Value, SessionError>(client.engine().get(name).await?)
    }
    .await;
    self.report(result)
  }

  pub async fn set_property(
    &self,
    name: &str,
    value: Value,
    wait_for_ack: bool,
  ) -> Result<(), SessionError> {
    let result = async {
      let client = self.ready_client()?;
      Ok::<(), SessionError>(client.engine().set(name, value, wait_for_ack).await?)
    }
    .await;
    self.report(result)
  }

  /// Press `key` `count` times, then refresh every observed property.
  /// `q` closes the session.
  pub async fn send_keypress(&self, key: &str, count: usize) -> Result<(), SessionError> {
    if key == "q" {
      self.close().await;
      return Ok(());
    }

    let result = async {
      let client = self.ready_client()?;
      for _ in 0..count.max(1) {
        client.keypress(key)?;
      }
      // The keypress has to take effect before properties change.
      tokio::time::sleep(self.inner.config.keypress_delay()).await;
      client.engine().fetch_observed();
      Ok::<(), SessionError>(())
    }
    .await;
    self.report(result)
  }

  /// Play the entry bound to `handle` now.
  pub async fn set_current_by_handle(&self, handle: DisplayHandle) -> Result<(), SessionError> {
    self.settled().await;
    let result = (|| -> Result<(), SessionError> {
      let client = self.ready_client()?;
      let snapshot = client.engine().playlist();
      let index = self.inner.state.lock().reconciler.play_index(handle, &snapshot)?;
      client.play_index(index as i64)?;
      Ok(())
    })();
    self.report(result)
  }

  /// Remove the entries bound to deleted display handles from MPV.
  pub async fn forward_deletions(&self, removed: &[DisplayHandle]) -> Result<(), SessionError> {
    self.settled().await;
    let result = (|| -> Result<(), SessionError> {
      let client = self.ready_client()?;
      let snapshot = client.engine().playlist();
      let indices = self
        .inner
        .state
        .lock()
        .reconciler
        .deletion_indices(removed, &snapshot);
      for index in indices {
        client.remove_index(index)?;
      }
      Ok(())
    })();
    self.report(result)
  }

  /// Show video. A player with a video track just cycles it; otherwise MPV
  /// is relaunched with video enabled at the same position.
  pub async fn toggle_video(&self) -> Result<(), SessionError> {
    let result = self.relaunch_with_video().await;
    self.report(result)
  }

  async fn relaunch_with_video(&self) -> Result<(), SessionError> {
    if self.lifecycle() == Lifecycle::Transitioning {
      return Err(SessionError::AlreadyTransitioning);
    }
    let client = self.ready_client()?;
    let engine = client.engine().clone();

    let track_list = engine.get("track-list").await?;
    let has_video = track_list
      .as_array()
      .is_some_and(|tracks| tracks.iter().any(|t| t.get("type") == Some(&Value::from("video"))));
    if has_video {
      log::info!("Player has video track. Cycling video instead.");
      client.cycle("video")?;
      return Ok(());
    }

    let position = engine.get("playlist-pos").await?.as_i64().unwrap_or(0);
    let time = engine
      .get("playback-time")
      .await
      .ok()
      .and_then(|value| value.as_f64());
    let snapshot = engine.playlist();

    let started = self.inner.lifecycle.send_if_modified(|state| {
      if *state == Lifecycle::Ready {
        *state = Lifecycle::Transitioning;
        true
      } else {
        false
      }
    });
    if !started {
      return Err(SessionError::AlreadyTransitioning);
    }

    log::info!("Beginning transition...");
    let (key, position) = {
      let mut state = self.inner.state.lock();
      state.no_draw = true;
      state.args.push("--video=auto".to_string());
      (state.key, state.reconciler.reorder_by_index(&snapshot, position))
    };

    let closed = engine.next_event("close");
    if let Err(e) = client.quit() {
      log::debug!("Could not send quit: {}", e);
    }
    let _ = closed.await;
    client.stop().await;
    self.inner.display.render_status(key, &Map::new(), Some(""));

    log::info!("Spawning player...");
    let new_client = match MpvClient::launch(&self.launch_options()).await {
      Ok(client) => client,
      Err(e) => {
        self.close().await;
        return Err(SessionError::Startup(e));
      }
    };
    let loaded = new_client.engine().next_event("file-loaded");
    if let Err(e) = self.attach_client(new_client, false) {
      self.close().await;
      return Err(e);
    }

    log::info!("Transition finished! Setting playlist index to {}...", position);
    let client = self.ready_client()?;
    client.play_index(position)?;
    client.engine().refresh("playlist", false)?;

    log::info!("Waiting for file to be loaded...");
    loaded.await?;
    if let Some(time) = time {
      log::info!("File loaded! Seeking...");
      client.seek(time)?;
    }
    Ok(())
  }

  /// Quit MPV and remove the player. Closing twice does nothing.
  pub async fn close(&self) {
    let previous = self.inner.lifecycle.send_replace(Lifecycle::Closed);
    if previous == Lifecycle::Closed {
      return;
    }

    let client = self.inner.client.lock().take();
    if let Some(client) = client {
      if let Err(e) = client.quit() {
        log::debug!("Could not send quit: {}", e);
      }
      client.stop().await;
    }

    let key = self.key();
    self.inner.display.remove_player(key);
    log::info!("Session {:?} closed", key);
  }
}
