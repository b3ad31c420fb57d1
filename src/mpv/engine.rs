//! Request correlation, event demultiplexing and the property cache.
//!
//! The engine is transport-agnostic: outbound lines go to a writer channel,
//! inbound lines are pushed in through [`ProtocolEngine::handle_line`]. All
//! tables sit behind one mutex whose guard is never held across an await.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use super::ipc::{IpcError, WriteMessage};
use super::protocol::{MpvCommand, MpvEvent, MpvMessage, MpvResponse, PlaylistEntry};

/// Event name of the synthetic redirect notification.
pub const PLAYLIST_DELTA_EVENT: &str = "got-playlist-delta";

/// First id handed out. Low ids stay free for callers that hardcode observers.
const FIRST_ID: i64 = 20;

/// A redirect expanded one playlist entry into several new ones.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistDelta {
  /// Entry that was redirected.
  pub original_id: i64,
  /// Id of the first inserted entry.
  pub insert_start: i64,
  /// Number of contiguous inserted entries.
  pub insert_count: i64,
  /// Full playlist as reported after the redirect.
  pub snapshot: Vec<PlaylistEntry>,
}

impl PlaylistDelta {
  /// Snapshot entries that belong to the inserted range.
  pub fn inserted(&self) -> Vec<PlaylistEntry> {
    let end = self.insert_start + self.insert_count;
    self
      .snapshot
      .iter()
      .filter(|entry| entry.id >= self.insert_start && entry.id < end)
      .cloned()
      .collect()
  }
}

/// Error reported by MPV for a correlated command.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolFailure {
  pub request_id: i64,
  pub message: String,
  pub property: Option<String>,
}

/// Everything the engine dispatches to the session.
#[derive(Debug, Clone)]
pub enum EngineEvent {
  Mpv(MpvEvent),
  Error(ProtocolFailure),
  PlaylistDelta(PlaylistDelta),
  Closed,
}

impl EngineEvent {
  /// Name used for event waiters.
  pub fn name(&self) -> &str {
    match self {
      EngineEvent::Mpv(event) => &event.event,
      EngineEvent::Error(_) => "error",
      EngineEvent::PlaylistDelta(_) => PLAYLIST_DELTA_EVENT,
      EngineEvent::Closed => "close",
    }
  }
}

/// Header of the playlist fetch issued after a redirect.
#[derive(Debug, Clone, Copy)]
struct DeltaHeader {
  original_id: i64,
  insert_start: i64,
  insert_count: i64,
}

#[derive(Debug)]
enum PendingKind {
  Get(String),
  Set(String, Value),
  Command,
  PlaylistDelta(DeltaHeader),
}

impl PendingKind {
  fn property(&self) -> Option<&str> {
    match self {
      PendingKind::Get(name) | PendingKind::Set(name, _) => Some(name),
      _ => None,
    }
  }
}

type Completion = oneshot::Sender<Result<Value, IpcError>>;

/// Request waiting for its reply.
struct PendingRequest {
  kind: PendingKind,
  completion: Option<Completion>,
}

#[derive(Default)]
struct EngineState {
  next_id: i64,
  observers: HashMap<String, i64>,
  observer_names: HashMap<i64, String>,
  observed: Vec<String>,
  pending: HashMap<i64, PendingRequest>,
  ignore_errors: HashSet<i64>,
  waiters: HashMap<String, VecDeque<oneshot::Sender<EngineEvent>>>,
  cache: HashMap<String, Value>,
  last_entry_id: Option<i64>,
  closed: bool,
}

impl EngineState {
  fn allocate_id(&mut self) -> i64 {
    let id = self.next_id;
    self.next_id += 1;
    id
  }

  /// Observer id for `name`, assigned on first use.
  fn property_id(&mut self, name: &str) -> i64 {
    if let Some(id) = self.observers.get(name) {
      return *id;
    }
    let id = self.allocate_id();
    self.observers.insert(name.to_string(), id);
    self.observer_names.insert(id, name.to_string());
    id
  }

  fn take_waiters(&mut self, name: &str) -> VecDeque<oneshot::Sender<EngineEvent>> {
    self.waiters.remove(name).unwrap_or_default()
  }
}

/// Receiving ends handed to the transport and the session.
pub struct EngineChannels {
  /// Serialized lines for the writer task.
  pub writes: Receiver<WriteMessage>,
  /// Events for the session dispatch loop.
  pub events: Receiver<EngineEvent>,
}

/// Correlates commands with replies over one IPC connection.
pub struct ProtocolEngine {
  state: Mutex<EngineState>,
  write_tx: Sender<WriteMessage>,
  event_tx: Sender<EngineEvent>,
}

/// Future returned by [`ProtocolEngine::next_event`].
pub type EventWait = std::pin::Pin<Box<dyn Future<Output = Result<EngineEvent, IpcError>> + Send>>;

impl ProtocolEngine {
  /// Create an engine and the channels its collaborators consume.
  pub fn new() -> (Arc<Self>, EngineChannels) {
    let (write_tx, writes) = async_channel::unbounded();
    let (event_tx, events) = async_channel::unbounded();
    let engine = Arc::new(Self {
      state: Mutex::new(EngineState {
        next_id: FIRST_ID,
        ..Default::default()
      }),
      write_tx,
      event_tx,
    });
    (engine, EngineChannels { writes, events })
  }

  fn write(&self, cmd: &MpvCommand) -> Result<(), IpcError> {
    let json = cmd.to_line().map_err(|e| IpcError::WriteFailed(e.into()))?;
    log::debug!("Sending MPV command: {}", json);
    self
      .write_tx
      .try_send(WriteMessage::Line(json.into_bytes()))
      .map_err(|_| IpcError::Disconnected)
  }

  /// Send a command without expecting a reply.
  pub fn send(&self, cmd: MpvCommand) -> Result<(), IpcError> {
    if self.state.lock().closed {
      return Err(IpcError::Disconnected);
    }
    self.write(&cmd.with_request_id(0))
  }

  /// Send a command under `request_id`, optionally tagged so an error reply
  /// is dropped silently.
  fn send_tagged(&self, cmd: MpvCommand, request_id: i64, ignore_error: bool) -> Result<(), IpcError> {
    {
      let mut state = self.state.lock();
      if state.closed {
        return Err(IpcError::Disconnected);
      }
      if ignore_error {
        state.ignore_errors.insert(request_id);
      }
    }
    self.write(&cmd.with_request_id(request_id))
  }

  /// Register a pending request and write its command.
  fn start_request(
    &self,
    cmd: MpvCommand,
    kind: PendingKind,
  ) -> Result<oneshot::Receiver<Result<Value, IpcError>>, IpcError> {
    let (tx, rx) = oneshot::channel();
    let request_id = {
      let mut state = self.state.lock();
      if state.closed {
        return Err(IpcError::Disconnected);
      }
      let request_id = state.allocate_id();
      state.pending.insert(
        request_id,
        PendingRequest {
          kind,
          completion: Some(tx),
        },
      );
      request_id
    };

    if let Err(e) = self.write(&cmd.with_request_id(request_id)) {
      self.state.lock().pending.remove(&request_id);
      return Err(e);
    }
    Ok(rx)
  }

  async fn await_reply(rx: oneshot::Receiver<Result<Value, IpcError>>) -> Result<Value, IpcError> {
    match rx.await {
      Ok(result) => result,
      Err(_) => Err(IpcError::Disconnected),
    }
  }

  /// Send a command and wait for its reply data.
  pub async fn request(&self, cmd: MpvCommand) -> Result<Value, IpcError> {
    let rx = self.start_request(cmd, PendingKind::Command)?;
    Self::await_reply(rx).await
  }

  /// Observe a property. Repeated calls reuse the same observer id.
  pub fn observe(&self, name: &str) -> Result<i64, IpcError> {
    let (id, fresh) = {
      let mut state = self.state.lock();
      let id = state.property_id(name);
      if state.observed.iter().any(|p| p == name) {
        (id, false)
      } else {
        state.observed.push(name.to_string());
        (id, true)
      }
    };
    if fresh {
      self.send(MpvCommand::observe_property(id, name))?;
    }
    Ok(id)
  }

  /// Fire-and-forget refresh of one property into the cache.
  pub fn refresh(&self, name: &str, ignore_error: bool) -> Result<(), IpcError> {
    let id = self.state.lock().property_id(name);
    self.send_tagged(MpvCommand::get_property(name), id, ignore_error)
  }

  /// Fetch a property, updating the cache with the reply.
  pub async fn get(&self, name: &str) -> Result<Value, IpcError> {
    let rx = self.start_request(
      MpvCommand::get_property(name),
      PendingKind::Get(name.to_string()),
    )?;
    Self::await_reply(rx).await
  }

  /// Set a property. With `wait_for_ack` the cache changes only once MPV has
  /// acknowledged the write.
  pub async fn set(&self, name: &str, value: Value, wait_for_ack: bool) -> Result<(), IpcError> {
    if !wait_for_ack {
      return self.send(MpvCommand::set_property(name, value));
    }
    let rx = self.start_request(
      MpvCommand::set_property(name, value.clone()),
      PendingKind::Set(name.to_string(), value),
    )?;
    Self::await_reply(rx).await.map(|_| ())
  }

  /// Re-fetch every observed property, ignoring errors.
  pub fn fetch_observed(&self) {
    let names = self.state.lock().observed.clone();
    for name in names {
      if let Err(e) = self.refresh(&name, true) {
        log::debug!("Could not refresh {}: {}", name, e);
        break;
      }
    }
  }

  /// Wait for the next event called `name`.
  ///
  /// The waiter is registered before this returns, so an event caused by a
  /// command sent afterwards cannot be missed.
  pub fn next_event(&self, name: &str) -> EventWait {
    let (tx, rx) = oneshot::channel();
    {
      let mut state = self.state.lock();
      if state.closed {
        return Box::pin(async { Err(IpcError::Disconnected) });
      }
      state.waiters.entry(name.to_string()).or_default().push_back(tx);
    }
    Box::pin(async move { rx.await.map_err(|_| IpcError::Disconnected) })
  }

  /// Cached value of a property.
  pub fn cached(&self, name: &str) -> Option<Value> {
    self.state.lock().cache.get(name).cloned()
  }

  /// Snapshot of the cache without the playlist, for status rendering.
  pub fn properties(&self) -> serde_json::Map<String, Value> {
    let state = self.state.lock();
    state
      .cache
      .iter()
      .filter(|(name, _)| name.as_str() != "playlist")
      .map(|(name, value)| (name.clone(), value.clone()))
      .collect()
  }

  /// Last known playlist.
  pub fn playlist(&self) -> Vec<PlaylistEntry> {
    self
      .cached("playlist")
      .map(|value| PlaylistEntry::parse_list(&value))
      .unwrap_or_default()
  }

  /// Observer id already assigned to `name`, if any.
  pub fn observer_id(&self, name: &str) -> Option<i64> {
    self.state.lock().observers.get(name).copied()
  }

  /// Entry id of the last `start-file` event.
  pub fn last_entry_id(&self) -> Option<i64> {
    self.state.lock().last_entry_id
  }

  pub fn is_closed(&self) -> bool {
    self.state.lock().closed
  }

  /// Ask the writer task to finish.
  pub fn close_writer(&self) {
    let _ = self.write_tx.try_send(WriteMessage::Close);
  }

  /// Decode and route one inbound line.
  pub fn handle_line(&self, line: &str) {
    match MpvMessage::parse(line) {
      Ok(MpvMessage::Response(response)) => self.handle_response(response),
      Ok(MpvMessage::Event(event)) => self.handle_event(event),
      Err(e) => log::warn!("Failed to parse MPV message: {} - {}", e, line),
    }
  }

  fn handle_response(&self, response: MpvResponse) {
    let request_id = response.request_id;
    let mut state = self.state.lock();
    let ignorable = state.ignore_errors.remove(&request_id);

    if !response.is_success() {
      let message = response.error.unwrap_or_default();
      let pending = state.pending.remove(&request_id);
      let property = state
        .observer_names
        .get(&request_id)
        .cloned()
        .or_else(|| {
          pending
            .as_ref()
            .and_then(|p| p.kind.property().map(str::to_string))
        });

      if let Some(completion) = pending.and_then(|p| p.completion) {
        let _ = completion.send(Err(IpcError::Rejected {
          message: message.clone(),
          property: property.clone(),
        }));
      }

      if ignorable {
        log::debug!("Ignoring error response {}: {}", request_id, message);
        return;
      }

      let failure = ProtocolFailure {
        request_id,
        message,
        property,
      };
      let waiters = state.take_waiters("error");
      drop(state);
      self.dispatch(EngineEvent::Error(failure), waiters);
      return;
    }

    if let Some(name) = state.observer_names.get(&request_id).cloned() {
      log::debug!("Got property {}: {:?}", name, response.data);
      state
        .cache
        .insert(name, response.data.unwrap_or(Value::Null));
      return;
    }

    let Some(pending) = state.pending.remove(&request_id) else {
      log::debug!("Unrecognized data from mpv: {:?}", response);
      return;
    };

    let data = response.data.unwrap_or(Value::Null);
    match pending.kind {
      PendingKind::Get(name) => {
        log::debug!("Got awaited property {}: {:?}", name, data);
        state.cache.insert(name, data.clone());
      }
      PendingKind::Set(name, value) => {
        log::debug!("Successfully set {} to {:?}", name, value);
        state.cache.insert(name, value);
      }
      PendingKind::Command => {}
      PendingKind::PlaylistDelta(header) => {
        state.cache.insert("playlist".to_string(), data.clone());
        let delta = PlaylistDelta {
          original_id: header.original_id,
          insert_start: header.insert_start,
          insert_count: header.insert_count,
          snapshot: PlaylistEntry::parse_list(&data),
        };
        let waiters = state.take_waiters(PLAYLIST_DELTA_EVENT);
        drop(state);
        self.dispatch(EngineEvent::PlaylistDelta(delta), waiters);
        return;
      }
    }

    if let Some(completion) = pending.completion {
      let _ = completion.send(Ok(data));
    }
  }

  fn handle_event(&self, event: MpvEvent) {
    let mut redirect = None;
    let waiters = {
      let mut state = self.state.lock();
      match event.event.as_str() {
        "property-change" => {
          let name = event.id.and_then(|id| state.observer_names.get(&id).cloned());
          if let (Some(name), Some(data)) = (name, event.data.clone()) {
            state.cache.insert(name, data);
          }
        }
        "start-file" => {
          state.last_entry_id = event.playlist_entry_id;
        }
        "end-file" if event.reason.as_deref() == Some("redirect") => {
          if let (Some(original_id), Some(insert_start), Some(insert_count)) = (
            event.playlist_entry_id,
            event.playlist_insert_id,
            event.playlist_insert_num_entries,
          ) {
            let request_id = state.allocate_id();
            state.pending.insert(
              request_id,
              PendingRequest {
                kind: PendingKind::PlaylistDelta(DeltaHeader {
                  original_id,
                  insert_start,
                  insert_count,
                }),
                completion: None,
              },
            );
            redirect = Some(request_id);
          } else {
            log::warn!("Redirect without insertion range: {:?}", event);
          }
        }
        _ => {}
      }
      state.take_waiters(&event.event)
    };

    if event.event != "property-change" {
      log::debug!("Received event {}: {:?}", event.event, event);
    }

    if let Some(request_id) = redirect {
      if let Err(e) = self.write(&MpvCommand::get_property("playlist").with_request_id(request_id)) {
        log::error!("Could not request playlist after redirect: {}", e);
        self.state.lock().pending.remove(&request_id);
      }
    }

    self.dispatch(EngineEvent::Mpv(event), waiters);
  }

  /// Fulfill waiters in registration order, then forward to the session.
  fn dispatch(&self, event: EngineEvent, waiters: VecDeque<oneshot::Sender<EngineEvent>>) {
    for waiter in waiters {
      let _ = waiter.send(event.clone());
    }
    if self.event_tx.try_send(event).is_err() {
      log::debug!("No session listening for MPV events");
    }
  }

  /// The transport went away: cancel everything outstanding.
  pub fn handle_close(&self) {
    let close_waiters = {
      let mut state = self.state.lock();
      if state.closed {
        return;
      }
      state.closed = true;
      let cancelled = state.pending.len();
      state.pending.clear();
      state.ignore_errors.clear();
      let close_waiters = state.take_waiters("close");
      state.waiters.clear();
      if cancelled > 0 {
        log::info!("Cancelled {} pending MPV requests", cancelled);
      }
      close_waiters
    };

    self.dispatch(EngineEvent::Closed, close_waiters);
    self.event_tx.close();
    self.write_tx.close();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  /// Pull the next written command as JSON.
  fn written(channels: &EngineChannels) -> Value {
    match channels.writes.try_recv().expect("a command was written") {
      WriteMessage::Line(bytes) => serde_json::from_slice(&bytes).unwrap(),
      WriteMessage::Close => panic!("unexpected close"),
    }
  }

  fn request_id(cmd: &Value) -> i64 {
    cmd["request_id"].as_i64().unwrap()
  }

  #[tokio::test]
  async fn replies_route_to_their_own_request() {
    let (engine, channels) = ProtocolEngine::new();

    let first = tokio::spawn({
      let engine = engine.clone();
      async move { engine.get("duration").await }
    });
    let second = tokio::spawn({
      let engine = engine.clone();
      async move { engine.get("media-title").await }
    });

    let mut ids = HashMap::new();
    for _ in 0..2 {
      let cmd = loop {
        match channels.writes.try_recv() {
          Ok(WriteMessage::Line(bytes)) => break serde_json::from_slice::<Value>(&bytes).unwrap(),
          _ => tokio::task::yield_now().await,
        }
      };
      ids.insert(cmd["command"][1].as_str().unwrap().to_string(), request_id(&cmd));
    }

    // Answer out of order.
    engine.handle_line(&format!(
      r#"{{"request_id":{},"error":"success","data":"Song"}}"#,
      ids["media-title"]
    ));
    engine.handle_line(&format!(
      r#"{{"request_id":{},"error":"success","data":215.5}}"#,
      ids["duration"]
    ));

    assert_eq!(first.await.unwrap().unwrap(), json!(215.5));
    assert_eq!(second.await.unwrap().unwrap(), json!("Song"));
    assert_eq!(engine.cached("media-title"), Some(json!("Song")));
  }

  #[test]
  fn observer_ids_are_stable() {
    let (engine, channels) = ProtocolEngine::new();
    let id = engine.observe("pause").unwrap();
    assert_eq!(engine.observe("pause").unwrap(), id);
    engine.refresh("pause", false).unwrap();

    let observe = written(&channels);
    assert_eq!(observe["command"], json!(["observe_property", id, "pause"]));
    let refresh = written(&channels);
    assert_eq!(request_id(&refresh), id);
    assert!(channels.writes.try_recv().is_err());
  }

  #[tokio::test]
  async fn set_updates_cache_only_after_ack() {
    let (engine, channels) = ProtocolEngine::new();
    let task = tokio::spawn({
      let engine = engine.clone();
      async move { engine.set("volume", json!(40), true).await }
    });

    let cmd = loop {
      match channels.writes.try_recv() {
        Ok(WriteMessage::Line(bytes)) => break serde_json::from_slice::<Value>(&bytes).unwrap(),
        _ => tokio::task::yield_now().await,
      }
    };
    assert_eq!(engine.cached("volume"), None);

    engine.handle_line(&format!(r#"{{"request_id":{},"error":"success"}}"#, request_id(&cmd)));
    task.await.unwrap().unwrap();
    assert_eq!(engine.cached("volume"), Some(json!(40)));
  }

  #[test]
  fn property_change_updates_only_matching_property() {
    let (engine, _channels) = ProtocolEngine::new();
    let pause = engine.observe("pause").unwrap();
    engine.observe("duration").unwrap();

    engine.handle_line(&format!(
      r#"{{"event":"property-change","id":{},"name":"pause","data":true}}"#,
      pause
    ));

    assert_eq!(engine.cached("pause"), Some(json!(true)));
    assert_eq!(engine.cached("duration"), None);
  }

  #[tokio::test]
  async fn close_cancels_outstanding_requests() {
    let (engine, channels) = ProtocolEngine::new();
    let pending = tokio::spawn({
      let engine = engine.clone();
      async move { engine.request(MpvCommand::get_property("track-list")).await }
    });
    let waiting = engine.next_event("file-loaded");
    let closing = engine.next_event("close");

    while channels.writes.is_empty() {
      tokio::task::yield_now().await;
    }
    engine.handle_close();

    assert!(matches!(pending.await.unwrap(), Err(IpcError::Disconnected)));
    assert!(matches!(waiting.await, Err(IpcError::Disconnected)));
    assert!(matches!(closing.await, Ok(EngineEvent::Closed)));
    assert!(matches!(channels.events.recv().await, Ok(EngineEvent::Closed)));
    assert!(engine.send(MpvCommand::quit()).is_err());
  }

  #[tokio::test]
  async fn waiters_fire_in_registration_order_once() {
    let (engine, _channels) = ProtocolEngine::new();
    let first = engine.next_event("file-loaded");
    let second = engine.next_event("file-loaded");

    engine.handle_line(r#"{"event":"file-loaded","playlist_entry_id":4}"#);
    let a = first.await.unwrap();
    let b = second.await.unwrap();
    assert_eq!(a.name(), "file-loaded");
    assert_eq!(b.name(), "file-loaded");

    let third = engine.next_event("file-loaded");
    engine.handle_line(r#"{"event":"file-loaded","playlist_entry_id":5}"#);
    match third.await.unwrap() {
      EngineEvent::Mpv(event) => assert_eq!(event.playlist_entry_id, Some(5)),
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn ignored_errors_are_dropped() {
    let (engine, channels) = ProtocolEngine::new();
    engine.observe("chapter").unwrap();
    engine.fetch_observed();
    let _observe = written(&channels);
    let refresh = written(&channels);

    engine.handle_line(&format!(
      r#"{{"request_id":{},"error":"property unavailable"}}"#,
      request_id(&refresh)
    ));
    assert!(channels.events.try_recv().is_err());
  }

  #[test]
  fn errors_carry_property_name() {
    let (engine, channels) = ProtocolEngine::new();
    engine.refresh("chapter", false).unwrap();
    let refresh = written(&channels);

    engine.handle_line(&format!(
      r#"{{"request_id":{},"error":"property unavailable"}}"#,
      request_id(&refresh)
    ));
    match channels.events.try_recv().unwrap() {
      EngineEvent::Error(failure) => {
        assert_eq!(failure.message, "property unavailable");
        assert_eq!(failure.property.as_deref(), Some("chapter"));
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[tokio::test]
  async fn error_reply_rejects_pending_request() {
    let (engine, channels) = ProtocolEngine::new();
    let task = tokio::spawn({
      let engine = engine.clone();
      async move { engine.get("track-list").await }
    });
    let cmd = loop {
      match channels.writes.try_recv() {
        Ok(WriteMessage::Line(bytes)) => break serde_json::from_slice::<Value>(&bytes).unwrap(),
        _ => tokio::task::yield_now().await,
      }
    };
    engine.handle_line(&format!(r#"{{"request_id":{},"error":"nope"}}"#, request_id(&cmd)));

    match task.await.unwrap() {
      Err(IpcError::Rejected { message, property }) => {
        assert_eq!(message, "nope");
        assert_eq!(property.as_deref(), Some("track-list"));
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn redirect_fetches_playlist_and_emits_delta() {
    let (engine, channels) = ProtocolEngine::new();
    engine.handle_line(
      r#"{"event":"end-file","reason":"redirect","playlist_entry_id":1,"playlist_insert_id":2,"playlist_insert_num_entries":3}"#,
    );
    let fetch = written(&channels);
    assert_eq!(fetch["command"], json!(["get_property", "playlist"]));
    assert!(matches!(channels.events.try_recv(), Ok(EngineEvent::Mpv(_))));

    engine.handle_line(&format!(
      r#"{{"request_id":{},"error":"success","data":[{{"id":2,"filename":"a"}},{{"id":3,"filename":"b"}},{{"id":4,"filename":"c"}}]}}"#,
      request_id(&fetch)
    ));
    match channels.events.try_recv().unwrap() {
      EngineEvent::PlaylistDelta(delta) => {
        assert_eq!(delta.original_id, 1);
        assert_eq!(delta.inserted().len(), 3);
      }
      other => panic!("unexpected {:?}", other),
    }
    assert_eq!(engine.playlist().len(), 3);
  }

  #[test]
  fn unknown_replies_are_not_fatal() {
    let (engine, channels) = ProtocolEngine::new();
    engine.handle_line(r#"{"request_id":0,"error":"success"}"#);
    engine.handle_line("not json");
    assert!(channels.events.try_recv().is_err());
    assert!(!engine.is_closed());
  }

  #[test]
  fn start_file_remembers_entry() {
    let (engine, _channels) = ProtocolEngine::new();
    engine.handle_line(r#"{"event":"start-file","playlist_entry_id":3}"#);
    assert_eq!(engine.last_entry_id(), Some(3));
  }
}
