//! Editor-side control core for MPV: spawns players, talks JSON IPC to them
//! and keeps their playlists in step with the lines they were opened from.

mod config;
pub mod display;
pub mod logging;
pub mod mpv;
pub mod player;
pub mod playlist;
mod registry;

pub use config::{ConfigError, PluginConfig};
pub use display::{DisplayError, DisplayHandle, DisplaySurface, PlayerKey, Severity, SurfaceId};
pub use player::{Lifecycle, Session, SessionError, SessionOptions};
pub use playlist::{PlaylistSeed, QueryPredicate, UpdateAction};
pub use registry::SessionRegistry;
