//! Plugin configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::playlist::{QueryPredicate, UpdateAction};

const CONFIG_FILE: &str = "config.json";
const APP_DIR: &str = "nvimpv";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Could not read config file: {0}")]
  Io(#[from] std::io::Error),

  #[error("Invalid config file: {0}")]
  Json(#[from] serde_json::Error),

  #[error("{0}")]
  Invalid(String),
}

/// Plugin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
  /// Custom MPV executable path (None = auto-detect).
  #[serde(default)]
  pub mpv_path: Option<PathBuf>,

  /// Arguments every instance gets, before per-session ones.
  #[serde(default = "default_args")]
  pub default_args: Vec<String>,

  /// Where IPC sockets are created (None = runtime dir).
  #[serde(default)]
  pub socket_dir: Option<PathBuf>,

  /// What to do with the display when a playlist entry expands.
  #[serde(default)]
  pub on_playlist_update: UpdateAction,

  /// Let a single query reference pick its own update action.
  #[serde(default = "default_true")]
  pub smart_query_playlist: bool,

  /// Filetypes whose lines may be rewritten as markdown links.
  #[serde(default = "default_markdown_writable")]
  pub markdown_writable: Vec<String>,

  /// Extra properties to observe for the status line.
  #[serde(default = "default_observed_properties")]
  pub observed_properties: Vec<String>,

  #[serde(default = "default_startup_timeout_ms")]
  pub startup_timeout_ms: u64,

  #[serde(default = "default_connect_timeout_ms")]
  pub connect_timeout_ms: u64,

  /// Delay between a keypress and re-fetching properties.
  #[serde(default = "default_keypress_delay_ms")]
  pub keypress_delay_ms: u64,

  #[serde(skip)]
  pub query_predicate: QueryPredicate,
}

fn default_args() -> Vec<String> {
  vec!["--no-video".to_string()]
}

fn default_true() -> bool {
  true
}

fn default_markdown_writable() -> Vec<String> {
  vec!["markdown".to_string()]
}

fn default_observed_properties() -> Vec<String> {
  ["media-title", "playback-time", "duration", "loop", "playlist-pos", "playlist-count"]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_startup_timeout_ms() -> u64 {
  1000
}

fn default_connect_timeout_ms() -> u64 {
  1000
}

fn default_keypress_delay_ms() -> u64 {
  50
}

impl Default for PluginConfig {
  fn default() -> Self {
    Self {
      mpv_path: None,
      default_args: default_args(),
      socket_dir: None,
      on_playlist_update: UpdateAction::default(),
      smart_query_playlist: true,
      markdown_writable: default_markdown_writable(),
      observed_properties: default_observed_properties(),
      startup_timeout_ms: default_startup_timeout_ms(),
      connect_timeout_ms: default_connect_timeout_ms(),
      keypress_delay_ms: default_keypress_delay_ms(),
      query_predicate: QueryPredicate::default(),
    }
  }
}

impl PluginConfig {
  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.startup_timeout_ms == 0 || self.startup_timeout_ms > 30_000 {
      return Err(ConfigError::Invalid(
        "Startup timeout must be between 1 and 30000 ms".to_string(),
      ));
    }
    if self.connect_timeout_ms == 0 || self.connect_timeout_ms > 30_000 {
      return Err(ConfigError::Invalid(
        "Connect timeout must be between 1 and 30000 ms".to_string(),
      ));
    }
    if self.keypress_delay_ms > 5_000 {
      return Err(ConfigError::Invalid(
        "Keypress delay cannot exceed 5000 ms".to_string(),
      ));
    }
    if self.observed_properties.iter().any(|p| p.trim().is_empty()) {
      return Err(ConfigError::Invalid(
        "Observed property names cannot be empty".to_string(),
      ));
    }
    if let Some(path) = &self.mpv_path {
      if path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("MPV path cannot be empty".to_string()));
      }
    }
    Ok(())
  }

  /// Read and validate a JSON config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&text)?;
    config.validate()?;
    log::info!("Loaded config from {:?}", path);
    Ok(config)
  }

  /// Load the config at the default location, falling back to defaults when
  /// there is none.
  pub fn load_or_default() -> Result<Self, ConfigError> {
    match Self::default_path() {
      Some(path) if path.exists() => Self::load(&path),
      _ => {
        log::debug!("No config file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
  }

  /// Directory for IPC sockets.
  pub fn socket_dir(&self) -> PathBuf {
    self
      .socket_dir
      .clone()
      .or_else(dirs::runtime_dir)
      .unwrap_or_else(std::env::temp_dir)
  }

  pub fn is_markdown_writable(&self, filetype: &str) -> bool {
    self.markdown_writable.iter().any(|ft| ft == filetype)
  }

  pub fn startup_timeout(&self) -> Duration {
    Duration::from_millis(self.startup_timeout_ms)
  }

  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }

  pub fn keypress_delay(&self) -> Duration {
    Duration::from_millis(self.keypress_delay_ms)
  }
}
