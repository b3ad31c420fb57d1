//! Logger setup.
//!
//! `RUST_LOG` takes precedence when set. Otherwise everything is handed to
//! `env_logger` and the level is controlled through the `log` max level, so
//! it can be changed while running.

use std::str::FromStr;

use log::LevelFilter;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggingError {
  #[error("Invalid logging level given: {0}")]
  InvalidLevel(String),

  #[error("Logger already installed")]
  AlreadyInstalled(#[from] log::SetLoggerError),
}

/// Install the logger with `level` as the starting level.
pub fn init(level: LevelFilter) -> Result<(), LoggingError> {
  let from_env = std::env::var_os(env_logger::DEFAULT_FILTER_ENV).is_some();

  let mut builder = env_logger::Builder::new();
  if from_env {
    builder.parse_env(env_logger::Env::default());
  } else {
    builder.filter_level(LevelFilter::Trace);
  }
  builder.format_timestamp_millis().try_init()?;

  if !from_env {
    log::set_max_level(level);
  }
  log::info!("Logging initialized at {}", log::max_level());
  Ok(())
}

pub fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
  LevelFilter::from_str(level.trim()).map_err(|_| LoggingError::InvalidLevel(level.to_string()))
}

/// Change the level at runtime, e.g. from an editor command.
pub fn set_level(level: &str) -> Result<LevelFilter, LoggingError> {
  let level = parse_level(level)?;
  log::set_max_level(level);
  Ok(level)
}
