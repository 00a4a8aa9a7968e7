//! File logging setup.
//!
//! Logs go to a daily rolling file so they never mix with command output.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogConfig;

/// Environment variable that overrides the configured filter
pub const LOG_ENV: &str = "KANBAN_LOG";

/// Install the global subscriber. Keep the returned guard alive until exit
/// or buffered lines are lost.
pub fn init(config: &LogConfig) -> Result<WorkerGuard> {
  let dir = match &config.directory {
    Some(dir) => dir.clone(),
    None => default_log_dir()?,
  };
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, "kanban.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = env_filter(config)?;

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

fn env_filter(config: &LogConfig) -> Result<EnvFilter> {
  match std::env::var(LOG_ENV) {
    Ok(directives) => EnvFilter::try_new(&directives)
      .map_err(|e| eyre!("Invalid {} filter {:?}: {}", LOG_ENV, directives, e)),
    Err(_) => EnvFilter::try_new(&config.level)
      .map_err(|e| eyre!("Invalid log level {:?}: {}", config.level, e)),
  }
}

fn default_log_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("kanban").join("logs"))
}
