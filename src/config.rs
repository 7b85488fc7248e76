use color_eyre::{eyre::eyre, Result};
use serde::{de::Error as _, Deserialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::Database;
use crate::strategy::{CacheWriteMode, CacheableResponse, NetworkFirstOptions, DEFAULT_NETWORK_TIMEOUT};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub strategy: StrategyConfig,
  #[serde(default)]
  pub queue: QueueConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// SQLite database file (defaults to $XDG_DATA_HOME/netsync/netsync.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
  #[serde(default = "default_cache_name")]
  pub cache_name: String,
  /// Seconds, or "infinite"/null to wait on the network forever
  #[serde(
    rename = "network_timeout_seconds",
    default = "default_network_timeout",
    deserialize_with = "deserialize_timeout"
  )]
  pub network_timeout: Option<Duration>,
  #[serde(default, deserialize_with = "deserialize_cacheable_response")]
  pub cacheable_response: CacheableResponseConfig,
  /// Finish the cache write before returning the network response
  #[serde(default)]
  pub await_cache_write: bool,
}

impl Default for StrategyConfig {
  fn default() -> Self {
    Self {
      cache_name: default_cache_name(),
      network_timeout: default_network_timeout(),
      cacheable_response: CacheableResponseConfig::default(),
      await_cache_write: false,
    }
  }
}

fn default_cache_name() -> String {
  "network-first".to_string()
}

fn default_network_timeout() -> Option<Duration> {
  Some(DEFAULT_NETWORK_TIMEOUT)
}

fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Seconds(f64),
    Word(String),
  }

  match Option::<Raw>::deserialize(deserializer)? {
    None => Ok(None),
    Some(Raw::Seconds(s)) if s == f64::INFINITY => Ok(None),
    Some(Raw::Seconds(s)) if s.is_finite() && s >= 0.0 => Ok(Some(Duration::from_secs_f64(s))),
    Some(Raw::Seconds(s)) => Err(D::Error::custom(format!("invalid network timeout: {}", s))),
    Some(Raw::Word(w)) => match w.to_lowercase().as_str() {
      "infinite" | "infinity" | "none" => Ok(None),
      _ => Err(D::Error::custom(format!("invalid network timeout: {}", w))),
    },
  }
}

fn deserialize_cacheable_response<'de, D>(deserializer: D) -> Result<CacheableResponseConfig, D::Error>
where
  D: serde::Deserializer<'de>,
{
  match CacheableResponseConfig::deserialize(deserializer)? {
    CacheableResponseConfig::Toggle(true) => Err(D::Error::custom(
      "cacheable_response must be false or a map of statuses/headers",
    )),
    other => Ok(other),
  }
}

/// `false` disables the check; a map lists the rules. `true` is rejected on load.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CacheableResponseConfig {
  Toggle(bool),
  Rules {
    #[serde(default)]
    statuses: Vec<u16>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
  },
}

impl Default for CacheableResponseConfig {
  fn default() -> Self {
    Self::Toggle(false)
  }
}

impl CacheableResponseConfig {
  pub fn policy(&self) -> Option<CacheableResponse> {
    match self {
      Self::Toggle(_) => None,
      Self::Rules { statuses, headers } => Some(
        headers.iter().fold(
          CacheableResponse::new().with_statuses(statuses.iter().copied()),
          |policy, (name, value)| policy.with_header(name, value.as_str()),
        ),
      ),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
  /// How long a queued request stays eligible for replay
  #[serde(default = "default_max_retention_minutes")]
  pub max_retention_minutes: i64,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      max_retention_minutes: default_max_retention_minutes(),
    }
  }
}

fn default_max_retention_minutes() -> i64 {
  60 * 24 * 7
}

impl QueueConfig {
  pub fn max_retention(&self) -> chrono::Duration {
    chrono::Duration::minutes(self.max_retention_minutes)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Directory for the rolling log file (defaults to $XDG_DATA_HOME/netsync/logs)
  pub directory: Option<PathBuf>,
  /// Filter directive, overridden by RUST_LOG
  #[serde(default = "default_log_level")]
  pub level: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      directory: None,
      level: default_log_level(),
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

impl LogConfig {
  pub fn directory(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.directory {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("netsync").join("logs"))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./netsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/netsync/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("netsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("netsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Resolve the database path.
  ///
  /// NETSYNC_DB_PATH wins over the config file, which wins over the default.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("NETSYNC_DB_PATH") {
      return Ok(PathBuf::from(path));
    }

    match &self.storage.path {
      Some(path) => Ok(path.clone()),
      None => Ok(Database::default_path()?),
    }
  }

  pub fn strategy_options(&self) -> NetworkFirstOptions {
    NetworkFirstOptions {
      cache_name: self.strategy.cache_name.clone(),
      network_timeout: self.strategy.network_timeout,
      cacheable_response: self.strategy.cacheable_response.policy(),
      cache_write: if self.strategy.await_cache_write {
        CacheWriteMode::Await
      } else {
        CacheWriteMode::Background
      },
    }
  }

  /// Strategy options for a process that exits right after one request.
  ///
  /// Background writes would race runtime shutdown, so the write is awaited
  /// regardless of `await_cache_write`.
  pub fn oneshot_strategy_options(&self) -> NetworkFirstOptions {
    NetworkFirstOptions {
      cache_write: CacheWriteMode::Await,
      ..self.strategy_options()
    }
  }
}
