use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::search::DEFAULT_MAX_PAGES;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub team: TeamConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Override for the database location (default: $XDG_DATA_HOME/hrdesk/hrdesk.db)
  pub data_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the HR portal, e.g. https://hr.example.com
  pub url: String,
  /// Per-request timeout; no timeout when unset
  pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamConfig {
  /// Rows requested per directory page
  #[serde(default = "default_page_size")]
  pub page_size: u64,
  /// Page requests allowed per "load more" before yielding back
  #[serde(default = "default_max_pages")]
  pub max_pages_per_batch: u32,
}

impl Default for TeamConfig {
  fn default() -> Self {
    Self {
      page_size: default_page_size(),
      max_pages_per_batch: default_max_pages(),
    }
  }
}

fn default_page_size() -> u64 {
  50
}

fn default_max_pages() -> u32 {
  DEFAULT_MAX_PAGES
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Minutes before a cached record is refreshed from the server
  #[serde(default = "default_stale_minutes")]
  pub stale_minutes: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      stale_minutes: default_stale_minutes(),
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_stale_minutes() -> i64 {
  5
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./hrdesk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/hrdesk/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/hrdesk/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("hrdesk.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("hrdesk").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;

    if config.team.page_size == 0 {
      return Err(eyre!("team.page_size must be at least 1"));
    }

    Ok(config)
  }

  /// Get the password from environment variables.
  ///
  /// Checks HRDESK_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("HRDESK_PASSWORD").map_err(|_| {
      eyre!("Password not found. Set HRDESK_PASSWORD or pass --password.")
    })
  }
}
