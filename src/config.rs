use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::CacheGeneration;
use crate::gesture::PullConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the worker is registered for; requests to other origins pass through
  pub origin: Url,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub gesture: GestureConfig,
  /// API path re-fetched when a pull-to-refresh completes
  #[serde(default = "default_feed_path")]
  pub feed_path: String,
}

fn default_feed_path() -> String {
  "/api/feed".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Store name prefix, e.g. "clubnath" gives "clubnath-v1"
  #[serde(default = "default_prefix")]
  pub prefix: String,
  /// Generation tag; bumping it evicts older stores on activation
  #[serde(default = "default_version")]
  pub version: String,
  /// Path fragment that selects the network-first policy
  #[serde(default = "default_api_marker")]
  pub api_marker: String,
  /// Paths stored at install time
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
  /// When false, nothing is stored and every request goes to the network
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Cache database location (default: $XDG_DATA_HOME/clubnath/cache.db)
  pub path: Option<PathBuf>,
}

fn default_prefix() -> String {
  "clubnath".to_string()
}

fn default_version() -> String {
  "v1".to_string()
}

fn default_api_marker() -> String {
  "/api/".to_string()
}

fn default_precache() -> Vec<String> {
  ["/", "/index.html", "/manifest.json", "/icon-192.png", "/icon-512.png"]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_true() -> bool {
  true
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prefix: default_prefix(),
      version: default_version(),
      api_marker: default_api_marker(),
      precache: default_precache(),
      enabled: true,
      path: None,
    }
  }
}

impl CacheConfig {
  pub fn generation(&self) -> CacheGeneration {
    CacheGeneration::new(&self.prefix, &self.version)
  }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GestureConfig {
  #[serde(default = "default_threshold")]
  pub threshold: f64,
  #[serde(default = "default_resistance")]
  pub resistance: f64,
  #[serde(default = "default_true")]
  pub enabled: bool,
}

fn default_threshold() -> f64 {
  80.0
}

fn default_resistance() -> f64 {
  0.5
}

impl Default for GestureConfig {
  fn default() -> Self {
    Self {
      threshold: default_threshold(),
      resistance: default_resistance(),
      enabled: true,
    }
  }
}

impl From<GestureConfig> for PullConfig {
  fn from(c: GestureConfig) -> Self {
    PullConfig {
      threshold: c.threshold,
      resistance: c.resistance,
      enabled: c.enabled,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./clubnath.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/clubnath/config.yaml
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
        "No configuration file found. Create one at ~/.config/clubnath/config.yaml\n\
                 with at least an `origin:` entry."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("clubnath.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("clubnath").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to load config file {}: {}", path.display(), e))
  }

  /// Parse and validate a YAML document.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Invalid config: {}", e))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if !matches!(self.origin.scheme(), "http" | "https") {
      return Err(eyre!("origin must be an http(s) URL, got {}", self.origin));
    }
    if self.cache.prefix.is_empty() || self.cache.version.is_empty() {
      return Err(eyre!("cache.prefix and cache.version must not be empty"));
    }
    if self.cache.api_marker.is_empty() {
      return Err(eyre!("cache.api_marker must not be empty"));
    }
    PullConfig::from(self.gesture).validate()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml("origin: https://app.clubnath.com\n").unwrap();

    assert_eq!(config.cache.generation(), CacheGeneration::new("clubnath", "v1"));
    assert_eq!(config.cache.api_marker, "/api/");
    assert_eq!(config.cache.precache.len(), 5);
    assert!(config.cache.enabled);
    assert_eq!(config.gesture.threshold, 80.0);
    assert_eq!(config.gesture.resistance, 0.5);
    assert_eq!(config.feed_path, "/api/feed");
  }

  #[test]
  fn test_overrides() {
    let yaml = r#"
origin: https://app.clubnath.com
cache:
  version: v2
  precache: ["/", "/offline.html"]
  enabled: false
gesture:
  threshold: 100
  resistance: 0.4
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert_eq!(config.cache.generation().static_name(), "clubnath-v2");
    assert_eq!(config.cache.precache, vec!["/", "/offline.html"]);
    assert!(!config.cache.enabled);
    assert_eq!(config.gesture.threshold, 100.0);
  }

  #[test]
  fn test_missing_origin_is_rejected() {
    assert!(Config::from_yaml("cache:\n  version: v1\n").is_err());
  }

  #[test]
  fn test_non_http_origin_is_rejected() {
    assert!(Config::from_yaml("origin: file:///tmp/app\n").is_err());
  }

  #[test]
  fn test_resistance_out_of_range_is_rejected() {
    let yaml = "origin: https://app.clubnath.com\ngesture:\n  resistance: 1.5\n";
    assert!(Config::from_yaml(yaml).is_err());

    let yaml = "origin: https://app.clubnath.com\ngesture:\n  resistance: 0\n";
    assert!(Config::from_yaml(yaml).is_err());
  }

  #[test]
  fn test_load_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/clubnath.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
