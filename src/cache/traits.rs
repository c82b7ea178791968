//! Core types shared by the storage backends and the router.

use chrono::{DateTime, Utc};

use crate::http::Response;

/// The pair of store names owned by one worker version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGeneration {
  static_name: String,
  runtime_name: String,
}

impl CacheGeneration {
  /// Build the store names for `prefix` at `version`, e.g. `clubnath-v1` and
  /// `clubnath-runtime-v1`.
  pub fn new(prefix: &str, version: &str) -> Self {
    Self {
      static_name: format!("{}-{}", prefix, version),
      runtime_name: format!("{}-runtime-{}", prefix, version),
    }
  }

  /// Store filled once at install with the precache manifest.
  pub fn static_name(&self) -> &str {
    &self.static_name
  }

  /// Store filled with responses fetched while serving.
  pub fn runtime_name(&self) -> &str {
    &self.runtime_name
  }

  /// Whether a store belongs to this generation and must survive activation.
  pub fn owns(&self, store: &str) -> bool {
    store == self.static_name || store == self.runtime_name
  }
}

impl Default for CacheGeneration {
  fn default() -> Self {
    Self::new("clubnath", "v1")
  }
}

/// A response read back from a store.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  /// The stored snapshot
  pub response: Response,
  /// Store the entry was found in
  pub store: String,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}
