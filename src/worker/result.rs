//! Responses handed back to the requesting client, tagged with their origin.

use chrono::{DateTime, Utc};

use crate::cache::CachedResponse;
use crate::http::Response;

/// Result of routing one request, including where the response came from.
#[derive(Debug, Clone)]
pub struct FetchResult {
  /// The response returned to the client
  pub response: Response,
  /// Where the response came from
  pub source: ResponseSource,
  /// When the response was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl FetchResult {
  /// A live response from the network.
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
      cached_at: None,
    }
  }

  /// A cache hit served without touching the network.
  pub fn from_cache(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: ResponseSource::Cache,
      cached_at: Some(cached.cached_at),
    }
  }

  /// A cached response served because the network failed.
  pub fn offline(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: ResponseSource::Offline,
      cached_at: Some(cached.cached_at),
    }
  }

  /// A response fetched for a request the worker did not intercept.
  pub fn passthrough(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::PassThrough,
      cached_at: None,
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh data from network
  Network,
  /// Cache hit (cache-first policy)
  Cache,
  /// Network unavailable, serving cached data (network-first fallback)
  Offline,
  /// Not intercepted by the worker
  PassThrough,
}

impl std::fmt::Display for ResponseSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::Offline => "offline",
      Self::PassThrough => "passthrough",
    };
    f.write_str(name)
  }
}
