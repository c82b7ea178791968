//! Cache router: per-request caching policy and cache-store lifecycle.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::Arc;

use super::message::ClientMessage;
use super::result::FetchResult;
use super::scope::WorkerScope;
use super::{FetchDisposition, WorkerHooks};
use crate::cache::{CacheGeneration, CacheStorage};
use crate::http::{Fetch, Request, Response, ResponseKind};

/// Routes same-origin requests through the cache stores.
///
/// - Paths containing the API marker are network-first: the live response is
///   stored and returned, and the cache is only consulted when the network
///   fails.
/// - Everything else is cache-first: a hit is returned as is, a miss is
///   fetched and stored when it is a plain 200.
///
/// Cache writes are best-effort. A failing store degrades to network only.
pub struct CacheRouter<S: CacheStorage> {
  storage: Arc<S>,
  network: Arc<dyn Fetch>,
  generation: CacheGeneration,
  api_marker: String,
  precache: Vec<String>,
}

impl<S: CacheStorage> CacheRouter<S> {
  pub fn new(storage: Arc<S>, network: Arc<dyn Fetch>, generation: CacheGeneration) -> Self {
    Self {
      storage,
      network,
      generation,
      api_marker: "/api/".to_string(),
      precache: Vec::new(),
    }
  }

  /// Set the path fragment that selects the network-first policy.
  pub fn with_api_marker(mut self, marker: &str) -> Self {
    self.api_marker = marker.to_string();
    self
  }

  /// Set the paths stored at install time.
  pub fn with_precache(mut self, paths: Vec<String>) -> Self {
    self.precache = paths;
    self
  }

  fn is_api(&self, request: &Request) -> bool {
    request.url.path().contains(&self.api_marker)
  }

  /// Write a response into the runtime store, logging instead of failing.
  fn store_runtime(&self, request: &Request, response: &Response) {
    let store = self.generation.runtime_name();
    if let Err(e) = self.storage.put(store, request, response) {
      tracing::warn!(request = %request.signature(), store, error = %e, "Cache write failed");
    }
  }

  async fn network_first(&self, request: &Request) -> Result<FetchResult> {
    match self.network.fetch(request).await {
      Ok(response) => {
        // Stored whatever the status, unlike the cache-first path
        self.store_runtime(request, &response);
        Ok(FetchResult::from_network(response))
      }
      Err(err) => match self.storage.match_any(request) {
        Ok(Some(cached)) => {
          tracing::debug!(request = %request.signature(), store = %cached.store, "Network failed, serving cache");
          Ok(FetchResult::offline(cached))
        }
        Ok(None) => Err(err),
        Err(e) => {
          tracing::warn!(request = %request.signature(), error = %e, "Cache lookup failed");
          Err(err)
        }
      },
    }
  }

  async fn cache_first(&self, request: &Request) -> Result<FetchResult> {
    match self.storage.match_any(request) {
      Ok(Some(cached)) => return Ok(FetchResult::from_cache(cached)),
      Ok(None) => {}
      Err(e) => {
        tracing::warn!(request = %request.signature(), error = %e, "Cache lookup failed");
      }
    }

    let response = self.network.fetch(request).await?;
    // ReqwestFetcher reports transport failures as Err, but other Fetch
    // implementations may hand back an Error-kind response instead
    if response.status == 200 && response.kind != ResponseKind::Error {
      self.store_runtime(request, &response);
    } else {
      tracing::debug!(request = %request.signature(), status = response.status, "Response not cacheable");
    }

    Ok(FetchResult::from_network(response))
  }
}

#[async_trait]
impl<S: CacheStorage + 'static> WorkerHooks for CacheRouter<S> {
  async fn on_install(&self, scope: &WorkerScope) -> Result<()> {
    let requests = self
      .precache
      .iter()
      .map(|path| Request::parse("GET", path, scope.origin()))
      .collect::<Result<Vec<_>>>()?;

    let responses = try_join_all(requests.iter().map(|req| self.network.fetch(req))).await?;

    if let Some((req, resp)) = requests
      .iter()
      .zip(&responses)
      .find(|(_, resp)| !resp.ok())
    {
      return Err(eyre!(
        "Failed to precache {}: status {}",
        req.url,
        resp.status
      ));
    }

    let entries: Vec<(Request, Response)> = requests.into_iter().zip(responses).collect();
    self
      .storage
      .put_all(self.generation.static_name(), &entries)?;

    tracing::info!(
      store = self.generation.static_name(),
      entries = entries.len(),
      "Precached static assets"
    );

    scope.skip_waiting();
    Ok(())
  }

  async fn on_activate(&self, scope: &WorkerScope) -> Result<()> {
    // Eviction failures leave a stale store behind; clients are claimed anyway
    match self.storage.store_names() {
      Ok(names) => {
        for name in names.iter().filter(|name| !self.generation.owns(name)) {
          match self.storage.delete_store(name) {
            Ok(_) => tracing::info!(store = %name, "Deleted stale cache store"),
            Err(e) => tracing::warn!(store = %name, error = %e, "Failed to delete stale cache store"),
          }
        }
      }
      Err(e) => tracing::warn!(error = %e, "Failed to list cache stores"),
    }

    let runtime = self.generation.runtime_name();
    if let Err(e) = self.storage.open_store(runtime) {
      tracing::warn!(store = runtime, error = %e, "Failed to open runtime store");
    }

    let claimed = scope.claim_clients()?;
    tracing::debug!(claimed, "Claimed clients");
    Ok(())
  }

  async fn on_fetch(&self, scope: &WorkerScope, request: &Request) -> Result<FetchDisposition> {
    if !request.is_same_origin(scope.origin()) {
      return Ok(FetchDisposition::PassThrough);
    }

    let result = if self.is_api(request) {
      self.network_first(request).await?
    } else {
      self.cache_first(request).await?
    };

    tracing::debug!(request = %request.signature(), source = %result.source, "Routed request");
    Ok(FetchDisposition::Respond(result))
  }

  async fn on_message(&self, scope: &WorkerScope, message: &ClientMessage) -> Result<()> {
    match message {
      ClientMessage::SkipWaiting => scope.skip_waiting(),
      ClientMessage::Unknown => tracing::debug!("Ignoring unknown client message"),
    }
    Ok(())
  }
}
