//! Request/response values exchanged between the worker, its cache stores and
//! the network.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use url::Url;

/// An intercepted fetch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: Url,
}

impl Request {
  pub fn new(method: &str, url: Url) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url,
    }
  }

  /// Parse an absolute URL, or a path resolved against `origin`.
  pub fn parse(method: &str, target: &str, origin: &Url) -> Result<Self> {
    let url = origin
      .join(target)
      .map_err(|e| eyre!("Invalid request target '{}': {}", target, e))?;
    Ok(Self::new(method, url))
  }

  /// Cache key for this request: method plus serialized URL.
  pub fn signature(&self) -> String {
    format!("{} {}", self.method, self.url)
  }

  pub fn is_same_origin(&self, origin: &Url) -> bool {
    self.url.origin() == origin.origin()
  }
}

/// How a response was obtained, mirroring the fetch API's response types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
  Basic,
  Cors,
  Opaque,
  Error,
}

impl ResponseKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Opaque => "opaque",
      Self::Error => "error",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "basic" => Ok(Self::Basic),
      "cors" => Ok(Self::Cors),
      "opaque" => Ok(Self::Opaque),
      "error" => Ok(Self::Error),
      other => Err(eyre!("Unknown response kind '{}'", other)),
    }
  }
}

/// A full response snapshot. Cloning is the equivalent of `response.clone()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub kind: ResponseKind,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: String::new(),
      headers: Vec::new(),
      body: body.into(),
      kind: ResponseKind::Basic,
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn with_kind(mut self, kind: ResponseKind) -> Self {
    self.kind = kind;
    self
  }

  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Network access used by the worker.
///
/// An `Err` means the fetch itself failed (DNS, connection reset, offline).
/// HTTP error statuses are successful fetches.
#[async_trait]
pub trait Fetch: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Network fetcher backed by reqwest.
#[derive(Clone)]
pub struct ReqwestFetcher {
  client: reqwest::Client,
  origin: Url,
}

impl ReqwestFetcher {
  pub fn new(origin: Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("clubnath-edge/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;
    Ok(Self { client, origin })
  }
}

#[async_trait]
impl Fetch for ReqwestFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method '{}': {}", request.method, e))?;

    let resp = self
      .client
      .request(method, request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = resp.status();
    let kind = response_kind(&self.origin, resp.url());
    let headers: Vec<(String, String)> = resp
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
      .collect();
    let body = resp
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    let mut response = headers
      .iter()
      .fold(Response::new(status.as_u16(), body.to_vec()), |r, (k, v)| {
        r.with_header(k, v)
      })
      .with_kind(kind);
    response.status_text = status.canonical_reason().unwrap_or_default().to_string();
    Ok(response)
  }
}

/// Kind of a response that ended at `final_url`.
///
/// reqwest follows redirects itself, so a same-origin request can still end
/// up cross-origin. Transport failures are returned as `Err`, never as
/// `ResponseKind::Error`, and there is no no-cors mode to yield `Opaque`.
fn response_kind(origin: &Url, final_url: &Url) -> ResponseKind {
  if final_url.origin() == origin.origin() {
    ResponseKind::Basic
  } else {
    ResponseKind::Cors
  }
}

/// Scripted network for tests.
#[cfg(test)]
pub mod fake {
  use super::*;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
  use std::sync::Mutex;

  /// Serves registered responses by URL, 404 otherwise. Can be taken offline.
  #[derive(Default)]
  pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: AtomicU32,
  }

  impl FakeNetwork {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn route(&self, url: &str, response: Response) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
      self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Fetch for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.offline.load(Ordering::SeqCst) {
        return Err(eyre!("Failed to fetch {}: network offline", request.url));
      }
      let routes = self.routes.lock().unwrap();
      Ok(
        routes
          .get(request.url.as_str())
          .cloned()
          .unwrap_or_else(|| Response::new(404, "not found")),
      )
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn origin() -> Url {
    Url::parse("https://app.clubnath.com").unwrap()
  }

  #[test]
  fn test_parse_relative_path() {
    let req = Request::parse("get", "/api/posts?page=2", &origin()).unwrap();
    assert_eq!(req.method, "GET");
    assert_eq!(req.url.as_str(), "https://app.clubnath.com/api/posts?page=2");
  }

  #[test]
  fn test_signature_includes_method() {
    let url = Url::parse("https://app.clubnath.com/feed").unwrap();
    let get = Request::new("GET", url.clone());
    let post = Request::new("post", url);
    assert_eq!(get.signature(), "GET https://app.clubnath.com/feed");
    assert_ne!(get.signature(), post.signature());
  }

  #[test]
  fn test_same_origin() {
    let same = Request::parse("GET", "/index.html", &origin()).unwrap();
    let other = Request::parse("GET", "https://cdn.example.com/x.js", &origin()).unwrap();
    assert!(same.is_same_origin(&origin()));
    assert!(!other.is_same_origin(&origin()));
  }

  #[test]
  fn test_header_lookup_is_case_insensitive() {
    let resp = Response::new(200, "{}").with_header("Content-Type", "application/json");
    assert_eq!(resp.header("content-type"), Some("application/json"));
    assert!(resp.ok());
  }

  #[test]
  fn test_redirect_off_origin_is_cors() {
    let local = Url::parse("https://app.clubnath.com/index.html").unwrap();
    let moved = Url::parse("https://cdn.clubnath.com/index.html").unwrap();
    assert_eq!(response_kind(&origin(), &local), ResponseKind::Basic);
    assert_eq!(response_kind(&origin(), &moved), ResponseKind::Cors);
  }
}
