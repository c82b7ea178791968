use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStorage, NoopStorage, SqliteStorage};
use crate::config::Config;
use crate::gesture::{
  PullGestureController, PullPhase, PullState, ScrollOffset, ScrollRegion, TouchEvent,
};
use crate::http::{Fetch, ReqwestFetcher, Request};
use crate::worker::{
  CacheRouter, ClientList, ClientMessage, FetchResult, ResponseSource, WorkerHost, WorkerScope,
  WorkerState,
};

/// What to do once the worker is up.
#[derive(Debug, Clone)]
pub enum Command {
  Install,
  Fetch { target: String, method: String },
  Lookup { target: String, method: String },
  Stores,
  Message { json: String },
  Replay { trace: std::path::PathBuf },
}

/// One step of a recorded touch trace.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum TraceStep {
  /// The bound region scrolled to this offset
  Scroll { scroll_top: f64 },
  /// The page turned the gesture on or off
  Enabled { enabled: bool },
  /// Time passing between touches
  Wait { wait_ms: u64 },
  Touch(TouchEvent),
}

/// Build the worker for the configured cache backend and run one command.
pub async fn run(config: Config, command: Command) -> Result<()> {
  let network: Arc<dyn Fetch> = Arc::new(ReqwestFetcher::new(config.origin.clone())?);

  if config.cache.enabled {
    let storage = SqliteStorage::open(config.cache.path.as_deref())?;
    App::new(config, Arc::new(storage), network).run(command).await
  } else {
    tracing::info!("Caching disabled, every request goes to the network");
    App::new(config, Arc::new(NoopStorage), network).run(command).await
  }
}

struct App<S: CacheStorage + 'static> {
  config: Config,
  storage: Arc<S>,
  host: WorkerHost<CacheRouter<S>>,
}

impl<S: CacheStorage + 'static> App<S> {
  fn new(config: Config, storage: Arc<S>, network: Arc<dyn Fetch>) -> Self {
    let router = CacheRouter::new(storage.clone(), network.clone(), config.cache.generation())
      .with_api_marker(&config.cache.api_marker)
      .with_precache(config.cache.precache.clone());

    let scope = WorkerScope::new(config.origin.clone(), &config.cache.version, ClientList::new());
    let host = WorkerHost::new(router, scope, network);

    Self {
      config,
      storage,
      host,
    }
  }

  async fn run(mut self, command: Command) -> Result<()> {
    match command {
      Command::Install => {
        self.host.start().await?;
        println!(
          "{} installed ({:?})",
          self.config.cache.generation().static_name(),
          self.host.state()
        );
        Ok(())
      }
      Command::Fetch { target, method } => {
        self.boot().await?;
        let result = self.fetch(&method, &target).await?;
        self.print_result(&result);
        Ok(())
      }
      Command::Lookup { target, method } => self.lookup(&method, &target),
      Command::Stores => self.list_stores(),
      Command::Message { json } => {
        self.boot().await?;
        let message = ClientMessage::parse(&json)?;
        self.host.post_message(&message).await?;
        println!("delivered {:?} ({:?})", message, self.host.state());
        Ok(())
      }
      Command::Replay { trace } => {
        self.boot().await?;
        let steps = read_trace(&trace)?;
        self.replay(steps).await
      }
    }
  }

  /// Resume the current generation if it is already installed, else install it.
  ///
  /// A failed install leaves the worker redundant; requests then go straight
  /// to the network.
  async fn boot(&mut self) -> Result<()> {
    let generation = self.config.cache.generation();
    let installed = self
      .storage
      .store_names()?
      .iter()
      .any(|name| name == generation.static_name());

    if installed {
      return self.host.resume();
    }

    if let Err(e) = self.host.start().await {
      tracing::warn!(
        store = generation.static_name(),
        error = %e,
        "Install failed, continuing without the worker"
      );
    }
    Ok(())
  }

  async fn fetch(&self, method: &str, target: &str) -> Result<FetchResult> {
    let request = Request::parse(method, target, &self.config.origin)?;
    self.host.fetch(&request).await
  }

  fn print_result(&self, result: &FetchResult) {
    println!(
      "{} [{}] {} bytes {}",
      result.response.status,
      result.source,
      result.response.body.len(),
      result.response.header("content-type").unwrap_or("-")
    );
    if let Some(cached_at) = result.cached_at {
      println!("cached at {}", cached_at.to_rfc3339());
    }
    if result.source == ResponseSource::PassThrough && self.host.state() != WorkerState::Activated {
      println!("worker {:?}, request not intercepted", self.host.state());
    }
  }

  /// Show every store holding an entry for the request.
  fn lookup(&self, method: &str, target: &str) -> Result<()> {
    let request = Request::parse(method, target, &self.config.origin)?;

    let mut found = false;
    for name in self.storage.store_names()? {
      if let Some(cached) = self.storage.get(&name, &request)? {
        found = true;
        println!(
          "{} {} {} bytes cached at {}",
          cached.store,
          cached.response.status,
          cached.response.body.len(),
          cached.cached_at.to_rfc3339()
        );
      }
    }

    if !found {
      println!("{} is not cached", request.signature());
    }
    Ok(())
  }

  fn list_stores(&self) -> Result<()> {
    let generation = self.config.cache.generation();
    let names = self.storage.store_names()?;

    if names.is_empty() {
      println!("no cache stores");
    }
    for name in names {
      let marker = if generation.owns(&name) { "*" } else { " " };
      println!("{} {} ({} entries)", marker, name, self.storage.entry_count(&name)?);
    }
    Ok(())
  }

  /// Drive the pull controller through a trace. The controller is polled after
  /// every step, like an event loop tick; a refresh still running when the
  /// trace ends is awaited.
  async fn replay(self, steps: Vec<TraceStep>) -> Result<()> {
    let feed = Request::parse("GET", &self.config.feed_path, &self.config.origin)?;
    let host = Arc::new(self.host);

    let mut controller = PullGestureController::new(self.config.gesture.into(), move || {
      let host = host.clone();
      let feed = feed.clone();
      async move {
        let result = host.fetch(&feed).await?;
        tracing::info!(status = result.response.status, source = %result.source, "Feed refreshed");
        Ok(())
      }
    })?;

    let region = ScrollOffset::document_root();
    let bound: Arc<dyn ScrollRegion> = Arc::new(region.clone());
    controller.bind_scroll_region(bound);

    for step in steps {
      match step {
        TraceStep::Scroll { scroll_top } => region.set(scroll_top),
        TraceStep::Enabled { enabled } => {
          controller.set_enabled(enabled);
          println!("{}", render(&format!("enabled={}", enabled), &controller, false));
        }
        TraceStep::Wait { wait_ms } => tokio::time::sleep(Duration::from_millis(wait_ms)).await,
        TraceStep::Touch(event) => {
          let suppressed = controller.handle(event);
          println!("{}", render(&format!("{:?}", event), &controller, suppressed));
        }
      }

      if controller.poll() {
        println!("{}", render("refresh settled", &controller, false));
      }
    }

    if controller.phase() == PullPhase::Refreshing {
      controller.wait_for_refresh().await;
      println!("{}", render("refresh settled", &controller, false));
    }

    Ok(())
  }
}

fn read_trace(path: &Path) -> Result<Vec<TraceStep>> {
  let contents = std::fs::read_to_string(path)
    .map_err(|e| eyre!("Failed to read trace {}: {}", path.display(), e))?;
  serde_yaml::from_str(&contents).map_err(|e| eyre!("Failed to parse trace {}: {}", path.display(), e))
}

fn render(label: &str, controller: &PullGestureController, suppressed: bool) -> String {
  let state: PullState = controller.state();
  format!(
    "{:<24} {:?} distance={:.1} progress={:.2}{}",
    label,
    controller.phase(),
    state.pull_distance,
    controller.progress(),
    if suppressed { " (scroll suppressed)" } else { "" }
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::fake::FakeNetwork;
  use crate::http::Response;

  const ORIGIN: &str = "https://app.clubnath.com";
  const ASSETS: [&str; 5] = ["/", "/index.html", "/manifest.json", "/icon-192.png", "/icon-512.png"];

  fn network(assets: &[&str]) -> Arc<FakeNetwork> {
    let network = Arc::new(FakeNetwork::new());
    for path in assets {
      network.route(&format!("{}{}", ORIGIN, path), Response::new(200, "asset"));
    }
    network.route(&format!("{}/api/feed", ORIGIN), Response::new(200, "[]"));
    network
  }

  fn app(network: Arc<FakeNetwork>, storage: Arc<SqliteStorage>) -> App<SqliteStorage> {
    let config = Config::from_yaml(&format!("origin: {}\n", ORIGIN)).unwrap();
    App::new(config, storage, network)
  }

  fn feed() -> Request {
    Request::parse("GET", "/api/feed", &url::Url::parse(ORIGIN).unwrap()).unwrap()
  }

  #[tokio::test]
  async fn test_failed_install_falls_back_to_network() {
    // /icon-512.png is unrouted and answers 404
    let network = network(&ASSETS[..4]);
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let mut app = app(network, storage.clone());

    app.boot().await.unwrap();
    assert_eq!(app.host.state(), WorkerState::Redundant);

    let result = app.fetch("GET", "/api/feed").await.unwrap();
    assert_eq!(result.source, ResponseSource::PassThrough);
    assert_eq!(result.response.status, 200);
    assert!(storage.store_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_boot_resumes_installed_generation() {
    let network = network(&ASSETS);
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());

    let mut first = app(network.clone(), storage.clone());
    first.boot().await.unwrap();
    assert_eq!(first.host.state(), WorkerState::Activated);
    let calls = network.calls();

    let mut second = app(network.clone(), storage);
    second.boot().await.unwrap();
    assert_eq!(second.host.state(), WorkerState::Activated);
    assert_eq!(network.calls(), calls);
  }

  #[tokio::test]
  async fn test_replay_refreshes_feed_through_worker() {
    let network = network(&ASSETS);
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let mut app = app(network, storage.clone());
    app.boot().await.unwrap();

    let steps: Vec<TraceStep> = serde_yaml::from_str(
      r#"
- scroll_top: 0
- event: start
  y: 100
- event: move
  y: 300
- event: end
- wait_ms: 10
"#,
    )
    .unwrap();
    app.replay(steps).await.unwrap();

    let cached = storage.get("clubnath-runtime-v1", &feed()).unwrap().unwrap();
    assert_eq!(cached.response.body, b"[]".to_vec());
  }

  #[tokio::test]
  async fn test_replay_disabled_gesture_does_not_refresh() {
    let network = network(&ASSETS);
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let mut app = app(network.clone(), storage.clone());
    app.boot().await.unwrap();
    let calls = network.calls();

    let steps: Vec<TraceStep> = serde_yaml::from_str(
      r#"
- enabled: false
- event: start
  y: 100
- event: move
  y: 300
- event: end
"#,
    )
    .unwrap();
    app.replay(steps).await.unwrap();

    assert_eq!(network.calls(), calls);
    assert!(storage.get("clubnath-runtime-v1", &feed()).unwrap().is_none());
  }

  #[test]
  fn test_trace_steps_parse() {
    let yaml = r#"
- scroll_top: 0
- event: start
  y: 12
- event: move
  y: 250
- event: end
"#;
    let steps: Vec<TraceStep> = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(steps.len(), 4);
    assert!(matches!(steps[0], TraceStep::Scroll { scroll_top } if scroll_top == 0.0));
    assert!(matches!(steps[1], TraceStep::Touch(TouchEvent::Start { y }) if y == 12.0));
    assert!(matches!(steps[3], TraceStep::Touch(TouchEvent::End)));
  }

  #[test]
  fn test_timing_and_toggle_steps_parse() {
    let yaml = "- wait_ms: 250\n- enabled: false\n";
    let steps: Vec<TraceStep> = serde_yaml::from_str(yaml).unwrap();

    assert!(matches!(steps[0], TraceStep::Wait { wait_ms: 250 }));
    assert!(matches!(steps[1], TraceStep::Enabled { enabled: false }));
  }

  #[test]
  fn test_unknown_trace_event_is_rejected() {
    let yaml = "- event: pinch\n  y: 3\n";
    assert!(serde_yaml::from_str::<Vec<TraceStep>>(yaml).is_err());
  }
}
