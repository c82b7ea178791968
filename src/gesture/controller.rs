//! Touch-driven pull-to-refresh state machine.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::region::{ScrollOffset, ScrollRegion};
use super::state::{PullPhase, PullState};

/// Maximum pull distance as a multiple of the threshold.
const MAX_PULL_FACTOR: f64 = 1.5;

/// Gesture tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PullConfig {
  /// Pull distance at which releasing triggers a refresh
  pub threshold: f64,
  /// Damping applied to the raw drag, in (0, 1]
  pub resistance: f64,
  pub enabled: bool,
}

impl Default for PullConfig {
  fn default() -> Self {
    Self {
      threshold: 80.0,
      resistance: 0.5,
      enabled: true,
    }
  }
}

impl PullConfig {
  pub fn validate(&self) -> Result<()> {
    if !(self.threshold.is_finite() && self.threshold > 0.0) {
      return Err(eyre!("threshold must be positive, got {}", self.threshold));
    }
    if !(self.resistance > 0.0 && self.resistance <= 1.0) {
      return Err(eyre!("resistance must be in (0, 1], got {}", self.resistance));
    }
    Ok(())
  }

  fn max_distance(&self) -> f64 {
    self.threshold * MAX_PULL_FACTOR
  }
}

/// A single-finger touch event, in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TouchEvent {
  Start { y: f64 },
  Move { y: f64 },
  End,
}

type BoxFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

type RefreshFn = Box<dyn Fn() -> BoxFuture + Send + Sync>;

/// Converts touch events into a damped pull distance and runs the refresh
/// action when a pull is released past the threshold.
///
/// The refresh action runs on a spawned task. Call [`poll`](Self::poll) from
/// the event loop, or await [`wait_for_refresh`](Self::wait_for_refresh), to
/// observe its completion.
pub struct PullGestureController {
  config: PullConfig,
  state: PullState,
  region: Arc<dyn ScrollRegion>,
  start_y: Option<f64>,
  current_y: Option<f64>,
  on_refresh: RefreshFn,
  receiver: Option<mpsc::UnboundedReceiver<Result<()>>>,
}

impl PullGestureController {
  /// Create a controller bound to the document root.
  pub fn new<F, Fut>(config: PullConfig, on_refresh: F) -> Result<Self>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
  {
    config.validate()?;

    Ok(Self {
      config,
      state: PullState::default(),
      region: Arc::new(ScrollOffset::document_root()),
      start_y: None,
      current_y: None,
      on_refresh: Box::new(move || Box::pin(on_refresh())),
      receiver: None,
    })
  }

  /// Rebind the gesture to another scrollable region.
  pub fn bind_scroll_region(&mut self, region: Arc<dyn ScrollRegion>) {
    self.region = region;
  }

  pub fn state(&self) -> PullState {
    self.state
  }

  pub fn phase(&self) -> PullPhase {
    self.state.phase()
  }

  /// Indicator progress in [0, 1].
  pub fn progress(&self) -> f64 {
    (self.state.pull_distance / self.config.threshold).min(1.0)
  }

  /// Enable or disable the gesture. Disabling drops any touch in progress.
  pub fn set_enabled(&mut self, enabled: bool) {
    self.config.enabled = enabled;
    if !enabled {
      self.reset_tracking();
      if self.state.is_pulling {
        self.state = PullState::default();
      }
    }
  }

  fn at_top(&self) -> bool {
    self.region.scroll_top() == 0.0
  }

  fn accepts_touches(&self) -> bool {
    self.config.enabled && !self.state.is_refreshing
  }

  pub fn touch_start(&mut self, y: f64) {
    if !self.accepts_touches() {
      return;
    }

    if self.at_top() {
      self.start_y = Some(y);
    }
  }

  /// Returns true when the default scroll should be suppressed.
  pub fn touch_move(&mut self, y: f64) -> bool {
    if !self.accepts_touches() {
      return false;
    }
    let Some(start_y) = self.start_y else {
      return false;
    };

    self.current_y = Some(y);
    let delta = y - start_y;

    if delta > 0.0 && self.at_top() {
      let distance = (delta * self.config.resistance).min(self.config.max_distance());
      self.state = PullState::pulling(distance);
      return true;
    }

    false
  }

  pub fn touch_end(&mut self) {
    if !self.accepts_touches() {
      return;
    }

    if self.state.pull_distance >= self.config.threshold {
      tracing::debug!(distance = self.state.pull_distance, "Pull released, refreshing");
      self.state = PullState::refreshing(self.state.pull_distance);
      self.start_refresh();
    } else {
      self.state = PullState::default();
    }

    self.reset_tracking();
  }

  /// Dispatch a recorded touch event. Returns true when the default scroll
  /// should be suppressed.
  pub fn handle(&mut self, event: TouchEvent) -> bool {
    match event {
      TouchEvent::Start { y } => {
        self.touch_start(y);
        false
      }
      TouchEvent::Move { y } => self.touch_move(y),
      TouchEvent::End => {
        self.touch_end();
        false
      }
    }
  }

  /// Poll for completion of a pending refresh.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(result) => {
        self.finish_refresh(Some(result));
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.finish_refresh(None);
        true
      }
    }
  }

  /// Wait until a pending refresh settles. Returns immediately if none is running.
  pub async fn wait_for_refresh(&mut self) {
    let result = match &mut self.receiver {
      Some(rx) => rx.recv().await,
      None => return,
    };
    self.finish_refresh(result);
  }

  fn start_refresh(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);

    let future = (self.on_refresh)();
    tokio::spawn(async move {
      let result = future.await;
      // Ignore send errors - the controller may have been dropped
      let _ = tx.send(result);
    });
  }

  fn finish_refresh(&mut self, result: Option<Result<()>>) {
    match result {
      Some(Ok(())) => tracing::debug!("Refresh completed"),
      Some(Err(e)) => tracing::warn!(error = %e, "Refresh failed"),
      None => tracing::warn!("Refresh task ended without a result"),
    }
    self.receiver = None;
    self.state = PullState::default();
  }

  fn reset_tracking(&mut self) {
    self.start_y = None;
    self.current_y = None;
  }
}

impl std::fmt::Debug for PullGestureController {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PullGestureController")
      .field("config", &self.config)
      .field("state", &self.state)
      .field("start_y", &self.start_y)
      .field("current_y", &self.current_y)
      .finish_non_exhaustive()
  }
}
