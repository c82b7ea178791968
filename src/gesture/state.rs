//! Observable gesture state.

/// Where the gesture state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullPhase {
  Idle,
  Pulling,
  Refreshing,
}

/// Snapshot rendered by the presentation layer.
///
/// `is_pulling` and `is_refreshing` are never both set, and `pull_distance`
/// stays within `[0, threshold * 1.5]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PullState {
  pub is_pulling: bool,
  pub is_refreshing: bool,
  pub pull_distance: f64,
}

impl PullState {
  pub fn phase(&self) -> PullPhase {
    if self.is_refreshing {
      PullPhase::Refreshing
    } else if self.is_pulling {
      PullPhase::Pulling
    } else {
      PullPhase::Idle
    }
  }

  pub(super) fn pulling(distance: f64) -> Self {
    Self {
      is_pulling: true,
      is_refreshing: false,
      pull_distance: distance,
    }
  }

  /// Refreshing keeps the release distance so the indicator stays in place.
  pub(super) fn refreshing(distance: f64) -> Self {
    Self {
      is_pulling: false,
      is_refreshing: true,
      pull_distance: distance,
    }
  }
}
