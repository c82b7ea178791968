//! Scrollable regions the gesture can be bound to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Anything with a vertical scroll offset.
pub trait ScrollRegion: Send + Sync {
  /// Current distance scrolled from the top, in pixels.
  fn scroll_top(&self) -> f64;
}

/// Shared, externally updated scroll offset.
///
/// Clones observe the same value, so the presentation layer keeps one handle
/// and updates it on scroll while the controller reads another.
#[derive(Debug, Clone, Default)]
pub struct ScrollOffset {
  bits: Arc<AtomicU64>,
}

impl ScrollOffset {
  /// Offset of the document root, initially at the top.
  pub fn document_root() -> Self {
    Self::default()
  }

  pub fn set(&self, top: f64) {
    self.bits.store(top.max(0.0).to_bits(), Ordering::Relaxed);
  }
}

impl ScrollRegion for ScrollOffset {
  fn scroll_top(&self) -> f64 {
    f64::from_bits(self.bits.load(Ordering::Relaxed))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_clones_share_offset() {
    let offset = ScrollOffset::document_root();
    let view = offset.clone();
    assert_eq!(view.scroll_top(), 0.0);

    offset.set(42.5);
    assert_eq!(view.scroll_top(), 42.5);
  }

  #[test]
  fn test_negative_overscroll_clamps_to_top() {
    let offset = ScrollOffset::document_root();
    offset.set(-12.0);
    assert_eq!(offset.scroll_top(), 0.0);
  }
}
