//! Pull-to-refresh gesture handling.
//!
//! Single-finger vertical drags that start while the bound scroll region is at
//! the top are damped into a pull distance. Releasing past the threshold runs
//! the caller's refresh action; the controller returns to idle once it settles,
//! whatever the outcome.

mod controller;
mod region;
mod state;

pub use controller::{PullConfig, PullGestureController, TouchEvent};
pub use region::{ScrollOffset, ScrollRegion};
pub use state::{PullPhase, PullState};
