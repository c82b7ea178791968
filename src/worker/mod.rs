//! Worker runtime: lifecycle hooks, the hosting loop and the cache router.
//!
//! The host fires four hooks at one [`WorkerHooks`] implementation: install,
//! activate, fetch and message. [`CacheRouter`] is the production hooks object.

mod host;
mod message;
mod result;
mod router;
mod scope;

use async_trait::async_trait;
use color_eyre::Result;

use crate::http::Request;

pub use host::{WorkerHost, WorkerState};
pub use message::ClientMessage;
pub use result::{FetchResult, ResponseSource};
pub use router::CacheRouter;
pub use scope::{ClientList, WorkerScope};

/// What a fetch hook decided to do with a request.
#[derive(Debug)]
pub enum FetchDisposition {
  /// Not intercepted; the host fetches it from the network unchanged
  PassThrough,
  /// Answered by the worker
  Respond(FetchResult),
}

/// Lifecycle hooks of a worker, registered once with a [`WorkerHost`].
#[async_trait]
pub trait WorkerHooks: Send + Sync {
  /// Runs once when this worker version is installed. An error makes the
  /// worker redundant.
  async fn on_install(&self, scope: &WorkerScope) -> Result<()>;

  /// Runs once when this worker version takes over from the previous one.
  async fn on_activate(&self, scope: &WorkerScope) -> Result<()>;

  /// Runs for every request issued by a controlled client.
  async fn on_fetch(&self, scope: &WorkerScope, request: &Request) -> Result<FetchDisposition>;

  /// Runs for every message posted by a client page.
  async fn on_message(&self, scope: &WorkerScope, message: &ClientMessage) -> Result<()>;
}
