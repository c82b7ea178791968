//! Hosts one worker version and drives it through its lifecycle.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;

use super::message::ClientMessage;
use super::result::FetchResult;
use super::scope::WorkerScope;
use super::{FetchDisposition, WorkerHooks};
use crate::http::{Fetch, Request};

/// Lifecycle state of a hosted worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Registered, install not started
  Parsed,
  Installing,
  /// Installed and waiting for older clients to go away
  Installed,
  Activating,
  /// Intercepting fetches
  Activated,
  /// Install failed; the worker never runs
  Redundant,
}

/// Runs a [`WorkerHooks`] implementation the way a browser runs a worker:
/// install, wait, activate, then route fetches and messages to it.
pub struct WorkerHost<H: WorkerHooks> {
  hooks: H,
  scope: WorkerScope,
  network: Arc<dyn Fetch>,
  state: WorkerState,
}

impl<H: WorkerHooks> WorkerHost<H> {
  pub fn new(hooks: H, scope: WorkerScope, network: Arc<dyn Fetch>) -> Self {
    Self {
      hooks,
      scope,
      network,
      state: WorkerState::Parsed,
    }
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  /// Install, then activate if nothing holds the worker back.
  pub async fn start(&mut self) -> Result<()> {
    self.install().await?;
    self.try_activate().await?;
    Ok(())
  }

  /// Restart an already activated version without re-running its hooks, as
  /// happens when the host wakes a worker that was installed earlier.
  pub fn resume(&mut self) -> Result<()> {
    if self.state != WorkerState::Parsed {
      return Err(eyre!("Cannot resume worker in state {:?}", self.state));
    }
    self.state = WorkerState::Activated;
    tracing::debug!(version = self.scope.version(), "Resumed activated worker");
    Ok(())
  }

  pub async fn install(&mut self) -> Result<()> {
    if self.state != WorkerState::Parsed {
      return Err(eyre!("Cannot install worker in state {:?}", self.state));
    }

    self.state = WorkerState::Installing;
    match self.hooks.on_install(&self.scope).await {
      Ok(()) => {
        self.state = WorkerState::Installed;
        tracing::info!(version = self.scope.version(), "Worker installed");
        Ok(())
      }
      Err(e) => {
        self.state = WorkerState::Redundant;
        tracing::warn!(version = self.scope.version(), error = %e, "Worker install failed");
        Err(e)
      }
    }
  }

  /// Whether an installed worker may activate now.
  fn can_activate(&self) -> Result<bool> {
    if self.state != WorkerState::Installed {
      return Ok(false);
    }
    if self.scope.skip_waiting_requested() {
      return Ok(true);
    }
    Ok(!self.scope.clients().controlled_by_other(self.scope.version())?)
  }

  /// Activate if installed and not waiting. Returns whether activation ran.
  pub async fn try_activate(&mut self) -> Result<bool> {
    if !self.can_activate()? {
      if self.state == WorkerState::Installed {
        tracing::info!(version = self.scope.version(), "Worker waiting for older clients");
      }
      return Ok(false);
    }

    self.state = WorkerState::Activating;
    // An activate failure does not stop the worker from taking over
    if let Err(e) = self.hooks.on_activate(&self.scope).await {
      tracing::warn!(version = self.scope.version(), error = %e, "Worker activate hook failed");
    }
    self.state = WorkerState::Activated;
    tracing::info!(version = self.scope.version(), "Worker activated");
    Ok(true)
  }

  /// A client page closed; a waiting worker may now activate.
  #[cfg(test)]
  pub async fn client_closed(&mut self, id: u32) -> Result<()> {
    self.scope.clients().close(id)?;
    self.try_activate().await?;
    Ok(())
  }

  /// Deliver a message posted by a client page.
  pub async fn post_message(&mut self, message: &ClientMessage) -> Result<()> {
    self.hooks.on_message(&self.scope, message).await?;
    self.try_activate().await?;
    Ok(())
  }

  /// Issue a request from a client page.
  ///
  /// Until the worker is activated, and for requests it passes through, the
  /// request goes straight to the network.
  pub async fn fetch(&self, request: &Request) -> Result<FetchResult> {
    if self.state == WorkerState::Activated {
      if let FetchDisposition::Respond(result) = self.hooks.on_fetch(&self.scope, request).await? {
        return Ok(result);
      }
    }

    let response = self.network.fetch(request).await?;
    Ok(FetchResult::passthrough(response))
  }
}
