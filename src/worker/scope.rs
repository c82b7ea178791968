//! The global scope a worker's hooks run against.

use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

/// An open client page and the worker version controlling it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Client {
  id: u32,
  controller: Option<String>,
}

/// Client pages open for the worker's origin.
///
/// Shared between worker versions: the handle is cloned into every scope, so
/// a new version sees the pages controlled by its predecessor.
#[derive(Debug, Clone, Default)]
pub struct ClientList {
  inner: Arc<Mutex<Vec<Client>>>,
}

impl ClientList {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, Vec<Client>>> {
    self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Register an open page, optionally already controlled by `controller`.
  #[cfg(test)]
  pub fn open(&self, id: u32, controller: Option<&str>) -> Result<()> {
    let mut clients = self.lock()?;
    clients.retain(|c| c.id != id);
    clients.push(Client {
      id,
      controller: controller.map(String::from),
    });
    Ok(())
  }

  /// Forget a closed page. Returns whether it was open.
  #[cfg(test)]
  pub fn close(&self, id: u32) -> Result<bool> {
    let mut clients = self.lock()?;
    let before = clients.len();
    clients.retain(|c| c.id != id);
    Ok(clients.len() != before)
  }

  /// Version controlling the given page.
  #[cfg(test)]
  pub fn controller(&self, id: u32) -> Result<Option<String>> {
    let clients = self.lock()?;
    Ok(clients.iter().find(|c| c.id == id).and_then(|c| c.controller.clone()))
  }

  /// Whether any page is controlled by a version other than `version`.
  pub fn controlled_by_other(&self, version: &str) -> Result<bool> {
    let clients = self.lock()?;
    Ok(
      clients
        .iter()
        .any(|c| c.controller.as_deref().is_some_and(|v| v != version)),
    )
  }

  fn claim(&self, version: &str) -> Result<usize> {
    let mut clients = self.lock()?;
    for client in clients.iter_mut() {
      client.controller = Some(version.to_string());
    }
    Ok(clients.len())
  }
}

/// Global state visible to one worker version's hooks.
#[derive(Debug)]
pub struct WorkerScope {
  origin: Url,
  version: String,
  clients: ClientList,
  skip_waiting: AtomicBool,
}

impl WorkerScope {
  pub fn new(origin: Url, version: &str, clients: ClientList) -> Self {
    Self {
      origin,
      version: version.to_string(),
      clients,
      skip_waiting: AtomicBool::new(false),
    }
  }

  /// Origin this worker is registered for.
  pub fn origin(&self) -> &Url {
    &self.origin
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn clients(&self) -> &ClientList {
    &self.clients
  }

  /// Let this version activate without waiting for older clients to close.
  pub fn skip_waiting(&self) {
    self.skip_waiting.store(true, Ordering::SeqCst);
  }

  pub fn skip_waiting_requested(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  /// Take control of every open client page. Returns how many were claimed.
  pub fn claim_clients(&self) -> Result<usize> {
    self.clients.claim(&self.version)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scope(version: &str, clients: ClientList) -> WorkerScope {
    let origin = Url::parse("https://app.clubnath.com").unwrap();
    WorkerScope::new(origin, version, clients)
  }

  #[test]
  fn test_claim_takes_over_all_clients() {
    let clients = ClientList::new();
    clients.open(1, Some("v1")).unwrap();
    clients.open(2, None).unwrap();

    let scope = scope("v2", clients.clone());
    assert!(clients.controlled_by_other("v2").unwrap());

    assert_eq!(scope.claim_clients().unwrap(), 2);
    assert_eq!(clients.controller(1).unwrap().as_deref(), Some("v2"));
    assert_eq!(clients.controller(2).unwrap().as_deref(), Some("v2"));
    assert!(!clients.controlled_by_other("v2").unwrap());
  }

  #[test]
  fn test_uncontrolled_clients_do_not_block() {
    let clients = ClientList::new();
    clients.open(1, None).unwrap();
    assert!(!clients.controlled_by_other("v1").unwrap());
  }

  #[test]
  fn test_close_client() {
    let clients = ClientList::new();
    clients.open(7, Some("v0")).unwrap();

    assert!(clients.close(7).unwrap());
    assert!(!clients.close(7).unwrap());
    assert!(!clients.controlled_by_other("v1").unwrap());
  }

  #[test]
  fn test_skip_waiting_flag() {
    let scope = scope("v1", ClientList::new());
    assert!(!scope.skip_waiting_requested());
    scope.skip_waiting();
    assert!(scope.skip_waiting_requested());
  }
}
