use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;

/// Command posted to the worker by a client page, e.g. `{"type":"SKIP_WAITING"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  /// Activate the waiting worker without waiting for older clients to close
  SkipWaiting,
  /// Any message type this worker does not handle
  #[serde(other)]
  Unknown,
}

impl ClientMessage {
  pub fn parse(json: &str) -> Result<Self> {
    serde_json::from_str(json).map_err(|e| eyre!("Invalid client message '{}': {}", json, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_skip_waiting() {
    let msg = ClientMessage::parse(r#"{"type":"SKIP_WAITING"}"#).unwrap();
    assert_eq!(msg, ClientMessage::SkipWaiting);
  }

  #[test]
  fn test_unknown_type_is_tolerated() {
    let msg = ClientMessage::parse(r#"{"type":"CLEAR_BADGE","count":3}"#).unwrap();
    assert_eq!(msg, ClientMessage::Unknown);
  }

  #[test]
  fn test_missing_type_is_an_error() {
    assert!(ClientMessage::parse(r#"{"kind":"SKIP_WAITING"}"#).is_err());
    assert!(ClientMessage::parse("not json").is_err());
  }
}
