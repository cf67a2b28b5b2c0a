use thiserror::Error;

/// Failure classes surfaced by the hub.
///
/// Background loops swallow `TransportUnavailable` and retry on the next tick;
/// user-initiated actions hand every variant back to the caller so it can be
/// rendered next to the control that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
  #[error("backend not available")]
  TransportUnavailable,
  #[error("{0}")]
  PrerequisiteMissing(String),
  #[error("{reason} ({hint})")]
  CredentialPersist { reason: String, hint: String },
  #[error("{0}")]
  Backend(String),
}

impl HubError {
  pub fn is_transport(&self) -> bool {
    matches!(self, Self::TransportUnavailable)
  }
}

impl From<String> for HubError {
  fn from(msg: String) -> Self {
    Self::Backend(msg)
  }
}

impl From<&str> for HubError {
  fn from(msg: &str) -> Self {
    Self::Backend(msg.to_string())
  }
}

pub type HubResult<T> = Result<T, HubError>;
