use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorId {
  /// Chat-bot polling connector.
  Telegram,
  /// Local AI-session connector.
  Codex,
}

impl ConnectorId {
  pub const ALL: [ConnectorId; 2] = [ConnectorId::Telegram, ConnectorId::Codex];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Telegram => "telegram",
      Self::Codex => "codex",
    }
  }

  /// The AI session is only usable once an account is attached.
  pub fn requires_auth(self) -> bool {
    matches!(self, Self::Codex)
  }

  /// Whether the connector runs an app-managed local install that `doctor`
  /// and `install` are about.
  pub fn has_local_install(self) -> bool {
    matches!(self, Self::Codex)
  }
}

impl fmt::Display for ConnectorId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
  Apikey,
  Chatgpt,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorStatus {
  pub id: Option<ConnectorId>,
  pub running: bool,
  pub initialized: bool,
  pub last_error: Option<String>,
  pub auth_mode: Option<AuthMode>,
  pub login_url: Option<String>,
  pub login_id: Option<String>,
}

impl ConnectorStatus {
  pub fn for_connector(id: ConnectorId) -> Self {
    Self {
      id: Some(id),
      ..Self::default()
    }
  }

  /// A pending interactive login is over once an auth mode is known.
  pub fn normalized(mut self) -> Self {
    if self.auth_mode.is_some() {
      self.login_url = None;
      self.login_id = None;
    }
    self
  }

  pub fn login_pending(&self) -> bool {
    self.auth_mode.is_none() && self.login_url.is_some()
  }
}

/// Read-only prerequisite check used to gate `connect`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Doctor {
  pub runtime_ok: bool,
  pub runtime_path: Option<String>,
  pub package_manager_ok: bool,
  pub package_manager_path: Option<String>,
  pub local_binary_ok: bool,
  pub local_binary_version: Option<String>,
}

impl Doctor {
  /// Why installation cannot proceed, if it cannot.
  pub fn missing_install_prerequisite(&self) -> Option<&'static str> {
    if !self.runtime_ok {
      return Some("Node.js is required to install/run Codex. Install Node.js first, then try again.");
    }
    if !self.package_manager_ok {
      return Some("npm is required to install Codex. Install Node.js (includes npm) first, then try again.");
    }
    None
  }

  pub fn missing_connect_prerequisite(&self) -> Option<&'static str> {
    if !self.local_binary_ok {
      return Some("Codex is not installed. Install it in Codex settings.");
    }
    if !self.runtime_ok {
      return Some("Node.js is required to run Codex. Install Node.js first, then try again.");
    }
    None
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SelfTestResult {
  pub ok: bool,
  pub identity: Option<String>,
  pub sent_probe: bool,
  pub error: Option<String>,
}

/// Lifecycle phase as tracked on the hub side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorPhase {
  Uninitialized,
  Checking,
  NotInstalled,
  InstallFailed,
  Installable,
  Installing,
  Connecting,
  Ready,
  NotReady,
  LoggingIn,
  Error,
}
