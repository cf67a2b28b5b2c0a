use std::{io, path::Path, sync::Arc};

use async_trait::async_trait;
use keyring::{Entry, Error as KeyringError};
use serde::{Deserialize, Serialize};

use super::{
  config_store::{ConfigStore, TokenStorageMode},
  error::{HubError, HubResult},
  logbus::LogBus,
  paths::AppPaths,
};

const SERVICE: &str = "local-ai-hub";
const TELEGRAM_TOKEN_USER: &str = "telegram-bot-token";
const LOG_SOURCE: &str = "secrets";

/// What the secret store reports about the bot token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
  pub stored: bool,
  pub mode: TokenStorageMode,
  pub error: Option<String>,
}

impl Credential {
  fn missing(mode: TokenStorageMode) -> Self {
    Self {
      stored: false,
      mode,
      error: None,
    }
  }
}

/// Secure secret persistence. An `Err` means the call itself failed; a
/// returned `Credential` with `stored == false` means the call went through
/// but nothing is persisted.
#[async_trait]
pub trait CredentialStore: Send + Sync {
  async fn status(&self) -> HubResult<Credential>;
  async fn set(&self, secret: &str) -> HubResult<Credential>;
  async fn delete(&self) -> HubResult<()>;
}

/// Result of a `set` as seen by the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOutcome {
  Persisted(Credential),
  Rejected { reason: String, hint: String },
  TransportError(HubError),
}

impl CredentialOutcome {
  pub fn into_result(self) -> HubResult<Credential> {
    match self {
      Self::Persisted(c) => Ok(c),
      Self::Rejected { reason, hint } => Err(HubError::CredentialPersist { reason, hint }),
      Self::TransportError(e) => Err(e),
    }
  }
}

/// Hub-side wrapper that never lets "the call succeeded" pass for "the
/// secret is saved".
#[derive(Clone)]
pub struct Credentials {
  store: Arc<dyn CredentialStore>,
  logs: LogBus,
}

impl Credentials {
  pub fn new(store: Arc<dyn CredentialStore>, logs: LogBus) -> Self {
    Self { store, logs }
  }

  pub async fn status(&self) -> HubResult<Credential> {
    self.store.status().await
  }

  pub async fn set(&self, secret: &str) -> CredentialOutcome {
    let secret = secret.trim();
    if secret.is_empty() {
      return CredentialOutcome::Rejected {
        reason: "token is empty".to_string(),
        hint: "Paste the bot token first.".to_string(),
      };
    }

    match self.store.set(secret).await {
      Ok(c) if c.stored => {
        self.logs.info(LOG_SOURCE, format!("token saved ({})", c.mode.as_str()));
        CredentialOutcome::Persisted(c)
      }
      Ok(c) => {
        let reason = c.error.clone().unwrap_or_else(|| default_reason(c.mode).to_string());
        self.logs.error(LOG_SOURCE, format!("token not persisted: {reason}"));
        CredentialOutcome::Rejected {
          reason,
          hint: corrective_hint(c.mode).to_string(),
        }
      }
      Err(e) => {
        self.logs.error(LOG_SOURCE, format!("set token failed: {e}"));
        CredentialOutcome::TransportError(e)
      }
    }
  }

  pub async fn set_secret(&self, secret: &str) -> HubResult<Credential> {
    self.set(secret).await.into_result()
  }

  pub async fn delete(&self) -> HubResult<()> {
    self.store.delete().await?;
    self.logs.info(LOG_SOURCE, "token deleted");
    Ok(())
  }
}

fn default_reason(mode: TokenStorageMode) -> &'static str {
  match mode {
    TokenStorageMode::Keychain => "Could not save the token to the system keychain.",
    TokenStorageMode::File => "Could not save the token to file.",
  }
}

fn corrective_hint(mode: TokenStorageMode) -> &'static str {
  match mode {
    TokenStorageMode::Keychain => "Switch token storage to File (fallback) and try again.",
    TokenStorageMode::File => "Check that the app data folder is writable.",
  }
}

/// Keychain- or file-backed storage for the bot token. The mode is read from
/// the current config on every call.
pub struct LocalCredentialStore {
  config: Arc<dyn ConfigStore>,
  paths: AppPaths,
}

impl LocalCredentialStore {
  pub fn new(config: Arc<dyn ConfigStore>, paths: AppPaths) -> Self {
    Self { config, paths }
  }

  async fn mode(&self) -> HubResult<TokenStorageMode> {
    Ok(self.config.get_config().await?.telegram.token_storage)
  }

  /// Reads the raw token for the runtime that needs it.
  pub async fn get_token(&self) -> HubResult<String> {
    let token = match self.mode().await? {
      TokenStorageMode::Keychain => match telegram_entry()?.get_password() {
        Ok(pw) => pw,
        Err(KeyringError::NoEntry) => return Err("Telegram token missing".into()),
        Err(e) => return Err(format!("get token failed: {e}").into()),
      },
      TokenStorageMode::File => match std::fs::read_to_string(self.paths.telegram_token_fallback_path()) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err("Telegram token missing".into()),
        Err(e) => return Err(format!("get token failed: {e}").into()),
      },
    };
    let token = token.trim().to_string();
    if token.is_empty() {
      return Err("Telegram token missing".into());
    }
    Ok(token)
  }
}

#[async_trait]
impl CredentialStore for LocalCredentialStore {
  async fn status(&self) -> HubResult<Credential> {
    let mode = self.mode().await?;
    Ok(read_status(mode, &self.paths))
  }

  async fn set(&self, secret: &str) -> HubResult<Credential> {
    let mode = self.mode().await?;
    let written = match mode {
      TokenStorageMode::Keychain => write_keychain(secret),
      TokenStorageMode::File => write_file(&self.paths.telegram_token_fallback_path(), secret),
    };
    if let Err(e) = written {
      return Ok(Credential {
        stored: false,
        mode,
        error: Some(e),
      });
    }

    let mut st = read_status(mode, &self.paths);
    if !st.stored && st.error.is_none() {
      st.error = Some("Token was not found after saving. Try enabling File (fallback).".to_string());
    }
    Ok(st)
  }

  async fn delete(&self) -> HubResult<()> {
    // A missing secret counts as deleted.
    match self.mode().await? {
      TokenStorageMode::Keychain => match telegram_entry()?.delete_credential() {
        Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
        Err(e) => Err(format!("delete token failed: {e}").into()),
      },
      TokenStorageMode::File => match std::fs::remove_file(self.paths.telegram_token_fallback_path()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(format!("delete token failed: {e}").into()),
      },
    }
  }
}

fn telegram_entry() -> Result<Entry, String> {
  Entry::new(SERVICE, TELEGRAM_TOKEN_USER).map_err(|e| format!("keyring entry error: {e}"))
}

fn read_status(mode: TokenStorageMode, paths: &AppPaths) -> Credential {
  let read = match mode {
    TokenStorageMode::Keychain => match telegram_entry() {
      Ok(entry) => match entry.get_password() {
        Ok(pw) => Ok(Some(pw)),
        Err(KeyringError::NoEntry) => Ok(None),
        Err(e) => Err(e.to_string()),
      },
      Err(e) => Err(e),
    },
    TokenStorageMode::File => match std::fs::read_to_string(paths.telegram_token_fallback_path()) {
      Ok(raw) => Ok(Some(raw)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.to_string()),
    },
  };

  match read {
    Ok(Some(raw)) => Credential {
      stored: !raw.trim().is_empty(),
      mode,
      error: None,
    },
    Ok(None) => Credential::missing(mode),
    Err(e) => Credential {
      stored: false,
      mode,
      error: Some(e),
    },
  }
}

fn write_keychain(token: &str) -> Result<(), String> {
  let entry = telegram_entry()?;
  entry.set_password(token).map_err(|e| format!("set token failed: {e}"))?;
  let read_back = entry.get_password().map_err(|e| format!("read-back failed: {e}"))?;
  if read_back != token {
    return Err("token read-back verification failed".to_string());
  }
  Ok(())
}

fn write_file(path: &Path, token: &str) -> Result<(), String> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).map_err(|e| format!("create app data dir failed: {e}"))?;
  }
  std::fs::write(path, token).map_err(|e| format!("write token failed: {e}"))?;
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
  }
  let rb = std::fs::read_to_string(path).map_err(|e| format!("read-back failed: {e}"))?;
  if rb.trim() != token {
    return Err("token read-back verification failed".to_string());
  }
  Ok(())
}
