use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::core::{
  config_store::{AppConfig, ConfigStore, TokenStorageMode},
  error::{HubError, HubResult},
  logbus::LogBus,
};

/// Whole-document config editing. Every change is get, mutate, save of the
/// full `AppConfig`; edits are serialized so two of them never interleave.
#[derive(Clone)]
pub struct Settings {
  store: Arc<dyn ConfigStore>,
  logs: LogBus,
  edit_lock: Arc<Mutex<()>>,
  current: Arc<watch::Sender<AppConfig>>,
}

impl Settings {
  pub fn new(store: Arc<dyn ConfigStore>, logs: LogBus) -> Self {
    let (current, _) = watch::channel(AppConfig::default());
    Self {
      store,
      logs,
      edit_lock: Arc::new(Mutex::new(())),
      current: Arc::new(current),
    }
  }

  pub fn store(&self) -> Arc<dyn ConfigStore> {
    self.store.clone()
  }

  /// Last loaded or saved document.
  pub fn current(&self) -> AppConfig {
    self.current.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<AppConfig> {
    self.current.subscribe()
  }

  pub async fn load(&self) -> HubResult<AppConfig> {
    let cfg = self.store.get_config().await?;
    self.publish(cfg.clone());
    Ok(cfg)
  }

  pub async fn save(&self, cfg: AppConfig) -> HubResult<()> {
    let _guard = self.edit_lock.lock().await;
    self.save_locked(cfg).await
  }

  /// Applies `f` to a fresh copy of the stored document and saves the
  /// result. Nothing is published if the save fails.
  pub async fn update<F>(&self, f: F) -> HubResult<AppConfig>
  where
    F: FnOnce(&mut AppConfig) -> HubResult<()> + Send,
  {
    let _guard = self.edit_lock.lock().await;
    let mut cfg = self.store.get_config().await?;
    f(&mut cfg)?;
    self.save_locked(cfg.clone()).await?;
    Ok(cfg)
  }

  pub async fn allow_chat(&self, chat_id: i64) -> HubResult<AppConfig> {
    self
      .update(|cfg| {
        cfg.telegram.allowed_chat_ids.insert(chat_id);
        Ok(())
      })
      .await
  }

  pub async fn disallow_chat(&self, chat_id: i64) -> HubResult<AppConfig> {
    self
      .update(|cfg| {
        cfg.telegram.allowed_chat_ids.remove(&chat_id);
        Ok(())
      })
      .await
  }

  pub async fn set_language(&self, language: Option<String>) -> HubResult<AppConfig> {
    let language = language.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
    self
      .update(|cfg| {
        cfg.ui.language = language;
        Ok(())
      })
      .await
  }

  /// Blank clears the workspace.
  pub async fn set_workspace_dir(&self, dir: Option<String>) -> HubResult<AppConfig> {
    let dir = dir.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
    self
      .update(|cfg| {
        cfg.codex.workspace_dir = dir;
        Ok(())
      })
      .await
  }

  pub async fn set_universal_instructions(&self, text: String, fallback_only: bool) -> HubResult<AppConfig> {
    self
      .update(|cfg| {
        cfg.codex.universal_instructions = text;
        cfg.codex.universal_fallback_only = fallback_only;
        Ok(())
      })
      .await
  }

  pub async fn set_token_storage(&self, mode: TokenStorageMode) -> HubResult<AppConfig> {
    self
      .update(|cfg| {
        cfg.telegram.token_storage = mode;
        Ok(())
      })
      .await
  }

  async fn save_locked(&self, cfg: AppConfig) -> HubResult<()> {
    if let Err(e) = self.store.save_config(cfg.clone()).await {
      self.logs.error("config", format!("save failed: {e}"));
      return Err(e);
    }
    self.publish(cfg);
    Ok(())
  }

  fn publish(&self, cfg: AppConfig) {
    self.current.send_if_modified(|cur| {
      if *cur == cfg {
        return false;
      }
      *cur = cfg;
      true
    });
  }
}

/// Parses a chat id typed by the user.
pub fn parse_chat_id(text: &str) -> HubResult<i64> {
  let text = text.trim();
  if text.is_empty() {
    return Err(HubError::Backend("Enter a chat id.".to_string()));
  }
  text
    .parse::<i64>()
    .map_err(|_| HubError::Backend(format!("Chat id must be a whole number, got \"{text}\".")))
}
