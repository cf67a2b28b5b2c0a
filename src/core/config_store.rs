use std::{
  collections::BTreeSet,
  fs,
  path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::error::HubResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStorageMode {
  #[default]
  Keychain,
  File,
}

impl TokenStorageMode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Keychain => "keychain",
      Self::File => "file",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramConfig {
  #[serde(default)]
  pub allowed_chat_ids: BTreeSet<i64>,
  #[serde(default = "default_poll_interval_sec", alias = "poll_timeout_sec")]
  pub poll_interval_sec: u64,
  #[serde(default)]
  pub token_storage: TokenStorageMode,
}

fn default_poll_interval_sec() -> u64 {
  20
}

impl TelegramConfig {
  /// Interval actually handed to the bot runtime.
  pub fn effective_poll_interval_sec(&self) -> u64 {
    self.poll_interval_sec.clamp(1, 60)
  }
}

impl Default for TelegramConfig {
  fn default() -> Self {
    Self {
      allowed_chat_ids: BTreeSet::new(),
      poll_interval_sec: default_poll_interval_sec(),
      token_storage: TokenStorageMode::default(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodexConfig {
  // Folder the AI session treats as its workspace. Unset means the process cwd.
  #[serde(default)]
  pub workspace_dir: Option<String>,

  // Applied when the workspace carries no instructions of its own, or always
  // when universal_fallback_only is false.
  #[serde(default)]
  pub universal_instructions: String,

  #[serde(default = "default_universal_fallback_only")]
  pub universal_fallback_only: bool,
}

impl Default for CodexConfig {
  fn default() -> Self {
    Self {
      workspace_dir: None,
      universal_instructions: String::new(),
      universal_fallback_only: default_universal_fallback_only(),
    }
  }
}

fn default_universal_fallback_only() -> bool {
  true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiConfig {
  // Language code ("en", "uk"); None means follow the system language.
  #[serde(default)]
  pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
  #[serde(default)]
  pub telegram: TelegramConfig,
  #[serde(default)]
  pub codex: CodexConfig,
  #[serde(default)]
  pub ui: UiConfig,
}

/// Whole-document configuration persistence.
#[async_trait]
pub trait ConfigStore: Send + Sync {
  async fn get_config(&self) -> HubResult<AppConfig>;
  async fn save_config(&self, cfg: AppConfig) -> HubResult<()>;
}

/// JSON file under the app data dir, mirrored in memory.
pub struct FileConfigStore {
  path: PathBuf,
  current: RwLock<AppConfig>,
}

impl FileConfigStore {
  /// Loads the document, falling back to defaults when the file is missing
  /// or unreadable.
  pub fn open(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    let current = match load_config(&path) {
      Ok(cfg) => cfg,
      Err(e) => {
        log::warn!("config: {e}; using defaults");
        AppConfig::default()
      }
    };
    Self {
      path,
      current: RwLock::new(current),
    }
  }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
  async fn get_config(&self) -> HubResult<AppConfig> {
    Ok(self.current.read().await.clone())
  }

  async fn save_config(&self, cfg: AppConfig) -> HubResult<()> {
    let mut guard = self.current.write().await;
    save_config(&self.path, &cfg)?;
    *guard = cfg;
    Ok(())
  }
}

pub fn load_config(path: &Path) -> Result<AppConfig, String> {
  if !path.exists() {
    return Ok(AppConfig::default());
  }
  let raw = fs::read_to_string(path).map_err(|e| format!("read config failed: {e}"))?;
  serde_json::from_str(&raw).map_err(|e| format!("parse config failed: {e}"))
}

pub fn save_config(path: &Path, cfg: &AppConfig) -> Result<(), String> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(|e| format!("create config dir failed: {e}"))?;
  }
  let raw = serde_json::to_string_pretty(cfg).map_err(|e| format!("serialize config failed: {e}"))?;
  fs::write(path, raw).map_err(|e| format!("write config failed: {e}"))
}
