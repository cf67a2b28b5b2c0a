use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "local-ai-hub";

/// Locations of the files the hub owns inside the app data dir.
#[derive(Debug, Clone)]
pub struct AppPaths {
  data_dir: PathBuf,
}

impl AppPaths {
  pub fn new(data_dir: impl Into<PathBuf>) -> Self {
    Self {
      data_dir: data_dir.into(),
    }
  }

  pub fn platform_default() -> Result<Self, String> {
    dirs::data_dir()
      .map(|d| Self::new(d.join(APP_DIR_NAME)))
      .ok_or_else(|| "app_data_dir error: no platform data directory".to_string())
  }

  pub fn data_dir(&self) -> &Path {
    &self.data_dir
  }

  pub fn config_path(&self) -> PathBuf {
    self.data_dir.join("config.json")
  }

  pub fn telegram_token_fallback_path(&self) -> PathBuf {
    self.data_dir.join("telegram-token.txt")
  }
}
