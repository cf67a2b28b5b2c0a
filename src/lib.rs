pub mod backend;
pub mod connectors;
pub mod core;
pub mod settings;
pub mod threads;

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;

pub use crate::{
  backend::{ConnectorBackend, ThreadBackend},
  connectors::{
    lifecycle::{ConnectorController, ConnectorView},
    poller::{PollSnapshot, PollTargets, StatusPoller},
    types::{AuthMode, ConnectorId, ConnectorPhase, ConnectorStatus, Doctor, SelfTestResult},
  },
  core::{
    config_store::{AppConfig, ConfigStore, FileConfigStore, TokenStorageMode},
    error::{HubError, HubResult},
    logbus::{LogBus, LogEntry, LogLevel},
    paths::AppPaths,
    secrets::{Credential, CredentialOutcome, CredentialStore, Credentials, LocalCredentialStore},
  },
  settings::Settings,
  threads::{
    catalog::{CatalogView, ThreadCatalog},
    events::ThreadEventBus,
    reconciler::{ThreadReader, ThreadView},
    types::{ThreadDetail, ThreadPage, ThreadSummary},
  },
};

/// Runtime tuning.
#[derive(Debug, Clone)]
pub struct HubOptions {
  pub status_poll_interval: Duration,
  pub thread_poll_interval: Duration,
  pub thread_page_size: usize,
  pub thread_max_items: usize,
  pub log_capacity: usize,
}

impl Default for HubOptions {
  fn default() -> Self {
    Self {
      status_poll_interval: Duration::from_secs(1),
      thread_poll_interval: Duration::from_millis(1500),
      thread_page_size: 40,
      thread_max_items: 200,
      log_capacity: 1200,
    }
  }
}

/// Everything the dashboard talks to.
#[derive(Clone)]
pub struct Hub {
  telegram: ConnectorController,
  codex: ConnectorController,
  catalog: ThreadCatalog,
  reader: ThreadReader,
  events: ThreadEventBus,
  settings: Settings,
  credentials: Credentials,
  logs: LogBus,
  options: HubOptions,
}

impl Hub {
  pub fn new<B>(
    backend: Arc<B>,
    config: Arc<dyn ConfigStore>,
    secrets: Arc<dyn CredentialStore>,
    options: HubOptions,
  ) -> Self
  where
    B: ConnectorBackend + ThreadBackend + 'static,
  {
    let logs = LogBus::new(options.log_capacity);
    logs.info("app", "startup");

    let events = ThreadEventBus::default();
    Self {
      telegram: ConnectorController::new(ConnectorId::Telegram, backend.clone(), logs.clone()),
      codex: ConnectorController::new(ConnectorId::Codex, backend.clone(), logs.clone()),
      catalog: ThreadCatalog::new(backend.clone()),
      reader: ThreadReader::new(backend, events.clone(), options.thread_poll_interval),
      events,
      settings: Settings::new(config, logs.clone()),
      credentials: Credentials::new(secrets, logs.clone()),
      logs,
      options,
    }
  }

  /// Config file and bot token under `paths`.
  pub fn with_local_stores<B>(backend: Arc<B>, paths: AppPaths, options: HubOptions) -> Self
  where
    B: ConnectorBackend + ThreadBackend + 'static,
  {
    let config: Arc<dyn ConfigStore> = Arc::new(FileConfigStore::open(paths.config_path()));
    let secrets = Arc::new(LocalCredentialStore::new(config.clone(), paths));
    Self::new(backend, config, secrets, options)
  }

  /// Local stores under the platform data dir.
  pub fn with_default_stores<B>(backend: Arc<B>, options: HubOptions) -> HubResult<Self>
  where
    B: ConnectorBackend + ThreadBackend + 'static,
  {
    let paths = AppPaths::platform_default()?;
    Ok(Self::with_local_stores(backend, paths, options))
  }

  pub fn connector(&self, id: ConnectorId) -> &ConnectorController {
    match id {
      ConnectorId::Telegram => &self.telegram,
      ConnectorId::Codex => &self.codex,
    }
  }

  pub fn catalog(&self) -> &ThreadCatalog {
    &self.catalog
  }

  pub fn reader(&self) -> &ThreadReader {
    &self.reader
  }

  pub fn events(&self) -> &ThreadEventBus {
    &self.events
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  pub fn credentials(&self) -> &Credentials {
    &self.credentials
  }

  pub fn options(&self) -> &HubOptions {
    &self.options
  }

  /// Everything a dashboard shows: both connectors, config and token.
  pub fn poll_targets(&self) -> PollTargets {
    PollTargets {
      connectors: ConnectorId::ALL.iter().map(|id| self.connector(*id).clone()).collect(),
      config: Some(self.settings.store()),
      credentials: Some(self.credentials.clone()),
    }
  }

  /// Starts a poller for `targets`; it lives as long as the returned handle.
  pub fn start_status_poller(&self, targets: PollTargets) -> StatusPoller {
    StatusPoller::start(targets, self.options.status_poll_interval)
  }

  /// Connects the AI session in the background so the first request does
  /// not pay for the process start. Failures are logged only.
  pub fn warm_up(&self) -> JoinHandle<()> {
    let codex = self.codex.clone();
    let logs = self.logs.clone();
    tokio::spawn(async move {
      logs.info(ConnectorId::Codex.as_str(), "startup warmup connect");
      if let Err(e) = codex.connect().await {
        logs.error(ConnectorId::Codex.as_str(), format!("startup warmup failed: {e}"));
      }
    })
  }

  pub async fn refresh_threads(&self) -> HubResult<Option<ThreadPage>> {
    self.catalog.fetch_first_page(self.options.thread_page_size).await
  }

  pub async fn load_more_threads(&self) -> HubResult<Option<ThreadPage>> {
    self.catalog.load_more(self.options.thread_page_size).await
  }

  pub async fn open_thread(&self, id: &str) -> HubResult<ThreadDetail> {
    self.reader.open_thread(id, self.options.thread_max_items).await
  }

  pub fn close_thread(&self) {
    self.reader.close();
  }

  /// Local push hint, e.g. after this process sent a message into `thread_id`.
  pub fn notify_thread_changed(&self, thread_id: &str) {
    self.events.publish(thread_id);
  }

  pub fn logs(&self, limit: usize) -> Vec<LogEntry> {
    self.logs.list(limit)
  }

  pub fn clear_logs(&self) {
    self.logs.clear();
  }
}
