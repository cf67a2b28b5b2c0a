#![allow(dead_code)]

use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
  },
  time::Duration,
};

use async_trait::async_trait;
use connector_hub::{
  AppConfig, AuthMode, ConfigStore, ConnectorBackend, ConnectorId, ConnectorStatus, Credential, CredentialStore,
  Doctor, Hub, HubError, HubOptions, HubResult, SelfTestResult, ThreadBackend, ThreadDetail, ThreadPage, ThreadSummary,
  TokenStorageMode,
};
use connector_hub::threads::types::{ThreadItem, ThreadRole};

/// Scripted stand-in for the connector runtimes. Every command is recorded
/// as `"<command>:<arg>"` in call order.
pub struct FakeBackend {
  state: Mutex<FakeState>,
  calls: Mutex<Vec<String>>,
  reads_out: AtomicUsize,
  max_reads_out: AtomicUsize,
}

struct FakeState {
  doctor: Doctor,
  running: HashMap<ConnectorId, bool>,
  auth_mode: Option<AuthMode>,
  login_url: Option<String>,
  connect_error: Option<HubError>,
  stop_error: Option<HubError>,
  self_test: HubResult<SelfTestResult>,
  pages: HashMap<Option<String>, ThreadPage>,
  threads: HashMap<String, ThreadDetail>,
  read_error: Option<HubError>,
  read_delay: Duration,
}

impl FakeBackend {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      state: Mutex::new(FakeState {
        doctor: installed(),
        running: HashMap::new(),
        auth_mode: None,
        login_url: None,
        connect_error: None,
        stop_error: None,
        self_test: Ok(SelfTestResult {
          ok: true,
          identity: Some("@hub_bot".to_string()),
          sent_probe: false,
          error: None,
        }),
        pages: HashMap::new(),
        threads: HashMap::new(),
        read_error: None,
        read_delay: Duration::ZERO,
      }),
      calls: Mutex::new(Vec::new()),
      reads_out: AtomicUsize::new(0),
      max_reads_out: AtomicUsize::new(0),
    })
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn count(&self, call: &str) -> usize {
    self.calls.lock().unwrap().iter().filter(|c| c.as_str() == call).count()
  }

  pub fn set_doctor(&self, doctor: Doctor) {
    self.state.lock().unwrap().doctor = doctor;
  }

  pub fn set_auth(&self, mode: Option<AuthMode>) {
    let mut st = self.state.lock().unwrap();
    st.auth_mode = mode;
    if mode.is_some() {
      st.login_url = None;
    }
  }

  pub fn fail_connect(&self, err: Option<HubError>) {
    self.state.lock().unwrap().connect_error = err;
  }

  pub fn fail_stop(&self, err: Option<HubError>) {
    self.state.lock().unwrap().stop_error = err;
  }

  pub fn set_self_test(&self, res: HubResult<SelfTestResult>) {
    self.state.lock().unwrap().self_test = res;
  }

  pub fn set_page(&self, cursor: Option<&str>, page: ThreadPage) {
    self.state.lock().unwrap().pages.insert(cursor.map(str::to_string), page);
  }

  pub fn set_thread(&self, detail: ThreadDetail) {
    self.state.lock().unwrap().threads.insert(detail.id.clone(), detail);
  }

  pub fn fail_reads(&self, err: Option<HubError>) {
    self.state.lock().unwrap().read_error = err;
  }

  /// Reads answer with the thread as it was when the read started, `delay`
  /// later.
  pub fn set_read_delay(&self, delay: Duration) {
    self.state.lock().unwrap().read_delay = delay;
  }

  /// Most `thread_read` calls ever outstanding at once.
  pub fn max_reads_out(&self) -> usize {
    self.max_reads_out.load(Ordering::SeqCst)
  }

  fn record(&self, call: impl Into<String>) {
    self.calls.lock().unwrap().push(call.into());
  }

  fn status_of(&self, id: ConnectorId) -> ConnectorStatus {
    let st = self.state.lock().unwrap();
    let running = st.running.get(&id).copied().unwrap_or(false);
    ConnectorStatus {
      id: Some(id),
      running,
      initialized: running,
      last_error: None,
      auth_mode: if id.requires_auth() { st.auth_mode } else { None },
      login_url: st.login_url.clone(),
      login_id: st.login_url.as_ref().map(|_| "login-1".to_string()),
    }
  }
}

#[async_trait]
impl ConnectorBackend for FakeBackend {
  async fn connector_status(&self, id: ConnectorId) -> HubResult<ConnectorStatus> {
    self.record(format!("status:{id}"));
    Ok(self.status_of(id))
  }

  async fn connector_connect(&self, id: ConnectorId) -> HubResult<ConnectorStatus> {
    self.record(format!("connect:{id}"));
    {
      let mut st = self.state.lock().unwrap();
      if let Some(e) = st.connect_error.clone() {
        return Err(e);
      }
      st.running.insert(id, true);
    }
    Ok(self.status_of(id))
  }

  async fn connector_stop(&self, id: ConnectorId) -> HubResult<()> {
    self.record(format!("stop:{id}"));
    let mut st = self.state.lock().unwrap();
    if let Some(e) = st.stop_error.clone() {
      return Err(e);
    }
    st.running.insert(id, false);
    Ok(())
  }

  async fn connector_login(&self, id: ConnectorId, mode: AuthMode) -> HubResult<ConnectorStatus> {
    self.record(format!("login:{id}"));
    if mode == AuthMode::Apikey {
      return Err(HubError::Backend("API key login is not supported here".to_string()));
    }
    self.state.lock().unwrap().login_url = Some("https://auth.example/login".to_string());
    Ok(self.status_of(id))
  }

  async fn connector_logout(&self, id: ConnectorId) -> HubResult<()> {
    self.record(format!("logout:{id}"));
    let mut st = self.state.lock().unwrap();
    st.auth_mode = None;
    st.login_url = None;
    Ok(())
  }

  async fn connector_doctor(&self, id: ConnectorId) -> HubResult<Doctor> {
    self.record(format!("doctor:{id}"));
    Ok(self.state.lock().unwrap().doctor.clone())
  }

  async fn connector_install(&self, id: ConnectorId) -> HubResult<Doctor> {
    self.record(format!("install:{id}"));
    let mut st = self.state.lock().unwrap();
    st.doctor.local_binary_ok = true;
    st.doctor.local_binary_version = Some("0.98.0".to_string());
    Ok(st.doctor.clone())
  }

  async fn connector_self_test(&self, id: ConnectorId) -> HubResult<SelfTestResult> {
    self.record(format!("self_test:{id}"));
    self.state.lock().unwrap().self_test.clone()
  }
}

#[async_trait]
impl ThreadBackend for FakeBackend {
  async fn thread_list(&self, _limit: usize, cursor: Option<String>) -> HubResult<ThreadPage> {
    self.record(format!("thread_list:{}", cursor.as_deref().unwrap_or("")));
    Ok(self.state.lock().unwrap().pages.get(&cursor).cloned().unwrap_or_default())
  }

  async fn thread_read(&self, id: &str, _max_items: usize) -> HubResult<ThreadDetail> {
    self.record(format!("thread_read:{id}"));
    let out = self.reads_out.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_reads_out.fetch_max(out, Ordering::SeqCst);
    let (res, delay) = {
      let st = self.state.lock().unwrap();
      let res = match st.read_error.clone() {
        Some(e) => Err(e),
        None => st
          .threads
          .get(id)
          .cloned()
          .ok_or_else(|| HubError::Backend(format!("thread not found: {id}"))),
      };
      (res, st.read_delay)
    };
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }
    self.reads_out.fetch_sub(1, Ordering::SeqCst);
    res
  }
}

/// In-memory config document.
#[derive(Default)]
pub struct MemoryConfig {
  cfg: Mutex<AppConfig>,
}

#[async_trait]
impl ConfigStore for MemoryConfig {
  async fn get_config(&self) -> HubResult<AppConfig> {
    Ok(self.cfg.lock().unwrap().clone())
  }

  async fn save_config(&self, cfg: AppConfig) -> HubResult<()> {
    *self.cfg.lock().unwrap() = cfg;
    Ok(())
  }
}

/// Secret store whose `set` answers with a fixed credential.
pub struct ScriptedSecrets {
  pub on_set: Credential,
}

impl ScriptedSecrets {
  pub fn storing() -> Self {
    Self {
      on_set: Credential {
        stored: true,
        mode: TokenStorageMode::File,
        error: None,
      },
    }
  }

  pub fn not_persisting(mode: TokenStorageMode) -> Self {
    Self {
      on_set: Credential {
        stored: false,
        mode,
        error: None,
      },
    }
  }
}

#[async_trait]
impl CredentialStore for ScriptedSecrets {
  async fn status(&self) -> HubResult<Credential> {
    Ok(self.on_set.clone())
  }

  async fn set(&self, _secret: &str) -> HubResult<Credential> {
    Ok(self.on_set.clone())
  }

  async fn delete(&self) -> HubResult<()> {
    Ok(())
  }
}

pub fn hub(backend: &Arc<FakeBackend>) -> Hub {
  hub_with_secrets(backend, ScriptedSecrets::storing())
}

pub fn hub_with_secrets(backend: &Arc<FakeBackend>, secrets: ScriptedSecrets) -> Hub {
  Hub::new(
    backend.clone(),
    Arc::new(MemoryConfig::default()),
    Arc::new(secrets),
    HubOptions::default(),
  )
}

pub fn installed() -> Doctor {
  Doctor {
    runtime_ok: true,
    runtime_path: Some("/usr/bin/node".to_string()),
    package_manager_ok: true,
    package_manager_path: Some("/usr/bin/npm".to_string()),
    local_binary_ok: true,
    local_binary_version: Some("0.98.0".to_string()),
  }
}

pub fn summaries(range: std::ops::Range<usize>) -> Vec<ThreadSummary> {
  range
    .map(|i| ThreadSummary {
      id: format!("t{i}"),
      title: Some(format!("Conversation {i}")),
      updated_at: Some(1000 + i as i64),
      ..ThreadSummary::default()
    })
    .collect()
}

pub fn thread(id: &str, updated_at: i64, texts: &[&str]) -> ThreadDetail {
  ThreadDetail {
    id: id.to_string(),
    updated_at: Some(updated_at),
    in_progress: Some(false),
    items: texts
      .iter()
      .enumerate()
      .map(|(i, t)| ThreadItem {
        role: if i % 2 == 0 { ThreadRole::User } else { ThreadRole::Assistant },
        text: t.to_string(),
      })
      .collect(),
    ..ThreadDetail::default()
  }
}
