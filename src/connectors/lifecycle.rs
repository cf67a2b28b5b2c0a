use std::sync::Arc;

use tokio::sync::{watch, Mutex, MutexGuard};

use super::types::{AuthMode, ConnectorId, ConnectorPhase, ConnectorStatus, Doctor, SelfTestResult};
use crate::{
  backend::ConnectorBackend,
  core::{
    error::{HubError, HubResult},
    logbus::LogBus,
  },
};

/// Hub-side picture of one connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorView {
  pub phase: ConnectorPhase,
  pub status: ConnectorStatus,
  pub doctor: Option<Doctor>,
  // Failure of the last user action. Survives polls until an action succeeds.
  action_error: Option<String>,
}

impl ConnectorView {
  fn new(id: ConnectorId) -> Self {
    Self {
      phase: ConnectorPhase::Uninitialized,
      status: ConnectorStatus::for_connector(id),
      doctor: None,
      action_error: None,
    }
  }
}

/// Lifecycle state machine for one connector.
///
/// Lifecycle operations are serialized; a status observation that arrives
/// while one is running is dropped, the operation's own result wins.
#[derive(Clone)]
pub struct ConnectorController {
  inner: Arc<Inner>,
}

struct Inner {
  id: ConnectorId,
  backend: Arc<dyn ConnectorBackend>,
  logs: LogBus,
  view: watch::Sender<ConnectorView>,
  lifecycle_lock: Mutex<()>,
}

impl ConnectorController {
  pub fn new(id: ConnectorId, backend: Arc<dyn ConnectorBackend>, logs: LogBus) -> Self {
    let (view, _) = watch::channel(ConnectorView::new(id));
    Self {
      inner: Arc::new(Inner {
        id,
        backend,
        logs,
        view,
        lifecycle_lock: Mutex::new(()),
      }),
    }
  }

  pub fn id(&self) -> ConnectorId {
    self.inner.id
  }

  pub fn view(&self) -> ConnectorView {
    self.inner.view.borrow().clone()
  }

  pub fn phase(&self) -> ConnectorPhase {
    self.inner.view.borrow().phase
  }

  pub fn status(&self) -> ConnectorStatus {
    self.inner.view.borrow().status.clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<ConnectorView> {
    self.inner.view.subscribe()
  }

  /// Fetches the backend status and applies it like a poll would.
  pub async fn refresh_status(&self) -> HubResult<ConnectorStatus> {
    let st = self.inner.backend.connector_status(self.inner.id).await?;
    self.observe(st);
    Ok(self.status())
  }

  /// Probes prerequisites. Leaves the connector state untouched.
  pub async fn check_availability(&self) -> HubResult<Doctor> {
    self.inner.backend.connector_doctor(self.inner.id).await
  }

  /// Runs the availability check and records its verdict.
  pub async fn inspect(&self) -> HubResult<Doctor> {
    let _guard = self.lock().await;
    let previous = self.phase();
    self.set_phase(ConnectorPhase::Checking);
    match self.check_availability().await {
      Ok(doc) => {
        let phase = phase_after_check(&doc, previous);
        self.inner.view.send_modify(|v| {
          v.doctor = Some(doc.clone());
          v.phase = phase;
        });
        Ok(doc)
      }
      Err(e) => {
        self.set_phase(previous);
        self.record_failure("doctor", &e);
        Err(e)
      }
    }
  }

  /// Installs the local tool. Already installed means a plain re-check.
  pub async fn install(&self) -> HubResult<Doctor> {
    let _guard = self.lock().await;
    let id = self.inner.id;

    let doc = match self.check_availability().await {
      Ok(doc) => doc,
      Err(e) => {
        self.record_failure("doctor", &e);
        return Err(e);
      }
    };
    if !id.has_local_install() || doc.local_binary_ok {
      let phase = phase_after_check(&doc, self.phase());
      self.inner.view.send_modify(|v| {
        v.doctor = Some(doc.clone());
        v.phase = phase;
      });
      return Ok(doc);
    }
    if let Some(msg) = doc.missing_install_prerequisite() {
      self.inner.view.send_modify(|v| {
        v.doctor = Some(doc.clone());
        v.phase = ConnectorPhase::NotInstalled;
      });
      let err = HubError::PrerequisiteMissing(msg.to_string());
      self.record_failure("install", &err);
      return Err(err);
    }

    self.set_phase(ConnectorPhase::Installing);
    self.inner.logs.info(id.as_str(), "installing...");
    match self.inner.backend.connector_install(id).await {
      Ok(doc) if doc.local_binary_ok => {
        self.inner.view.send_modify(|v| {
          v.doctor = Some(doc.clone());
          v.phase = ConnectorPhase::Uninitialized;
        });
        self.clear_failure();
        self.inner.logs.info(id.as_str(), "installed");
        Ok(doc)
      }
      Ok(doc) => {
        self.inner.view.send_modify(|v| {
          v.doctor = Some(doc);
          v.phase = ConnectorPhase::InstallFailed;
        });
        let err = HubError::Backend("Installed, but the entry point was not found. Try again or reinstall.".to_string());
        self.record_failure("install", &err);
        Err(err)
      }
      Err(e) => {
        self.set_phase(ConnectorPhase::InstallFailed);
        self.record_failure("install", &e);
        Err(e)
      }
    }
  }

  /// Connects unless already `Ready`, in which case nothing is restarted.
  pub async fn connect(&self) -> HubResult<ConnectorStatus> {
    let _guard = self.lock().await;
    self.connect_locked().await
  }

  /// Stops and connects again. The only way to recover a wedged process.
  pub async fn reconnect(&self) -> HubResult<ConnectorStatus> {
    let _guard = self.lock().await;
    if let Err(e) = self.stop_locked().await {
      self
        .inner
        .logs
        .warn(self.inner.id.as_str(), format!("reconnect: stop failed, connecting anyway: {e}"));
    }
    self.start_locked().await
  }

  pub async fn stop(&self) -> HubResult<()> {
    let _guard = self.lock().await;
    self.stop_locked().await
  }

  /// Starts an interactive login. Returns as soon as the backend hands out a
  /// login URL; completion shows up later through status polling.
  pub async fn login(&self, mode: AuthMode) -> HubResult<ConnectorStatus> {
    let _guard = self.lock().await;
    let id = self.inner.id;
    if !matches!(
      self.phase(),
      ConnectorPhase::Ready | ConnectorPhase::NotReady | ConnectorPhase::LoggingIn
    ) {
      self.connect_locked().await?;
    }

    let previous = self.phase();
    self.set_phase(ConnectorPhase::LoggingIn);
    self.inner.logs.info(id.as_str(), format!("login: start ({mode:?})"));
    match self.inner.backend.connector_login(id, mode).await {
      Ok(st) => {
        self.clear_failure();
        Ok(self.apply_status(st))
      }
      Err(e) => {
        self.set_phase(previous);
        self.record_failure("login", &e);
        Err(e)
      }
    }
  }

  pub async fn logout(&self) -> HubResult<()> {
    let _guard = self.lock().await;
    let id = self.inner.id;
    match self.inner.backend.connector_logout(id).await {
      Ok(()) => {
        self.inner.view.send_modify(|v| {
          v.status.auth_mode = None;
          v.status.login_url = None;
          v.status.login_id = None;
          if v.status.running && id.requires_auth() {
            v.phase = ConnectorPhase::NotReady;
          }
        });
        self.clear_failure();
        self.inner.logs.info(id.as_str(), "logged out");
        Ok(())
      }
      Err(e) => {
        self.record_failure("logout", &e);
        Err(e)
      }
    }
  }

  /// Never fails: transport errors come back as a failed result.
  pub async fn self_test(&self) -> SelfTestResult {
    let id = self.inner.id;
    let res = match self.inner.backend.connector_self_test(id).await {
      Ok(res) => res,
      Err(e) => SelfTestResult {
        ok: false,
        error: Some(e.to_string()),
        ..SelfTestResult::default()
      },
    };
    if res.ok {
      self.clear_failure();
      self.inner.logs.info(
        id.as_str(),
        format!("self-test ok identity={} probe_sent={}", res.identity.as_deref().unwrap_or("?"), res.sent_probe),
      );
    } else {
      let err = HubError::Backend(res.error.clone().unwrap_or_else(|| "self-test failed".to_string()));
      self.record_failure("self-test", &err);
    }
    res
  }

  /// Applies a polled status. Returns false when a lifecycle operation is in
  /// flight and the observation was dropped.
  pub fn observe(&self, st: ConnectorStatus) -> bool {
    let Ok(_guard) = self.inner.lifecycle_lock.try_lock() else {
      return false;
    };
    self.apply_status(st);
    true
  }

  async fn connect_locked(&self) -> HubResult<ConnectorStatus> {
    if self.phase() == ConnectorPhase::Ready {
      return Ok(self.status());
    }
    self.start_locked().await
  }

  async fn start_locked(&self) -> HubResult<ConnectorStatus> {
    let id = self.inner.id;
    if id.has_local_install() {
      let doc = match self.check_availability().await {
        Ok(doc) => doc,
        Err(e) => {
          self.record_failure("doctor", &e);
          return Err(e);
        }
      };
      if let Some(msg) = doc.missing_connect_prerequisite() {
        let phase = phase_after_check(&doc, self.phase());
        self.inner.view.send_modify(|v| {
          v.doctor = Some(doc.clone());
          v.phase = phase;
        });
        let err = HubError::PrerequisiteMissing(msg.to_string());
        self.record_failure("connect", &err);
        return Err(err);
      }
      self.inner.view.send_modify(|v| v.doctor = Some(doc));
    }

    self.set_phase(ConnectorPhase::Connecting);
    self.inner.logs.info(id.as_str(), "connect: start");
    match self.inner.backend.connector_connect(id).await {
      Ok(st) => {
        self.clear_failure();
        let st = self.apply_status(st);
        self.inner.logs.info(id.as_str(), format!("connect: {:?}", self.phase()));
        Ok(st)
      }
      Err(e) => {
        self.set_phase(ConnectorPhase::Error);
        self.record_failure("connect", &e);
        Err(e)
      }
    }
  }

  async fn stop_locked(&self) -> HubResult<()> {
    let id = self.inner.id;
    self.inner.logs.warn(id.as_str(), "stop requested");
    match self.inner.backend.connector_stop(id).await {
      Ok(()) => {
        self.inner.view.send_modify(|v| {
          v.status.running = false;
          v.status.initialized = false;
          v.status.login_url = None;
          v.status.login_id = None;
          v.phase = ConnectorPhase::Uninitialized;
        });
        self.clear_failure();
        self.inner.logs.info(id.as_str(), "stopped");
        Ok(())
      }
      Err(e) => {
        self.record_failure("stop", &e);
        Err(e)
      }
    }
  }

  fn apply_status(&self, st: ConnectorStatus) -> ConnectorStatus {
    let id = self.inner.id;
    let mut st = st.normalized();
    st.id = Some(id);
    self.inner.view.send_if_modified(|v| {
      if st.last_error.is_none() {
        st.last_error = v.action_error.clone();
      }
      let phase = phase_for_status(id, &st, v.phase);
      let changed = v.status != st || v.phase != phase;
      v.status = st.clone();
      v.phase = phase;
      changed
    });
    st
  }

  fn set_phase(&self, phase: ConnectorPhase) {
    self.inner.view.send_if_modified(|v| {
      let changed = v.phase != phase;
      v.phase = phase;
      changed
    });
  }

  fn record_failure(&self, action: &str, err: &HubError) {
    let msg = err.to_string();
    self.inner.logs.error(self.inner.id.as_str(), format!("{action} failed: {msg}"));
    self.inner.view.send_modify(|v| {
      v.action_error = Some(msg.clone());
      v.status.last_error = Some(msg);
    });
  }

  fn clear_failure(&self) {
    self.inner.view.send_if_modified(|v| {
      let Some(prev) = v.action_error.take() else {
        return false;
      };
      if v.status.last_error.as_deref() == Some(prev.as_str()) {
        v.status.last_error = None;
      }
      true
    });
  }

  async fn lock(&self) -> MutexGuard<'_, ()> {
    self.inner.lifecycle_lock.lock().await
  }
}

fn phase_after_check(doc: &Doctor, current: ConnectorPhase) -> ConnectorPhase {
  if doc.local_binary_ok {
    return match current {
      ConnectorPhase::Checking
      | ConnectorPhase::NotInstalled
      | ConnectorPhase::Installable
      | ConnectorPhase::InstallFailed
      | ConnectorPhase::Installing => ConnectorPhase::Uninitialized,
      other => other,
    };
  }
  if doc.missing_install_prerequisite().is_some() {
    ConnectorPhase::NotInstalled
  } else {
    ConnectorPhase::Installable
  }
}

fn phase_for_status(id: ConnectorId, st: &ConnectorStatus, current: ConnectorPhase) -> ConnectorPhase {
  if !st.running {
    return match current {
      ConnectorPhase::Ready
      | ConnectorPhase::NotReady
      | ConnectorPhase::LoggingIn
      | ConnectorPhase::Connecting
      | ConnectorPhase::Error => {
        if st.last_error.is_some() {
          ConnectorPhase::Error
        } else {
          ConnectorPhase::Uninitialized
        }
      }
      other => other,
    };
  }
  if id.requires_auth() && st.auth_mode.is_none() {
    if st.login_pending() {
      ConnectorPhase::LoggingIn
    } else {
      ConnectorPhase::NotReady
    }
  } else {
    ConnectorPhase::Ready
  }
}
