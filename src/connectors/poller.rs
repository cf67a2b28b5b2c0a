use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time::Duration,
};

use futures::future::join_all;
use tokio::{
  sync::watch,
  task::JoinHandle,
  time::{interval, MissedTickBehavior},
};

use super::lifecycle::ConnectorController;
use crate::core::{
  config_store::{AppConfig, ConfigStore},
  error::HubError,
  now_unix_ms,
  secrets::{Credential, Credentials},
};

/// What a view wants kept fresh.
#[derive(Clone, Default)]
pub struct PollTargets {
  pub connectors: Vec<ConnectorController>,
  pub config: Option<Arc<dyn ConfigStore>>,
  pub credentials: Option<Credentials>,
}

/// Latest known config and credential state. Connector statuses land in
/// their controllers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSnapshot {
  pub config: Option<AppConfig>,
  pub credential: Option<Credential>,
  pub last_poll_unix_ms: Option<u128>,
}

struct Shared {
  targets: PollTargets,
  snapshot: watch::Sender<PollSnapshot>,
  in_flight: AtomicBool,
}

/// Interval refresh scoped to the view that started it. Dropping the poller
/// stops it.
pub struct StatusPoller {
  shared: Arc<Shared>,
  stop_tx: watch::Sender<bool>,
  task: JoinHandle<()>,
}

impl StatusPoller {
  /// Fetches immediately, then every `every`. Must run inside a tokio runtime.
  pub fn start(targets: PollTargets, every: Duration) -> Self {
    let (snapshot, _) = watch::channel(PollSnapshot::default());
    let shared = Arc::new(Shared {
      targets,
      snapshot,
      in_flight: AtomicBool::new(false),
    });
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run(shared.clone(), stop_rx, every));
    Self { shared, stop_tx, task }
  }

  pub fn snapshot(&self) -> PollSnapshot {
    self.shared.snapshot.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
    self.shared.snapshot.subscribe()
  }

  /// Out-of-band refresh. Returns false if a poll was already running.
  pub async fn refresh_now(&self) -> bool {
    poll_once(&self.shared).await
  }

  pub fn stop(self) {}
}

impl Drop for StatusPoller {
  fn drop(&mut self) {
    let _ = self.stop_tx.send(true);
    self.task.abort();
  }
}

async fn run(shared: Arc<Shared>, mut stop_rx: watch::Receiver<bool>, every: Duration) {
  let mut ticker = interval(every);
  // A tick that comes due while the previous poll is still out is dropped.
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
  loop {
    tokio::select! {
      _ = stop_rx.changed() => break,
      _ = ticker.tick() => {}
    }
    tokio::select! {
      _ = stop_rx.changed() => break,
      _ = poll_once(&shared) => {}
    }
  }
  log::debug!("status poller stopped");
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

async fn poll_once(shared: &Shared) -> bool {
  if shared.in_flight.swap(true, Ordering::AcqRel) {
    return false;
  }
  let _in_flight = InFlight(&shared.in_flight);
  let targets = &shared.targets;

  let statuses = join_all(targets.connectors.iter().map(|c| async move { (c.id(), c.refresh_status().await) }));
  let config = async {
    match &targets.config {
      Some(store) => Some(store.get_config().await),
      None => None,
    }
  };
  let credential = async {
    match &targets.credentials {
      Some(creds) => Some(creds.status().await),
      None => None,
    }
  };
  let (statuses, config, credential) = tokio::join!(statuses, config, credential);

  for (id, res) in statuses {
    if let Err(e) = res {
      note_failure(id.as_str(), &e);
    }
  }
  let config = config.and_then(|res| res.map_err(|e| note_failure("config", &e)).ok());
  let credential = credential.and_then(|res| res.map_err(|e| note_failure("credential", &e)).ok());

  shared.snapshot.send_if_modified(|snap| {
    let mut changed = false;
    if let Some(cfg) = config {
      changed |= snap.config.as_ref() != Some(&cfg);
      snap.config = Some(cfg);
    }
    if let Some(cred) = credential {
      changed |= snap.credential.as_ref() != Some(&cred);
      snap.credential = Some(cred);
    }
    snap.last_poll_unix_ms = Some(now_unix_ms());
    changed
  });
  true
}

// Last-known state is kept; the next tick retries.
fn note_failure(what: &str, e: &HubError) {
  if e.is_transport() {
    log::debug!("poll {what}: backend unavailable");
  } else {
    log::warn!("poll {what} failed: {e}");
  }
}
