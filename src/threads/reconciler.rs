use std::{
  sync::{Arc, Mutex, MutexGuard},
  time::Duration,
};

use tokio::{
  sync::{mpsc, watch},
  task::JoinHandle,
  time::{interval_at, Instant, MissedTickBehavior},
};

use super::{
  events::{ThreadChangeListener, ThreadEventBus},
  types::ThreadDetail,
};
use crate::{
  backend::ThreadBackend,
  core::error::{HubError, HubResult},
};

/// What the open-conversation pane shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadView {
  pub thread_id: Option<String>,
  pub detail: Option<ThreadDetail>,
  pub error: Option<String>,
  /// Bumped every time `detail` is replaced.
  pub revision: u64,
}

/// Keeps one open conversation live.
///
/// Push hints and poll ticks both end in a re-read that goes through
/// [`reconcile`], the only writer of the view once a thread is open.
#[derive(Clone)]
pub struct ThreadReader {
  inner: Arc<Inner>,
}

struct Inner {
  backend: Arc<dyn ThreadBackend>,
  events: ThreadEventBus,
  poll_every: Duration,
  view: Arc<watch::Sender<ThreadView>>,
  slot: Mutex<Slot>,
}

// Every open and close bumps `epoch`; an open whose first read comes back
// under a newer epoch leaves the view and session alone.
#[derive(Default)]
struct Slot {
  epoch: u64,
  session: Option<ThreadSession>,
}

impl ThreadReader {
  pub fn new(backend: Arc<dyn ThreadBackend>, events: ThreadEventBus, poll_every: Duration) -> Self {
    let (view, _) = watch::channel(ThreadView::default());
    Self {
      inner: Arc::new(Inner {
        backend,
        events,
        poll_every,
        view: Arc::new(view),
        slot: Mutex::new(Slot::default()),
      }),
    }
  }

  pub fn view(&self) -> ThreadView {
    self.inner.view.borrow().clone()
  }

  pub fn current(&self) -> Option<ThreadDetail> {
    self.inner.view.borrow().detail.clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<ThreadView> {
    self.inner.view.subscribe()
  }

  /// Opens `id`, replacing whatever was shown. The previous thread's push
  /// subscription and poll loop are gone before the first read goes out.
  ///
  /// Only the latest open applies its read. On failure nothing stays open.
  pub async fn open_thread(&self, id: &str, max_items: usize) -> HubResult<ThreadDetail> {
    let id = id.trim();
    if id.is_empty() {
      return Err(HubError::Backend("Thread id is required.".to_string()));
    }
    let epoch = {
      let mut slot = self.slot();
      slot.epoch += 1;
      drop(slot.session.take());
      self.inner.view.send_modify(|v| {
        v.thread_id = Some(id.to_string());
        v.detail = None;
        v.error = None;
      });
      slot.epoch
    };
    // Hints published while the first read is out are kept for the session.
    let listener = self.inner.events.listen(id);

    let res = self.inner.backend.thread_read(id, max_items).await;

    let mut slot = self.slot();
    if slot.epoch != epoch {
      log::debug!("thread {id}: superseded open dropped");
      return res;
    }
    match res {
      Ok(detail) => {
        self.inner.view.send_modify(|v| {
          v.detail = Some(detail.clone());
          v.revision += 1;
        });
        slot.session = Some(ThreadSession::spawn(
          self.inner.backend.clone(),
          self.inner.view.clone(),
          listener,
          id.to_string(),
          max_items,
          self.inner.poll_every,
        ));
        Ok(detail)
      }
      Err(e) => {
        self.inner.view.send_modify(|v| {
          v.thread_id = None;
          v.detail = None;
          v.error = Some(e.to_string());
        });
        Err(e)
      }
    }
  }

  /// Asks the open session for an immediate re-read. False when no thread is
  /// open or a refresh is already queued.
  pub fn refresh(&self) -> bool {
    self
      .slot()
      .session
      .as_ref()
      .map(|s| s.refresh_tx.try_send(()).is_ok())
      .unwrap_or(false)
  }

  pub fn close(&self) {
    let mut slot = self.slot();
    slot.epoch += 1;
    drop(slot.session.take());
    self.inner.view.send_if_modified(|v| {
      let changed = v.thread_id.is_some() || v.detail.is_some() || v.error.is_some();
      v.thread_id = None;
      v.detail = None;
      v.error = None;
      changed
    });
  }

  pub fn is_open(&self) -> bool {
    self.slot().session.is_some()
  }

  fn slot(&self) -> MutexGuard<'_, Slot> {
    self.inner.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

/// Push subscription plus poll loop for one open thread. Dropping it tears
/// both down.
struct ThreadSession {
  stop_tx: watch::Sender<bool>,
  refresh_tx: mpsc::Sender<()>,
  task: JoinHandle<()>,
}

impl ThreadSession {
  fn spawn(
    backend: Arc<dyn ThreadBackend>,
    view: Arc<watch::Sender<ThreadView>>,
    listener: ThreadChangeListener,
    thread_id: String,
    max_items: usize,
    every: Duration,
  ) -> Self {
    let (stop_tx, stop_rx) = watch::channel(false);
    let (refresh_tx, refresh_rx) = mpsc::channel(1);
    let task = tokio::spawn(run_session(
      backend, view, listener, thread_id, max_items, every, stop_rx, refresh_rx,
    ));
    Self {
      stop_tx,
      refresh_tx,
      task,
    }
  }
}

impl Drop for ThreadSession {
  fn drop(&mut self) {
    let _ = self.stop_tx.send(true);
    self.task.abort();
  }
}

#[allow(clippy::too_many_arguments)]
async fn run_session(
  backend: Arc<dyn ThreadBackend>,
  view: Arc<watch::Sender<ThreadView>>,
  mut listener: ThreadChangeListener,
  thread_id: String,
  max_items: usize,
  every: Duration,
  mut stop_rx: watch::Receiver<bool>,
  mut refresh_rx: mpsc::Receiver<()>,
) {
  // The open itself was the first read.
  let mut ticker = interval_at(Instant::now() + every, every);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    let trigger = tokio::select! {
      _ = stop_rx.changed() => break,
      _ = ticker.tick() => "poll",
      _ = listener.changed() => "push",
      Some(()) = refresh_rx.recv() => "refresh",
    };
    // Reads are awaited inline, so there is never more than one out.
    let res = tokio::select! {
      _ = stop_rx.changed() => break,
      res = backend.thread_read(&thread_id, max_items) => res,
    };
    match res {
      Ok(fresh) => {
        if reconcile(&view, &thread_id, fresh) {
          log::debug!("thread {thread_id}: updated ({trigger})");
        }
      }
      Err(e) if e.is_transport() => log::debug!("thread {thread_id}: backend unavailable"),
      Err(e) => log::warn!("thread {thread_id}: read failed: {e}"),
    }
  }
  log::debug!("thread {thread_id}: session closed");
}

/// Applies a fresh read of `thread_id` if it is still the open thread and
/// differs from what is shown. Returns whether the detail was replaced.
fn reconcile(view: &watch::Sender<ThreadView>, thread_id: &str, fresh: ThreadDetail) -> bool {
  let mut replaced = false;
  view.send_if_modified(|v| {
    if v.thread_id.as_deref() != Some(thread_id) {
      return false;
    }
    let cleared_error = v.error.take().is_some();
    if let Some(shown) = &v.detail {
      if !shown.should_replace_with(&fresh) {
        return cleared_error;
      }
    }
    v.detail = Some(fresh);
    v.revision += 1;
    replaced = true;
    true
  });
  replaced
}
