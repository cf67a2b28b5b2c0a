use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

/// `thread_changed` push notification. Only says "go look again"; the
/// payload is never applied as content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadChanged {
  pub thread_id: String,
}

/// Process-local fan-out of thread change notifications.
#[derive(Clone)]
pub struct ThreadEventBus {
  tx: broadcast::Sender<ThreadChanged>,
}

impl ThreadEventBus {
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity.max(1));
    Self { tx }
  }

  /// Best effort: with nobody listening the event is dropped.
  pub fn publish(&self, thread_id: impl Into<String>) {
    let _ = self.tx.send(ThreadChanged {
      thread_id: thread_id.into(),
    });
  }

  /// Listener for one thread. Dropping it unsubscribes.
  pub fn listen(&self, thread_id: impl Into<String>) -> ThreadChangeListener {
    ThreadChangeListener {
      thread_id: thread_id.into(),
      rx: Some(self.tx.subscribe()),
    }
  }
}

impl Default for ThreadEventBus {
  fn default() -> Self {
    Self::new(64)
  }
}

pub struct ThreadChangeListener {
  thread_id: String,
  rx: Option<broadcast::Receiver<ThreadChanged>>,
}

impl ThreadChangeListener {
  pub fn thread_id(&self) -> &str {
    &self.thread_id
  }

  /// Resolves on the next hint for this thread. Events for other threads are
  /// skipped. A lagged receiver counts as a hint since something was missed.
  /// Once the bus is gone this never resolves.
  pub async fn changed(&mut self) {
    loop {
      let Some(rx) = self.rx.as_mut() else {
        return std::future::pending().await;
      };
      match rx.recv().await {
        Ok(ev) if ev.thread_id == self.thread_id => return,
        Ok(_) => continue,
        Err(RecvError::Lagged(n)) => {
          log::debug!("thread events lagged by {n}; treating as a change hint");
          return;
        }
        Err(RecvError::Closed) => {
          self.rx = None;
        }
      }
    }
  }
}
