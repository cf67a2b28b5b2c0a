use std::{
  collections::VecDeque,
  sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use super::now_unix_ms;

const MIN_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
  Info,
  Warn,
  Error,
}

impl From<LogLevel> for log::Level {
  fn from(level: LogLevel) -> Self {
    match level {
      LogLevel::Info => log::Level::Info,
      LogLevel::Warn => log::Level::Warn,
      LogLevel::Error => log::Level::Error,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
  pub ts_unix_ms: u128,
  pub level: LogLevel,
  pub source: String,
  pub msg: String,
}

/// Bounded in-app log that the dashboard can list. Every entry is also
/// forwarded to the `log` facade, targeted at its source.
#[derive(Clone)]
pub struct LogBus {
  inner: Arc<Mutex<Inner>>,
}

struct Inner {
  buf: VecDeque<LogEntry>,
  cap: usize,
}

impl LogBus {
  pub fn new(cap: usize) -> Self {
    let cap = cap.max(MIN_CAPACITY);
    Self {
      inner: Arc::new(Mutex::new(Inner {
        buf: VecDeque::with_capacity(cap),
        cap,
      })),
    }
  }

  pub fn push(&self, level: LogLevel, source: impl Into<String>, msg: impl Into<String>) {
    let source = source.into();
    let msg = msg.into();
    log::log!(target: source.as_str(), level.into(), "{msg}");

    let mut g = self.lock();
    if g.buf.len() >= g.cap {
      g.buf.pop_front();
    }
    g.buf.push_back(LogEntry {
      ts_unix_ms: now_unix_ms(),
      level,
      source,
      msg,
    });
  }

  pub fn info(&self, source: &str, msg: impl Into<String>) {
    self.push(LogLevel::Info, source, msg);
  }

  pub fn warn(&self, source: &str, msg: impl Into<String>) {
    self.push(LogLevel::Warn, source, msg);
  }

  pub fn error(&self, source: &str, msg: impl Into<String>) {
    self.push(LogLevel::Error, source, msg);
  }

  /// Newest first.
  pub fn list(&self, limit: usize) -> Vec<LogEntry> {
    let g = self.lock();
    g.buf.iter().rev().take(limit.max(1)).cloned().collect()
  }

  pub fn clear(&self) {
    self.lock().buf.clear();
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl Default for LogBus {
  fn default() -> Self {
    Self::new(1200)
  }
}
