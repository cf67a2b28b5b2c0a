use std::{
  collections::HashSet,
  sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::watch;

use super::types::{ThreadPage, ThreadSummary};
use crate::{backend::ThreadBackend, core::error::HubResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogView {
  pub threads: Vec<ThreadSummary>,
  pub next_cursor: Option<String>,
  pub loading: bool,
  /// Last fetch failure. Loaded pages stay in `threads`.
  pub error: Option<String>,
}

impl CatalogView {
  /// False at end of list or while a fetch is out; "load more" is inert then.
  pub fn can_load_more(&self) -> bool {
    self.next_cursor.is_some() && !self.loading
  }
}

// `None` is the first page.
type FlightKey = Option<String>;

#[derive(Default)]
struct Flights {
  generation: u64,
  keys: HashSet<FlightKey>,
}

/// Cursor-paginated conversation list.
#[derive(Clone)]
pub struct ThreadCatalog {
  inner: Arc<Inner>,
}

struct Inner {
  backend: Arc<dyn ThreadBackend>,
  view: watch::Sender<CatalogView>,
  flights: Mutex<Flights>,
}

impl ThreadCatalog {
  pub fn new(backend: Arc<dyn ThreadBackend>) -> Self {
    let (view, _) = watch::channel(CatalogView::default());
    Self {
      inner: Arc::new(Inner {
        backend,
        view,
        flights: Mutex::new(Flights::default()),
      }),
    }
  }

  pub fn view(&self) -> CatalogView {
    self.inner.view.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<CatalogView> {
    self.inner.view.subscribe()
  }

  /// Loads the first page and replaces the list. `Ok(None)` when a first
  /// page fetch is already out.
  pub async fn fetch_first_page(&self, page_size: usize) -> HubResult<Option<ThreadPage>> {
    let Some(generation) = self.begin(None, true) else {
      return Ok(None);
    };
    let res = self.inner.backend.thread_list(page_size, None).await;
    let current = self.finish(&None, generation);

    match res {
      Ok(page) => {
        let page = normalize(page);
        let threads = dedup(Vec::new(), page.threads);
        self.inner.view.send_modify(|v| {
          v.threads = threads.clone();
          v.next_cursor = page.next_cursor.clone();
          v.error = None;
        });
        Ok(Some(ThreadPage {
          threads,
          next_cursor: page.next_cursor,
        }))
      }
      Err(e) if current => {
        self.inner.view.send_modify(|v| v.error = Some(e.to_string()));
        Err(e)
      }
      Err(e) => Err(e),
    }
  }

  /// Appends the page behind `cursor`. Returns the summaries actually added,
  /// or `Ok(None)` when the cursor is no longer the list's continuation or a
  /// fetch for it is already out.
  pub async fn fetch_next_page(&self, cursor: &str, page_size: usize) -> HubResult<Option<ThreadPage>> {
    if self.inner.view.borrow().next_cursor.as_deref() != Some(cursor) {
      return Ok(None);
    }
    let key: FlightKey = Some(cursor.to_string());
    let Some(generation) = self.begin(key.clone(), false) else {
      return Ok(None);
    };
    let res = self.inner.backend.thread_list(page_size, key.clone()).await;
    let current = self.finish(&key, generation);

    match res {
      Ok(page) => {
        let page = normalize(page);
        let mut added = None;
        self.inner.view.send_if_modified(|v| {
          // A reload or a racing append already moved past this cursor.
          if !current || v.next_cursor.as_deref() != Some(cursor) {
            return false;
          }
          let before = v.threads.len();
          v.threads = dedup(std::mem::take(&mut v.threads), page.threads.clone());
          v.next_cursor = page.next_cursor.clone();
          v.error = None;
          added = Some(ThreadPage {
            threads: v.threads[before..].to_vec(),
            next_cursor: page.next_cursor.clone(),
          });
          true
        });
        Ok(added)
      }
      Err(e) if current => {
        self.inner.view.send_modify(|v| v.error = Some(e.to_string()));
        Err(e)
      }
      Err(e) => Err(e),
    }
  }

  /// Follows the stored cursor. Inert (`Ok(None)`) at end of list.
  pub async fn load_more(&self, page_size: usize) -> HubResult<Option<ThreadPage>> {
    let cursor = self.inner.view.borrow().next_cursor.clone();
    match cursor {
      Some(cursor) => self.fetch_next_page(&cursor, page_size).await,
      None => Ok(None),
    }
  }

  fn begin(&self, key: FlightKey, reset: bool) -> Option<u64> {
    let mut flights = self.flights();
    if flights.keys.contains(&key) {
      return None;
    }
    if reset {
      flights.generation += 1;
    }
    flights.keys.insert(key);
    let generation = flights.generation;
    drop(flights);
    self.set_loading(true);
    Some(generation)
  }

  // Returns whether the fetch still belongs to the current list.
  fn finish(&self, key: &FlightKey, generation: u64) -> bool {
    let mut flights = self.flights();
    flights.keys.remove(key);
    let loading = !flights.keys.is_empty();
    let current = flights.generation == generation;
    drop(flights);
    self.set_loading(loading);
    current
  }

  fn set_loading(&self, loading: bool) {
    self.inner.view.send_if_modified(|v| {
      let changed = v.loading != loading;
      v.loading = loading;
      changed
    });
  }

  fn flights(&self) -> MutexGuard<'_, Flights> {
    self.inner.flights.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

fn normalize(mut page: ThreadPage) -> ThreadPage {
  page.next_cursor = page.next_cursor.filter(|c| !c.trim().is_empty());
  page
}

// Keeps first occurrences, in order.
fn dedup(mut existing: Vec<ThreadSummary>, incoming: Vec<ThreadSummary>) -> Vec<ThreadSummary> {
  let mut seen: HashSet<String> = existing.iter().map(|t| t.id.clone()).collect();
  for t in incoming {
    if seen.insert(t.id.clone()) {
      existing.push(t);
    }
  }
  existing
}
