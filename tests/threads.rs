mod support;

use std::{collections::HashSet, time::Duration};

use connector_hub::{HubError, ThreadPage};
use support::{hub, summaries, thread, FakeBackend};

fn sleep_ms(ms: u64) -> tokio::time::Sleep {
  tokio::time::sleep(Duration::from_millis(ms))
}

#[tokio::test]
async fn forty_then_ten_gives_fifty_distinct_threads() {
  let backend = FakeBackend::new();
  backend.set_page(
    None,
    ThreadPage {
      threads: summaries(0..40),
      next_cursor: Some("c1".to_string()),
    },
  );
  backend.set_page(
    Some("c1"),
    ThreadPage {
      threads: summaries(40..50),
      next_cursor: None,
    },
  );
  let hub = hub(&backend);

  let first = hub.refresh_threads().await.unwrap().unwrap();
  assert_eq!(first.threads.len(), 40);
  assert_eq!(first.next_cursor.as_deref(), Some("c1"));
  assert!(hub.catalog().view().can_load_more());

  let more = hub.load_more_threads().await.unwrap().unwrap();
  assert_eq!(more.threads.len(), 10);
  assert_eq!(more.next_cursor, None);

  let view = hub.catalog().view();
  assert!(!view.can_load_more());
  assert_eq!(view.threads.len(), 50);
  let ids: HashSet<&str> = view.threads.iter().map(|t| t.id.as_str()).collect();
  assert_eq!(ids.len(), 50);
  let expected: Vec<String> = (0..50).map(|i| format!("t{i}")).collect();
  let got: Vec<String> = view.threads.iter().map(|t| t.id.clone()).collect();
  assert_eq!(got, expected);

  // The disabled "more" control is inert.
  assert_eq!(hub.load_more_threads().await.unwrap(), None);
  assert_eq!(backend.count("thread_list:c1"), 1);
}

#[tokio::test(start_paused = true)]
async fn unchanged_poll_leaves_detail_alone_and_newer_one_replaces_once() {
  let backend = FakeBackend::new();
  backend.set_thread(thread("t1", 1000, &["hello", "hi there"]));
  let hub = hub(&backend);

  hub.open_thread("t1").await.unwrap();
  let mut rx = hub.reader().subscribe();
  rx.borrow_and_update();
  assert_eq!(hub.reader().view().revision, 1);

  sleep_ms(1600).await;
  assert_eq!(backend.count("thread_read:t1"), 2);
  assert_eq!(hub.reader().view().revision, 1);
  assert!(!rx.has_changed().unwrap());

  backend.set_thread(thread("t1", 2000, &["hello", "hi there"]));
  sleep_ms(1500).await;
  assert_eq!(backend.count("thread_read:t1"), 3);
  let view = hub.reader().view();
  assert_eq!(view.revision, 2);
  assert_eq!(view.detail.and_then(|d| d.updated_at), Some(2000));

  sleep_ms(3000).await;
  assert_eq!(backend.count("thread_read:t1"), 5);
  assert_eq!(hub.reader().view().revision, 2);
}

#[tokio::test(start_paused = true)]
async fn push_for_another_thread_does_not_refetch() {
  let backend = FakeBackend::new();
  backend.set_thread(thread("t1", 1000, &["hello"]));
  let hub = hub(&backend);
  hub.open_thread("t1").await.unwrap();

  hub.notify_thread_changed("t2");
  sleep_ms(100).await;
  assert_eq!(backend.count("thread_read:t1"), 1);
  assert_eq!(backend.count("thread_read:t2"), 0);

  backend.set_thread(thread("t1", 1100, &["hello", "working on it"]));
  hub.notify_thread_changed("t1");
  sleep_ms(100).await;
  assert_eq!(backend.count("thread_read:t1"), 2);
  assert_eq!(hub.reader().current().map(|d| d.items.len()), Some(2));
}

#[tokio::test(start_paused = true)]
async fn switching_threads_tears_down_the_previous_session() {
  let backend = FakeBackend::new();
  backend.set_thread(thread("t1", 1000, &["one"]));
  backend.set_thread(thread("t2", 1000, &["two"]));
  let hub = hub(&backend);

  hub.open_thread("t1").await.unwrap();
  hub.open_thread("t2").await.unwrap();
  hub.notify_thread_changed("t1");
  sleep_ms(4000).await;

  assert_eq!(backend.count("thread_read:t1"), 1);
  assert!(backend.count("thread_read:t2") >= 3);
  assert_eq!(hub.reader().view().thread_id.as_deref(), Some("t2"));

  hub.close_thread();
  let reads = backend.count("thread_read:t2");
  sleep_ms(4000).await;
  assert_eq!(backend.count("thread_read:t2"), reads);
  assert!(!hub.reader().is_open());
  assert_eq!(hub.reader().current(), None);
}

#[tokio::test(start_paused = true)]
async fn failed_open_leaves_nothing_running() {
  let backend = FakeBackend::new();
  backend.set_thread(thread("t1", 1000, &["one"]));
  let hub = hub(&backend);
  hub.open_thread("t1").await.unwrap();

  let err = hub.open_thread("missing").await.unwrap_err();
  assert_eq!(err, HubError::Backend("thread not found: missing".to_string()));
  assert!(!hub.reader().is_open());
  let view = hub.reader().view();
  assert_eq!(view.thread_id, None);
  assert_eq!(view.error.as_deref(), Some("thread not found: missing"));

  sleep_ms(4000).await;
  assert_eq!(backend.count("thread_read:t1"), 1);
}

#[tokio::test(start_paused = true)]
async fn poll_failures_keep_the_shown_detail() {
  let backend = FakeBackend::new();
  backend.set_thread(thread("t1", 1000, &["one"]));
  let hub = hub(&backend);
  hub.open_thread("t1").await.unwrap();

  backend.fail_reads(Some(HubError::TransportUnavailable));
  sleep_ms(3100).await;
  assert_eq!(backend.count("thread_read:t1"), 3);
  assert_eq!(hub.reader().current().and_then(|d| d.updated_at), Some(1000));

  backend.fail_reads(None);
  backend.set_thread(thread("t1", 3000, &["one", "two"]));
  assert!(hub.reader().refresh());
  sleep_ms(10).await;
  assert_eq!(hub.reader().current().and_then(|d| d.updated_at), Some(3000));
}

#[tokio::test(start_paused = true)]
async fn slow_earlier_open_cannot_overwrite_a_newer_one() {
  let backend = FakeBackend::new();
  backend.set_thread(thread("t1", 1000, &["hello"]));
  backend.set_read_delay(Duration::from_millis(500));
  let hub = hub(&backend);

  let slow = tokio::spawn({
    let hub = hub.clone();
    async move { hub.open_thread("t1").await }
  });
  sleep_ms(10).await;

  backend.set_read_delay(Duration::ZERO);
  backend.set_thread(thread("t1", 2000, &["hello", "hi there"]));
  let fresh = hub.open_thread("t1").await.unwrap();
  assert_eq!(fresh.updated_at, Some(2000));

  // The first open still gets its answer, but the pane is not touched.
  let stale = slow.await.unwrap().unwrap();
  assert_eq!(stale.updated_at, Some(1000));
  let view = hub.reader().view();
  assert_eq!(view.detail.and_then(|d| d.updated_at), Some(2000));
  assert_eq!(view.revision, 1);
  assert!(hub.reader().is_open());
}

#[tokio::test(start_paused = true)]
async fn close_during_first_read_keeps_the_pane_closed() {
  let backend = FakeBackend::new();
  backend.set_thread(thread("t1", 1000, &["hello"]));
  backend.set_read_delay(Duration::from_millis(500));
  let hub = hub(&backend);

  let opening = tokio::spawn({
    let hub = hub.clone();
    async move { hub.open_thread("t1").await }
  });
  sleep_ms(10).await;
  hub.close_thread();
  opening.await.unwrap().unwrap();

  assert!(!hub.reader().is_open());
  assert_eq!(hub.reader().view().thread_id, None);
  sleep_ms(4000).await;
  assert_eq!(backend.count("thread_read:t1"), 1);
}

#[tokio::test(start_paused = true)]
async fn hint_published_during_the_first_read_is_not_lost() {
  let backend = FakeBackend::new();
  backend.set_thread(thread("t1", 1000, &["hello"]));
  backend.set_read_delay(Duration::from_millis(200));
  let hub = hub(&backend);

  let opening = tokio::spawn({
    let hub = hub.clone();
    async move { hub.open_thread("t1").await }
  });
  sleep_ms(10).await;
  backend.set_thread(thread("t1", 1100, &["hello", "reply"]));
  hub.notify_thread_changed("t1");
  opening.await.unwrap().unwrap();

  // Well before the first poll tick.
  sleep_ms(500).await;
  assert_eq!(backend.count("thread_read:t1"), 2);
  assert_eq!(hub.reader().current().and_then(|d| d.updated_at), Some(1100));
}

#[tokio::test(start_paused = true)]
async fn session_reads_never_overlap() {
  let backend = FakeBackend::new();
  backend.set_thread(thread("t1", 1000, &["hello"]));
  let hub = hub(&backend);
  hub.open_thread("t1").await.unwrap();

  backend.set_read_delay(Duration::from_millis(1000));
  // The 1.5s tick starts a read that is out until 2.5s.
  sleep_ms(1600).await;
  assert_eq!(backend.count("thread_read:t1"), 2);
  hub.notify_thread_changed("t1");
  hub.notify_thread_changed("t1");
  assert!(hub.reader().refresh());
  sleep_ms(100).await;
  assert_eq!(backend.count("thread_read:t1"), 2);

  sleep_ms(4000).await;
  assert!(backend.count("thread_read:t1") >= 4);
  assert_eq!(backend.max_reads_out(), 1);
}
