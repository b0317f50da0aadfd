//! End-to-end scan behaviour against in-memory and directory stores.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use driftnet_core::{drive, execute_task, Operation, Outcome, Task};
use driftnet_scan::{
    DirStore, ItemError, ListPage, MemoryStore, ObjectStore, PipelineConfig, RequestError,
    ScanListener, ScanOperation, ScanRequest, StoreError,
};
use parking_lot::Mutex;

/// Wraps a store, recording listing calls and optionally slowing fetches.
struct Recording {
    inner: MemoryStore,
    list_calls: Mutex<Vec<Option<String>>>,
    fetch_delay: Option<Duration>,
}

impl Recording {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            list_calls: Mutex::new(Vec::new()),
            fetch_delay: None,
        }
    }

    fn slow(inner: MemoryStore, delay: Duration) -> Self {
        Self {
            fetch_delay: Some(delay),
            ..Self::new(inner)
        }
    }
}

#[async_trait]
impl ObjectStore for Recording {
    async fn list_page(
        &self,
        prefix: Option<&str>,
        token: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage, StoreError> {
        self.list_calls.lock().push(prefix.map(str::to_owned));
        self.inner.list_page(prefix, token, page_size).await
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, StoreError> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.fetch(key).await
    }
}

#[derive(Default)]
struct Counter {
    loaded: AtomicUsize,
    completed: AtomicUsize,
}

impl ScanListener for Counter {
    fn on_load_object(&self, _key: &str, _payload: Bytes) -> Result<(), ItemError> {
        self.loaded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_scan_complete(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

fn keys(prefix: &str, count: usize) -> impl Iterator<Item = (String, &'static str)> + '_ {
    (0..count).map(move |i| (format!("{prefix}{i:06}"), "{}"))
}

fn root(op: &Arc<ScanOperation>) -> Arc<Task> {
    Task::from_arc(Arc::clone(op) as Arc<dyn Operation>)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pages_are_requested_in_sequence_until_exhausted() {
    let store = Arc::new(Recording::new(MemoryStore::from_objects(keys("obj/", 2037))));
    let listener = Arc::new(Counter::default());
    let request = ScanRequest::new(store.clone(), "*", listener.clone(), 8).unwrap();
    let op = Arc::new(request.into_operation(PipelineConfig::default().with_page_size(1000)));

    assert_eq!(drive(&root(&op), Outcome::Error).await, Outcome::Success);

    let calls = store.list_calls.lock().clone();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(Option::is_none), "sentinel scope sends no prefix");

    let progress = op.progress();
    assert_eq!(progress.listed, 2037);
    assert_eq!(progress.dispatched, 2037);
    assert_eq!(listener.loaded.load(Ordering::SeqCst), 2037);
    assert_eq!(listener.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scoped_scan_only_visits_matching_keys() {
    let store = MemoryStore::from_objects(keys("logs/2020/", 10));
    for (key, body) in keys("other/", 5) {
        store.put(key, body);
    }
    let store = Arc::new(Recording::new(store));
    let listener = Arc::new(Counter::default());
    let request = ScanRequest::new(store.clone(), "logs/2020", listener.clone(), 4).unwrap();
    let op = Arc::new(request.into_operation(PipelineConfig::default()));

    assert_eq!(drive(&root(&op), Outcome::Error).await, Outcome::Success);
    assert_eq!(listener.loaded.load(Ordering::SeqCst), 10);
    assert_eq!(listener.completed.load(Ordering::SeqCst), 1);
    assert_eq!(*store.list_calls.lock(), vec![Some("logs/2020".to_owned())]);
}

#[test]
fn stop_mid_scan_ends_stopped() {
    let store = Arc::new(Recording::slow(
        MemoryStore::from_objects(keys("k/", 100_000)),
        Duration::from_millis(1),
    ));
    let listener = Arc::new(Counter::default());
    let request = ScanRequest::new(store, "*", listener.clone(), 4).unwrap();
    let op = Arc::new(request.into_operation(PipelineConfig::default()));
    let task = root(&op);

    let remote = Arc::clone(&task);
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(5));
        remote.stop();
    });

    assert_eq!(execute_task(&task, Outcome::Error), Outcome::Stopped);
    stopper.join().unwrap();

    assert!(op.progress().processed() < 100_000);
    assert!(listener.loaded.load(Ordering::SeqCst) < 100_000);
    assert_eq!(listener.completed.load(Ordering::SeqCst), 0);
}

#[test]
fn zero_threads_still_completes() {
    let store = Arc::new(MemoryStore::from_objects(keys("a/", 20)));
    let listener = Arc::new(Counter::default());
    let request = ScanRequest::new(store, "a/", listener.clone(), 0).unwrap();
    assert_eq!(request.processing_threads(), 1);

    assert_eq!(request.execute(PipelineConfig::default().with_page_size(7)), Outcome::Success);
    assert_eq!(listener.loaded.load(Ordering::SeqCst), 20);
}

#[test]
fn blank_scope_is_rejected_at_construction() {
    for scope in ["", "   "] {
        let err = ScanRequest::new(
            Arc::new(MemoryStore::new()),
            scope,
            Arc::new(Counter::default()),
            2,
        )
        .unwrap_err();
        assert_eq!(err, RequestError::EmptyScope);
    }
}

#[test]
fn missing_objects_are_skipped_and_scan_succeeds() {
    /// Lists keys whose bodies were deleted after listing.
    struct Vanishing;

    #[async_trait]
    impl ObjectStore for Vanishing {
        async fn list_page(
            &self,
            _prefix: Option<&str>,
            _token: Option<&str>,
            _page_size: usize,
        ) -> Result<ListPage, StoreError> {
            Ok(ListPage {
                keys: (0..5).map(|i| format!("gone-{i}")).collect(),
                next_token: None,
            })
        }

        async fn fetch(&self, key: &str) -> Result<Bytes, StoreError> {
            Err(StoreError::NotFound { key: key.to_owned() })
        }
    }

    let listener = Arc::new(Counter::default());
    let request = ScanRequest::new(Arc::new(Vanishing), "*", listener.clone(), 2).unwrap();
    let op = Arc::new(request.into_operation(PipelineConfig::default()));

    assert_eq!(execute_task(&root(&op), Outcome::Error), Outcome::Success);
    assert_eq!(op.progress().skipped, 5);
    assert_eq!(listener.loaded.load(Ordering::SeqCst), 0);
    assert_eq!(listener.completed.load(Ordering::SeqCst), 1);
}

#[test]
fn directory_store_scan() {
    let dir = tempfile::tempdir().unwrap();
    for path in ["2020/01/a.log", "2020/02/b.log", "2021/01/c.log"] {
        let full = dir.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, path).unwrap();
    }

    let seen = Arc::new(Mutex::new(Vec::new()));

    struct Collect(Arc<Mutex<Vec<(String, Bytes)>>>);

    impl ScanListener for Collect {
        fn on_load_object(&self, key: &str, payload: Bytes) -> Result<(), ItemError> {
            self.0.lock().push((key.to_owned(), payload));
            Ok(())
        }
    }

    let request = ScanRequest::new(
        Arc::new(DirStore::new(dir.path())),
        "2020/",
        Arc::new(Collect(Arc::clone(&seen))),
        2,
    )
    .unwrap();

    assert_eq!(request.execute(PipelineConfig::default().with_page_size(1)), Outcome::Success);

    let mut seen = seen.lock().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("2020/01/a.log".to_owned(), Bytes::from_static(b"2020/01/a.log")),
            ("2020/02/b.log".to_owned(), Bytes::from_static(b"2020/02/b.log")),
        ]
    );
}
