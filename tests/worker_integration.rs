//! Integration tests for the crawl worker loop.
//!
//! The queue and record stores are real SQLite; the fetcher, the pause and
//! (where a test needs failures) the queue store are scripted fakes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crawl_worker_core::crawl::{
    CrawlWorker, FetchError, FetchRequest, FetchedPage, PageFetcher, Pause, WorkerError,
    WorkerSettings,
};
use crawl_worker_core::queue::{QueueItem, Result as QueueResult};
use crawl_worker_core::{
    Database, HtmlPageParser, Period, ProcessedRecord, ProxySelector, Queue, QueueError,
    QueueStore, RecordStore, Records,
};

const PAGE_A: &str = r#"<html><head><title>A</title></head><body>
  <h1>App A</h1>
  <a href="/store/apps/details?id=b">b</a>
  <a href="/store/apps/details?id=c">c</a>
  <a href="/store/apps/details?id=b">b again</a>
</body></html>"#;

const PAGE_NO_LINKS: &str = r#"<html><head><title>Solo</title></head><body>
  <h1>App Solo</h1>
  <p>Nothing else to see.</p>
</body></html>"#;

const URL_A: &str = "https://example.test/a";
const URL_B: &str = "https://example.test/b";

// ==================== Fakes ====================

#[derive(Clone)]
enum Scripted {
    Page(u16, &'static str),
    Timeout,
    Panic,
}

#[derive(Default)]
struct FetchLog {
    scripts: HashMap<String, VecDeque<Scripted>>,
    calls: Vec<(String, Option<String>)>,
    resets: usize,
}

#[derive(Clone, Default)]
struct FakeFetcher {
    log: Arc<Mutex<FetchLog>>,
}

impl FakeFetcher {
    fn script(&self, url: &str, steps: &[Scripted]) {
        self.log
            .lock()
            .unwrap()
            .scripts
            .insert(url.to_string(), steps.iter().cloned().collect());
    }

    fn calls(&self) -> Vec<(String, Option<String>)> {
        self.log.lock().unwrap().calls.clone()
    }

    fn resets(&self) -> usize {
        self.log.lock().unwrap().resets
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchedPage, FetchError> {
        let step = {
            let mut log = self.log.lock().unwrap();
            log.calls.push((
                request.url.to_string(),
                request.proxy.map(|p| p.host.clone()),
            ));
            log.scripts
                .get_mut(request.url)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Scripted::Page(404, ""))
        };

        match step {
            Scripted::Page(status, body) => Ok(FetchedPage {
                status,
                body: body.to_string(),
            }),
            Scripted::Timeout => Err(FetchError::timeout(request.url)),
            Scripted::Panic => panic!("fetcher exploded"),
        }
    }

    fn reset(&mut self) -> Result<(), FetchError> {
        self.log.lock().unwrap().resets += 1;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPause {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

/// Real queue that logs every call and can be told to fail some of them.
struct RecordingQueue {
    inner: Queue,
    ops: Mutex<Vec<String>>,
    remove_failures: AtomicUsize,
    freshness_failures: AtomicUsize,
}

impl RecordingQueue {
    fn new(inner: Queue) -> Self {
        Self {
            inner,
            ops: Mutex::new(Vec::new()),
            remove_failures: AtomicUsize::new(0),
            freshness_failures: AtomicUsize::new(0),
        }
    }

    fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn log(&self, op: &str, url: &str) {
        self.ops.lock().unwrap().push(format!("{op}:{url}"));
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn unavailable() -> QueueError {
    QueueError::from(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl QueueStore for RecordingQueue {
    async fn claim(&self) -> QueueResult<Option<QueueItem>> {
        let item = self.inner.claim().await?;
        if let Some(item) = &item {
            self.log("claim", &item.url);
        }
        Ok(item)
    }

    async fn release(&self, url: &str, busy: bool) -> QueueResult<()> {
        self.log("release", url);
        self.inner.release(url, busy).await
    }

    async fn remove(&self, url: &str) -> QueueResult<()> {
        if Self::take_failure(&self.remove_failures) {
            self.log("remove_failed", url);
            return Err(unavailable());
        }
        self.log("remove", url);
        self.inner.remove(url).await
    }

    async fn insert(&self, url: &str) -> QueueResult<bool> {
        self.inner.insert(url).await
    }

    async fn contains(&self, url: &str) -> QueueResult<bool> {
        self.inner.contains(url).await
    }

    async fn is_freshly_processed(&self, url: &str, period: Period) -> QueueResult<bool> {
        if Self::take_failure(&self.freshness_failures) {
            return Err(unavailable());
        }
        self.inner.is_freshly_processed(url, period).await
    }
}

/// A store whose every claim fails on connectivity.
struct UnreachableQueue;

#[async_trait]
impl QueueStore for UnreachableQueue {
    async fn claim(&self) -> QueueResult<Option<QueueItem>> {
        Err(unavailable())
    }
    async fn release(&self, _url: &str, _busy: bool) -> QueueResult<()> {
        Err(unavailable())
    }
    async fn remove(&self, _url: &str) -> QueueResult<()> {
        Err(unavailable())
    }
    async fn insert(&self, _url: &str) -> QueueResult<bool> {
        Err(unavailable())
    }
    async fn contains(&self, _url: &str) -> QueueResult<bool> {
        Err(unavailable())
    }
    async fn is_freshly_processed(&self, _url: &str, _period: Period) -> QueueResult<bool> {
        Err(unavailable())
    }
}

/// Record store that refuses the first `refusals` inserts, then delegates.
struct RefusingRecords {
    inner: Records,
    refusals: AtomicUsize,
}

#[async_trait]
impl RecordStore for RefusingRecords {
    async fn insert(&self, record: &ProcessedRecord) -> QueueResult<bool> {
        if RecordingQueue::take_failure(&self.refusals) {
            return Ok(false);
        }
        self.inner.insert(record).await
    }
}

/// Record store whose first `failures` inserts error out, then delegates.
struct FailingRecords {
    inner: Records,
    failures: AtomicUsize,
}

#[async_trait]
impl RecordStore for FailingRecords {
    async fn insert(&self, record: &ProcessedRecord) -> QueueResult<bool> {
        if RecordingQueue::take_failure(&self.failures) {
            return Err(QueueError::from(sqlx::Error::PoolClosed));
        }
        self.inner.insert(record).await
    }
}

// ==================== Harness ====================

struct Harness {
    queue: Arc<RecordingQueue>,
    records: Records,
    fetcher: FakeFetcher,
    pause: Arc<RecordingPause>,
    period: Period,
}

impl Harness {
    async fn new(urls: &[&str]) -> Self {
        let db = Database::new_in_memory().await.unwrap();
        let queue = Queue::new(db.clone());
        for url in urls {
            queue.insert(url).await.unwrap();
        }
        Self {
            queue: Arc::new(RecordingQueue::new(queue)),
            records: Records::new(db),
            fetcher: FakeFetcher::default(),
            pause: Arc::new(RecordingPause::default()),
            period: "2026-10-01".parse().unwrap(),
        }
    }

    fn worker(&self) -> CrawlWorker {
        self.worker_with_records(Arc::new(self.records.clone()))
    }

    fn worker_with_records(&self, records: Arc<dyn RecordStore>) -> CrawlWorker {
        CrawlWorker::new(
            self.queue.clone(),
            records,
            Arc::new(HtmlPageParser::with_defaults().unwrap()),
            Box::new(self.fetcher.clone()),
        )
        .with_pause(self.pause.clone())
        .with_period(self.period)
    }

    /// Every claim must be followed by exactly one successful remove or a release.
    fn assert_each_claim_settled_once(&self) {
        let ops = self.queue.ops();
        let mut open: Option<String> = None;
        for op in &ops {
            let (kind, url) = op.split_once(':').unwrap();
            match kind {
                "claim" => {
                    assert!(open.is_none(), "claim before previous item settled: {ops:?}");
                    open = Some(url.to_string());
                }
                "remove" | "release" => {
                    assert_eq!(open.as_deref(), Some(url), "settled wrong item: {ops:?}");
                    open = None;
                }
                "remove_failed" => {
                    assert_eq!(open.as_deref(), Some(url), "{ops:?}");
                }
                other => panic!("unexpected op {other}"),
            }
        }
        assert!(open.is_none(), "last item never settled: {ops:?}");
    }
}

// ==================== Scenarios ====================

#[tokio::test]
async fn test_success_and_not_found_both_retire_items() {
    let h = Harness::new(&[URL_A, URL_B]).await;
    h.fetcher.script(URL_A, &[Scripted::Page(200, PAGE_A)]);
    h.fetcher.script(URL_B, &[Scripted::Page(0, "")]);

    let stats = h.worker().run().await.unwrap();

    assert_eq!(stats.claimed(), 2);
    assert_eq!(stats.stored(), 1);
    assert_eq!(stats.not_found(), 1);
    assert!(h.pause.waits().is_empty(), "no backoff expected");
    assert_eq!(h.queue.inner.count().await.unwrap(), 0);

    let record = h.records.get(URL_A, h.period).await.unwrap().unwrap();
    assert_eq!(record.title.as_deref(), Some("App A"));
    assert_eq!(
        record.related_urls,
        [
            "https://play.google.com/store/apps/details?id=b",
            "https://play.google.com/store/apps/details?id=c"
        ]
    );
    assert!(h.records.get(URL_B, h.period).await.unwrap().is_none());
    h.assert_each_claim_settled_once();
}

#[tokio::test]
async fn test_soft_failures_back_off_exponentially_and_success_resets_streak() {
    let h = Harness::new(&[URL_A]).await;
    h.fetcher.script(
        URL_A,
        &[
            Scripted::Page(500, "oops"),
            Scripted::Page(503, "busy"),
            Scripted::Timeout,
            Scripted::Page(200, PAGE_A),
        ],
    );

    let mut worker = h.worker();
    let stats = worker.run().await.unwrap();

    assert_eq!(
        h.pause.waits(),
        [
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8)
        ]
    );
    assert_eq!(worker.streak(), 0);
    assert_eq!(stats.soft_failures(), 3);
    assert_eq!(stats.stored(), 1);
    assert_eq!(h.fetcher.resets(), 3);
    assert_eq!(h.queue.inner.count().await.unwrap(), 0);
    h.assert_each_claim_settled_once();
}

#[tokio::test]
async fn test_proxy_mode_uses_flat_wait_and_rotates_endpoints() {
    let h = Harness::new(&[URL_A]).await;
    h.fetcher.script(
        URL_A,
        &[
            Scripted::Page(503, "x"),
            Scripted::Page(503, "x"),
            Scripted::Page(503, "x"),
            Scripted::Page(200, PAGE_A),
        ],
    );
    let proxies = ProxySelector::from_lines(["10.0.0.1:8080", "10.0.0.2:8080"]).unwrap();

    let stats = h
        .worker()
        .with_proxies(Arc::new(proxies))
        .run()
        .await
        .unwrap();

    assert_eq!(h.pause.waits(), [Duration::from_secs(2); 3]);
    let hosts: Vec<Option<String>> = h.fetcher.calls().into_iter().map(|(_, p)| p).collect();
    assert_eq!(
        hosts,
        [
            Some("10.0.0.1".to_string()),
            Some("10.0.0.2".to_string()),
            Some("10.0.0.1".to_string()),
            Some("10.0.0.2".to_string()),
        ]
    );
    assert_eq!(stats.stored(), 1);
}

#[tokio::test]
async fn test_fresh_item_is_retired_without_fetching() {
    let h = Harness::new(&[URL_A]).await;
    h.records
        .insert(&ProcessedRecord {
            url: URL_A.to_string(),
            reference_date: h.period,
            title: Some("A".to_string()),
            category: None,
            attributes: Default::default(),
            related_urls: Vec::new(),
        })
        .await
        .unwrap();

    let stats = h.worker().run().await.unwrap();

    assert_eq!(stats.skipped_fresh(), 1);
    assert!(h.fetcher.calls().is_empty(), "fresh item must not be fetched");
    assert_eq!(h.queue.inner.count().await.unwrap(), 0);
    h.assert_each_claim_settled_once();
}

#[tokio::test]
async fn test_relative_identifier_is_resolved_against_prefix() {
    let h = Harness::new(&["/store/apps/details?id=a"]).await;
    let target = "https://example.test/store/apps/details?id=a";
    h.fetcher.script(target, &[Scripted::Page(200, PAGE_A)]);

    let stats = h
        .worker()
        .with_settings(WorkerSettings {
            url_prefix: "https://example.test".to_string(),
            ..WorkerSettings::default()
        })
        .run()
        .await
        .unwrap();

    assert_eq!(stats.stored(), 1);
    assert_eq!(h.fetcher.calls()[0].0, target);
    assert!(h.records.get(target, h.period).await.unwrap().is_some());
}

#[tokio::test]
async fn test_empty_body_is_soft_failure() {
    let h = Harness::new(&[URL_A]).await;
    h.fetcher
        .script(URL_A, &[Scripted::Page(200, ""), Scripted::Page(404, "")]);

    let stats = h.worker().run().await.unwrap();

    assert_eq!(stats.soft_failures(), 1);
    assert_eq!(stats.not_found(), 1);
    assert_eq!(h.pause.waits(), [Duration::from_secs(2)]);
    assert_eq!(h.records.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_persist_failure_releases_without_backoff() {
    let h = Harness::new(&[URL_A]).await;
    h.fetcher.script(
        URL_A,
        &[Scripted::Page(200, PAGE_A), Scripted::Page(200, PAGE_A)],
    );
    let records = Arc::new(RefusingRecords {
        inner: h.records.clone(),
        refusals: AtomicUsize::new(1),
    });

    let mut worker = h.worker_with_records(records);
    let stats = worker.run().await.unwrap();

    assert_eq!(stats.persist_failures(), 1);
    assert_eq!(stats.stored(), 1);
    assert!(h.pause.waits().is_empty());
    assert_eq!(worker.streak(), 0);
    assert_eq!(
        h.queue.ops(),
        [
            format!("claim:{URL_A}"),
            format!("release:{URL_A}"),
            format!("claim:{URL_A}"),
            format!("remove:{URL_A}"),
        ]
    );
}

#[tokio::test]
async fn test_record_store_error_releases_without_backoff() {
    let h = Harness::new(&[URL_A]).await;
    h.fetcher.script(
        URL_A,
        &[Scripted::Page(200, PAGE_A), Scripted::Page(200, PAGE_A)],
    );
    let records = Arc::new(FailingRecords {
        inner: h.records.clone(),
        failures: AtomicUsize::new(1),
    });

    let mut worker = h.worker_with_records(records);
    let stats = worker.run().await.unwrap();

    assert_eq!(stats.persist_failures(), 1);
    assert_eq!(stats.stored(), 1);
    assert_eq!(stats.errors(), 0);
    assert!(h.pause.waits().is_empty());
    assert_eq!(worker.streak(), 0);
    assert_eq!(
        h.queue.ops(),
        [
            format!("claim:{URL_A}"),
            format!("release:{URL_A}"),
            format!("claim:{URL_A}"),
            format!("remove:{URL_A}"),
        ]
    );
    assert!(h.records.get(URL_A, h.period).await.unwrap().is_some());
}

#[tokio::test]
async fn test_page_without_related_links_is_still_stored() {
    let h = Harness::new(&[URL_A]).await;
    h.fetcher.script(URL_A, &[Scripted::Page(200, PAGE_NO_LINKS)]);

    let stats = h.worker().run().await.unwrap();

    assert_eq!(stats.stored(), 1);
    assert_eq!(stats.errors(), 0);
    assert!(h.pause.waits().is_empty());
    assert_eq!(h.queue.inner.count().await.unwrap(), 0);

    let record = h.records.get(URL_A, h.period).await.unwrap().unwrap();
    assert_eq!(record.title.as_deref(), Some("App Solo"));
    assert!(record.related_urls.is_empty());
    h.assert_each_claim_settled_once();
}

#[tokio::test]
async fn test_unparseable_page_releases_item() {
    let h = Harness::new(&[URL_A]).await;
    h.fetcher.script(
        URL_A,
        &[
            Scripted::Page(200, "<html><body><p>no title</p></body></html>"),
            Scripted::Page(410, ""),
        ],
    );

    let stats = h.worker().run().await.unwrap();

    assert_eq!(stats.errors(), 1);
    assert_eq!(stats.not_found(), 1);
    assert!(h.pause.waits().is_empty());
    h.assert_each_claim_settled_once();
}

#[tokio::test]
async fn test_panicking_fetch_is_contained_and_item_released() {
    let h = Harness::new(&[URL_A]).await;
    h.fetcher
        .script(URL_A, &[Scripted::Panic, Scripted::Page(404, "")]);

    let stats = h.worker().run().await.unwrap();

    assert_eq!(stats.errors(), 1);
    assert_eq!(stats.not_found(), 1);
    assert_eq!(h.queue.inner.count().await.unwrap(), 0);
    h.assert_each_claim_settled_once();
}

#[tokio::test]
async fn test_failed_remove_falls_back_to_release() {
    let h = Harness::new(&[URL_A]).await;
    h.queue.remove_failures.store(1, Ordering::SeqCst);
    h.fetcher
        .script(URL_A, &[Scripted::Page(404, ""), Scripted::Page(404, "")]);

    let stats = h.worker().run().await.unwrap();

    assert_eq!(stats.not_found(), 2);
    assert_eq!(
        h.queue.ops(),
        [
            format!("claim:{URL_A}"),
            format!("remove_failed:{URL_A}"),
            format!("release:{URL_A}"),
            format!("claim:{URL_A}"),
            format!("remove:{URL_A}"),
        ]
    );
    h.assert_each_claim_settled_once();
}

#[tokio::test]
async fn test_store_error_during_freshness_check_releases_item() {
    let h = Harness::new(&[URL_A]).await;
    h.queue.freshness_failures.store(1, Ordering::SeqCst);
    h.fetcher.script(URL_A, &[Scripted::Page(404, "")]);

    let stats = h.worker().run().await.unwrap();

    assert_eq!(stats.errors(), 1);
    assert_eq!(stats.not_found(), 1);
    assert_eq!(h.fetcher.calls().len(), 1);
    h.assert_each_claim_settled_once();
}

#[tokio::test]
async fn test_unreachable_store_ends_loop_after_retries() {
    let pause = Arc::new(RecordingPause::default());
    let db = Database::new_in_memory().await.unwrap();
    let mut worker = CrawlWorker::new(
        Arc::new(UnreachableQueue),
        Arc::new(Records::new(db)),
        Arc::new(HtmlPageParser::with_defaults().unwrap()),
        Box::new(FakeFetcher::default()),
    )
    .with_pause(pause.clone())
    .with_settings(WorkerSettings {
        max_claim_failures: 3,
        ..WorkerSettings::default()
    });

    let err = worker.run().await.unwrap_err();

    assert!(matches!(err, WorkerError::StoreUnavailable { attempts: 3, .. }));
    assert_eq!(pause.waits(), [Duration::from_secs(5); 2]);
}
