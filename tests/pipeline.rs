//! End-to-end pipeline tests: fake fetcher, real SQLite store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use scrapewatch::models::{ChangeEvent, ChangeKind, ReportSummary, SourceDescriptor};
use scrapewatch::notify::{NotificationSink, NotifyBackend};
use scrapewatch::repository::{AsyncSqlitePool, DieselRecordRepository, ResultStore};
use scrapewatch::scrapers::{Document, FetchError, FetchStrategy, SelectorExtractor};
use scrapewatch::services::{
    ExecutionError, FetchStrategies, RetryPolicy, ScrapeExecutor, ScrapeOutcome,
};

/// Serves whatever body is currently set for a URL.
#[derive(Default)]
struct FakeSite {
    pages: Mutex<HashMap<String, Result<String, FetchError>>>,
}

impl FakeSite {
    fn set(&self, url: &str, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.to_string()));
    }

    fn fail(&self, url: &str, error: FetchError) {
        self.pages.lock().unwrap().insert(url.to_string(), Err(error));
    }
}

#[async_trait]
impl FetchStrategy for FakeSite {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Document, FetchError> {
        let page = self
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Permanent(format!("{} -> 404", url))));
        page.map(|body| Document::new(url, body))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Records every delivered event.
#[derive(Clone, Default)]
struct Collecting(Arc<Mutex<Vec<ChangeEvent>>>);

#[async_trait]
impl NotifyBackend for Collecting {
    async fn send(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn send_digest(&self, _summary: &ReportSummary) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Broken(Arc<AtomicUsize>);

#[async_trait]
impl NotifyBackend for Broken {
    async fn send(&self, _event: &ChangeEvent) -> anyhow::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("smtp unreachable")
    }

    async fn send_digest(&self, _summary: &ReportSummary) -> anyhow::Result<()> {
        anyhow::bail!("smtp unreachable")
    }
}

struct Harness {
    _dir: TempDir,
    site: Arc<FakeSite>,
    repo: DieselRecordRepository,
    events: Collecting,
    executor: Arc<ScrapeExecutor>,
}

async fn harness(sink: impl FnOnce(NotificationSink) -> NotificationSink) -> Harness {
    let dir = TempDir::new().unwrap();
    let repo = DieselRecordRepository::new(AsyncSqlitePool::from_path(&dir.path().join("s.db")));
    repo.init_schema().await.unwrap();

    let site = Arc::new(FakeSite::default());
    let events = Collecting::default();
    let notifier = sink(NotificationSink::new().with_channel("collect", Box::new(events.clone())));

    let executor = Arc::new(ScrapeExecutor::new(
        FetchStrategies::single(site.clone()),
        Arc::new(SelectorExtractor),
        Arc::new(repo.clone()),
        Arc::new(notifier),
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        Duration::from_secs(5),
    ));

    Harness {
        _dir: dir,
        site,
        repo,
        events,
        executor,
    }
}

fn shop(name: &str, url: &str) -> SourceDescriptor {
    SourceDescriptor::new(name, url)
        .with_selector("title", ".t")
        .with_selector("price", ".p")
}

fn page(title: &str, price: &str) -> String {
    format!(
        "<html><body><h1 class='t'>{}</h1><span class='p'>{}</span></body></html>",
        title, price
    )
}

#[tokio::test]
async fn test_notifies_only_on_change() {
    let h = harness(|s| s).await;
    let source = shop("S1", "https://shop.test/item");
    let cancel = CancellationToken::new();

    h.site.set(&source.url, &page("A", "10"));
    let first = h.executor.run(&source, &cancel).await.unwrap();
    assert!(first.is_changed());

    let second = h.executor.run(&source, &cancel).await.unwrap();
    assert!(matches!(second, ScrapeOutcome::Unchanged { .. }));

    h.site.set(&source.url, &page("A", "12"));
    let third = h.executor.run(&source, &cancel).await.unwrap();

    let events = h.events.0.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, ChangeKind::FirstSeen);
    assert_eq!(events[1].kind, ChangeKind::Changed);
    assert_eq!(
        events[1].previous_fingerprint.as_ref(),
        Some(&events[0].record.fingerprint)
    );
    assert_eq!(events[1].record.field("price"), "12");

    match third {
        ScrapeOutcome::Changed(event) => assert_eq!(event.record_id, events[1].record_id),
        other => panic!("expected change, got {:?}", other),
    }

    let stored = h.repo.recent_records(Duration::from_secs(3600)).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].record.field("price"), "12");
    assert_eq!(h.repo.change_count("S1").await.unwrap(), 2);
}

#[tokio::test]
async fn test_one_failing_source_does_not_affect_others() {
    let h = harness(|s| s).await;
    let good = shop("good", "https://good.test/");
    let gone = shop("gone", "https://gone.test/");
    let flaky = shop("flaky", "https://flaky.test/");

    h.site.set(&good.url, &page("ok", "1"));
    h.site.fail(&flaky.url, FetchError::Transient("503".into()));

    let results = h
        .executor
        .run_all(
            vec![Arc::new(good), Arc::new(gone), Arc::new(flaky)],
            3,
            &CancellationToken::new(),
        )
        .await;

    let names: Vec<_> = results.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["good", "gone", "flaky"]);
    assert!(matches!(results[0].1, Ok(ScrapeOutcome::Changed(_))));
    assert!(matches!(results[1].1, Err(ExecutionError::Permanent { .. })));
    assert!(matches!(
        results[2].1,
        Err(ExecutionError::Exhausted { attempts: 2, .. })
    ));

    assert_eq!(h.events.0.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_fields_still_stored() {
    let h = harness(|s| s).await;
    let source = shop("partial", "https://partial.test/").with_selector("stock", ".missing");
    h.site.set(&source.url, "<h1 class='t'>Only a title</h1>");

    let outcome = h
        .executor
        .run(&source, &CancellationToken::new())
        .await
        .unwrap();

    let ScrapeOutcome::Changed(event) = outcome else {
        panic!("expected a first-seen record");
    };
    assert_eq!(event.record.field("title"), "Only a title");
    assert_eq!(event.record.field("price"), "");
    assert_eq!(event.record.field("stock"), "");
    assert_eq!(event.record.fields.len(), 3);
}

#[tokio::test]
async fn test_failing_channel_does_not_block_storage_or_others() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let broken = attempts.clone();
    let h = harness(move |s| s.with_channel("email", Box::new(Broken(broken)))).await;
    let source = shop("S1", "https://shop.test/");
    h.site.set(&source.url, &page("A", "10"));

    let outcome = h
        .executor
        .run(&source, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.is_changed());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(h.events.0.lock().unwrap().len(), 1);
    assert!(h.repo.latest_for_source("S1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_concurrent_identical_inserts_store_once() {
    let h = harness(|s| s).await;
    let source = Arc::new(shop("race", "https://race.test/"));
    h.site.set(&source.url, &page("same", "1"));

    let results = h
        .executor
        .run_all(
            (0..8).map(|_| source.clone()).collect(),
            8,
            &CancellationToken::new(),
        )
        .await;

    let changed = results
        .iter()
        .filter(|(_, r)| matches!(r, Ok(ScrapeOutcome::Changed(_))))
        .count();
    let unchanged = results
        .iter()
        .filter(|(_, r)| matches!(r, Ok(ScrapeOutcome::Unchanged { .. })))
        .count();
    assert_eq!(changed, 1);
    assert_eq!(unchanged, 7);
    assert_eq!(h.events.0.lock().unwrap().len(), 1);
    assert_eq!(
        h.repo.count_by_source().await.unwrap(),
        vec![("race".to_string(), 1)]
    );
}
