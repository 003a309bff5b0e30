//! Single-source pipeline: fetch with retry, extract, fingerprint, store,
//! notify.
//!
//! Only the fetch step is retried. A transient failure is retried with
//! exponential backoff up to the attempt ceiling; a permanent failure
//! aborts at once. Storage errors fail the run. Notification failures are
//! logged by the sink and never affect the outcome.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{ChangeEvent, FetchStrategyKind, Fingerprint, Record, SourceDescriptor};
use crate::notify::NotificationSink;
use crate::repository::{InsertOutcome, ResultStore, StorageError};
use crate::scrapers::{fingerprint, Document, Extractor, FetchError, FetchStrategy};

/// Why one source's run failed.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{source_id}: gave up after {attempts} attempts: {last_error}")]
    Exhausted {
        source_id: String,
        attempts: u32,
        #[source]
        last_error: FetchError,
    },
    #[error("{source_id}: {error}")]
    Permanent {
        source_id: String,
        #[source]
        error: FetchError,
    },
    #[error("{source_id}: storage failed: {error}")]
    Storage {
        source_id: String,
        #[source]
        error: StorageError,
    },
    #[error("{source_id}: cancelled by shutdown")]
    Cancelled { source_id: String },
    #[error("{source_id}: execution aborted: {reason}")]
    Aborted { source_id: String, reason: String },
}

impl ExecutionError {
    pub fn source_id(&self) -> &str {
        match self {
            Self::Exhausted { source_id, .. }
            | Self::Permanent { source_id, .. }
            | Self::Storage { source_id, .. }
            | Self::Cancelled { source_id }
            | Self::Aborted { source_id, .. } => source_id,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    /// New content was stored and notified.
    Changed(ChangeEvent),
    /// Content matched an already stored fingerprint.
    Unchanged { fingerprint: Fingerprint },
}

impl ScrapeOutcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

/// Attempt ceiling and backoff curve for the fetch step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retrying after the 0-indexed `attempt` failed:
    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Fetch strategies by kind.
#[derive(Clone)]
pub struct FetchStrategies {
    pub http: Arc<dyn FetchStrategy>,
    pub browser: Arc<dyn FetchStrategy>,
}

impl FetchStrategies {
    /// Use one strategy for every source kind.
    pub fn single(strategy: Arc<dyn FetchStrategy>) -> Self {
        Self {
            http: strategy.clone(),
            browser: strategy,
        }
    }

    pub fn for_kind(&self, kind: FetchStrategyKind) -> &Arc<dyn FetchStrategy> {
        match kind {
            FetchStrategyKind::Http => &self.http,
            FetchStrategyKind::Browser => &self.browser,
        }
    }
}

/// Runs the pipeline for one source at a time. Cheap to share; every run
/// is independent.
pub struct ScrapeExecutor {
    fetchers: FetchStrategies,
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn ResultStore>,
    notifier: Arc<NotificationSink>,
    policy: RetryPolicy,
    fetch_timeout: Duration,
}

impl ScrapeExecutor {
    pub fn new(
        fetchers: FetchStrategies,
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn ResultStore>,
        notifier: Arc<NotificationSink>,
        policy: RetryPolicy,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            fetchers,
            extractor,
            store,
            notifier,
            policy,
            fetch_timeout,
        }
    }

    /// Run one source's pipeline to completion or exhaustion.
    pub async fn run(
        &self,
        source: &SourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ScrapeOutcome, ExecutionError> {
        let doc = self.fetch_with_retry(source, cancel).await?;

        let fields = self.extractor.extract(&doc, &source.selectors);
        let empty = fields.values().filter(|v| v.is_empty()).count();
        if empty > 0 {
            debug!(
                source = %source.name,
                empty,
                total = fields.len(),
                "Some fields extracted empty"
            );
        }

        let record = Record {
            source_id: source.name.clone(),
            url: source.url.clone(),
            fingerprint: fingerprint(&fields),
            fields,
            captured_at: doc.fetched_at,
        };

        let outcome = self
            .store
            .insert_if_new(&record)
            .await
            .map_err(|error| ExecutionError::Storage {
                source_id: source.name.clone(),
                error,
            })?;

        match outcome {
            InsertOutcome::Duplicate => {
                debug!(source = %source.name, fingerprint = %record.fingerprint, "No change");
                Ok(ScrapeOutcome::Unchanged {
                    fingerprint: record.fingerprint,
                })
            }
            InsertOutcome::Inserted { id, previous } => {
                let event = ChangeEvent::new(id, record, previous);
                info!(
                    source = %source.name,
                    change = event.kind.as_str(),
                    fingerprint = %event.record.fingerprint,
                    "New data detected"
                );
                // Stored already; delivery is advisory.
                self.notifier.deliver(&event).await;
                Ok(ScrapeOutcome::Changed(event))
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        source: &SourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Document, ExecutionError> {
        let fetcher = self.fetchers.for_kind(source.fetch);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.policy.delay_for(attempt - 1);
                warn!(
                    source = %source.name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying fetch after backoff"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(ExecutionError::Cancelled {
                            source_id: source.name.clone(),
                        });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            // Host spacing is waited out before the attempt's clock starts.
            tokio::select! {
                biased;
                _ = fetcher.acquire(&source.url) => {}
                _ = cancel.cancelled() => {
                    return Err(ExecutionError::Cancelled {
                        source_id: source.name.clone(),
                    });
                }
            }

            let result = match tokio::time::timeout(
                self.fetch_timeout,
                fetcher.fetch(&source.url, self.fetch_timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(FetchError::Transient(format!(
                    "fetch of {} exceeded {:?}",
                    source.url, self.fetch_timeout
                ))),
            };

            match result {
                Ok(doc) => {
                    debug!(
                        source = %source.name,
                        attempt,
                        strategy = fetcher.name(),
                        "Fetched"
                    );
                    return Ok(doc);
                }
                Err(error) if error.is_transient() => {
                    warn!(source = %source.name, attempt, error = %error, "Transient fetch failure");
                    last_error = Some(error);
                }
                Err(error) => {
                    warn!(source = %source.name, error = %error, "Permanent fetch failure");
                    return Err(ExecutionError::Permanent {
                        source_id: source.name.clone(),
                        error,
                    });
                }
            }
        }

        Err(ExecutionError::Exhausted {
            source_id: source.name.clone(),
            attempts: max_attempts,
            last_error: last_error
                .unwrap_or_else(|| FetchError::Transient("no attempt made".to_string())),
        })
    }

    /// Run many sources concurrently, at most `max_concurrent` at a time.
    /// One source failing never affects another; results come back in
    /// input order.
    pub async fn run_all(
        self: &Arc<Self>,
        sources: Vec<Arc<SourceDescriptor>>,
        max_concurrent: usize,
        cancel: &CancellationToken,
    ) -> Vec<(String, Result<ScrapeOutcome, ExecutionError>)> {
        stream::iter(sources)
            .map(|source| {
                let executor = Arc::clone(self);
                let cancel = cancel.clone();
                let name = source.name.clone();
                // Spawned lazily, so only `max_concurrent` tasks exist at once.
                let handle = tokio::spawn(async move { executor.run(&source, &cancel).await });
                async move {
                    let result = handle.await.unwrap_or_else(|e| {
                        Err(ExecutionError::Aborted {
                            source_id: name.clone(),
                            reason: e.to_string(),
                        })
                    });
                    (name, result)
                }
            })
            .buffered(max_concurrent.max(1))
            .collect::<Vec<_>>()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoredRecord;
    use crate::scrapers::SelectorExtractor;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Store that accepts everything.
    struct AcceptAll;

    #[async_trait]
    impl ResultStore for AcceptAll {
        async fn insert_if_new(&self, _record: &Record) -> Result<InsertOutcome, StorageError> {
            Ok(InsertOutcome::Inserted {
                id: 1,
                previous: None,
            })
        }
        async fn recent_records(&self, _window: Duration) -> Result<Vec<StoredRecord>, StorageError> {
            Ok(Vec::new())
        }
    }

    /// Fetcher replaying a fixed script of results, then the last one forever.
    struct Scripted {
        script: Mutex<Vec<Result<&'static str, FetchError>>>,
        calls: AtomicU32,
        call_times: Mutex<Vec<tokio::time::Instant>>,
    }

    impl Scripted {
        fn new(script: Vec<Result<&'static str, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
                call_times: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl FetchStrategy for Scripted {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Document, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.call_times.lock().unwrap().push(tokio::time::Instant::now());
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            };
            next.map(|body| Document::new(url, body))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn executor(fetcher: Arc<Scripted>, max_attempts: u32) -> ScrapeExecutor {
        ScrapeExecutor::new(
            FetchStrategies::single(fetcher),
            Arc::new(SelectorExtractor),
            Arc::new(AcceptAll),
            Arc::new(NotificationSink::new()),
            RetryPolicy {
                max_attempts,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(60),
            },
            Duration::from_secs(10),
        )
    }

    fn source() -> SourceDescriptor {
        SourceDescriptor::new("S1", "https://example.com").with_selector("title", ".t")
    }

    #[test]
    fn test_delay_for_is_capped_exponential() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(32));
        assert_eq!(policy.delay_for(5), Duration::from_secs(60));
        assert_eq!(policy.delay_for(40), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_ceiling() {
        let fetcher = Scripted::new(vec![Err(FetchError::Transient("down".into()))]);
        let err = executor(fetcher.clone(), 3)
            .run(&source(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Exhausted { attempts: 3, .. }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);

        let times = fetcher.call_times.lock().unwrap().clone();
        let gaps: Vec<_> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps[0] >= Duration::from_secs(2));
        assert!(gaps[1] >= gaps[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_aborts_immediately() {
        let fetcher = Scripted::new(vec![Err(FetchError::Permanent("404".into()))]);
        let err = executor(fetcher.clone(), 5)
            .run(&source(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Permanent { .. }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient() {
        let fetcher = Scripted::new(vec![
            Err(FetchError::Transient("blip".into())),
            Ok("<p class='t'>A</p>"),
        ]);
        let outcome = executor(fetcher.clone(), 3)
            .run(&source(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_changed());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_backoff() {
        let fetcher = Scripted::new(vec![Err(FetchError::Transient("down".into()))]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor(fetcher.clone(), 3)
            .run(&source(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Cancelled { .. }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    /// Fetcher whose host slot opens after a fixed wait and which tracks
    /// how many fetches overlap.
    struct Queued {
        wait: Duration,
        work: Duration,
        in_flight: AtomicU32,
        peak: AtomicU32,
    }

    impl Queued {
        fn new(wait: Duration, work: Duration) -> Arc<Self> {
            Arc::new(Self {
                wait,
                work,
                in_flight: AtomicU32::new(0),
                peak: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl FetchStrategy for Queued {
        async fn acquire(&self, _url: &str) {
            tokio::time::sleep(self.wait).await;
        }

        async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Document, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Document::new(url, "<p class='t'>A</p>"))
        }

        fn name(&self) -> &'static str {
            "queued"
        }
    }

    fn queued_executor(fetcher: Arc<Queued>, fetch_timeout: Duration) -> Arc<ScrapeExecutor> {
        Arc::new(ScrapeExecutor::new(
            FetchStrategies::single(fetcher),
            Arc::new(SelectorExtractor),
            Arc::new(AcceptAll),
            Arc::new(NotificationSink::new()),
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(60),
            },
            fetch_timeout,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_wait_does_not_count_against_fetch_timeout() {
        let fetcher = Queued::new(Duration::from_secs(5), Duration::from_millis(10));
        let outcome = queued_executor(fetcher, Duration::from_secs(1))
            .run(&source(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.is_changed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_all_respects_concurrency_cap() {
        let fetcher = Queued::new(Duration::ZERO, Duration::from_secs(1));
        let sources: Vec<_> = (0..6)
            .map(|i| {
                Arc::new(
                    SourceDescriptor::new(format!("s{}", i), "https://example.com")
                        .with_selector("title", ".t"),
                )
            })
            .collect();

        let results = queued_executor(fetcher.clone(), Duration::from_secs(10))
            .run_all(sources, 2, &CancellationToken::new())
            .await;

        let names: Vec<_> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["s0", "s1", "s2", "s3", "s4", "s5"]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 2);
    }
}
