//! Timer-driven scheduler.
//!
//! One tick loop owns every [`ScheduleEntry`]. On each tick it collects
//! the due entries, advances them from the tick time, and spawns one task
//! per due source. Executions never touch scheduler state; they only see
//! the source snapshot they were dispatched with.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cadence::Cadence;
use super::executor::{ExecutionError, ScrapeExecutor, ScrapeOutcome};
use super::report::Reporter;
use crate::models::SourceDescriptor;

/// What a schedule entry triggers.
#[derive(Debug, Clone)]
pub enum JobTarget {
    Source(Arc<SourceDescriptor>),
    /// Re-scan of every enabled source.
    AllSources,
    Report,
}

#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub label: String,
    pub target: JobTarget,
    pub cadence: Cadence,
    pub next_due: DateTime<Utc>,
}

/// Work produced by one tick.
#[derive(Debug, Clone)]
pub enum Dispatch {
    Scrape(Arc<SourceDescriptor>),
    Report,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub global_cadence: Option<Cadence>,
    pub report_cadence: Option<Cadence>,
    /// Cap on concurrently running executions.
    pub max_concurrent: usize,
    /// How long shutdown waits for in-flight work.
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            global_cadence: Some(Cadence::Every(30)),
            report_cadence: Some(Cadence::daily()),
            max_concurrent: 5,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

pub struct Scheduler {
    entries: Vec<ScheduleEntry>,
    sources: Vec<Arc<SourceDescriptor>>,
    config: SchedulerConfig,
    running: HashMap<String, JoinHandle<()>>,
    report_task: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Build entries for every enabled source with a valid cadence, plus the
    /// global re-scan and report entries when configured.
    pub fn start(sources: Vec<SourceDescriptor>, config: SchedulerConfig, now: DateTime<Utc>) -> Self {
        let sources: Vec<Arc<SourceDescriptor>> = sources
            .into_iter()
            .filter(|s| s.enabled)
            .map(Arc::new)
            .collect();

        let mut entries = Vec::new();
        for source in &sources {
            let Some(ref schedule) = source.schedule else {
                continue;
            };
            match schedule.parse::<Cadence>() {
                Ok(cadence) => entries.push(ScheduleEntry {
                    label: source.name.clone(),
                    target: JobTarget::Source(source.clone()),
                    next_due: cadence.initial_due(now),
                    cadence,
                }),
                Err(e) => warn!(
                    source = %source.name,
                    error = %e,
                    "Skipping own schedule for source; global re-scan still applies"
                ),
            }
        }

        if let Some(cadence) = config.global_cadence {
            entries.push(ScheduleEntry {
                label: "global".to_string(),
                target: JobTarget::AllSources,
                next_due: cadence.initial_due(now),
                cadence,
            });
        }

        if let Some(cadence) = config.report_cadence {
            entries.push(ScheduleEntry {
                label: "report".to_string(),
                target: JobTarget::Report,
                next_due: cadence.next_after(now),
                cadence,
            });
        }

        info!(
            sources = sources.len(),
            entries = entries.len(),
            "Scheduler started"
        );

        Self {
            entries,
            sources,
            config,
            running: HashMap::new(),
            report_task: None,
        }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Earliest upcoming due time.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|e| e.next_due).min()
    }

    fn is_busy(&self, source: &str) -> bool {
        self.running
            .get(source)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn report_busy(&self) -> bool {
        self.report_task
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Collect work due at `now` and advance every due entry.
    ///
    /// An entry counts as due when it falls before the midpoint to the next
    /// tick, so a tick waking slightly early still fires it. Entries advance
    /// from their own due time, or from `now` when the tick is late, which
    /// keeps the schedule on its nominal grid.
    ///
    /// A source appears at most once per tick, and not at all while its
    /// previous execution is still running.
    pub fn poll_due(&mut self, now: DateTime<Utc>) -> Vec<Dispatch> {
        let slack = chrono::Duration::from_std(self.config.tick_interval / 2)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let horizon = now + slack;

        let mut due_targets = Vec::new();
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.next_due <= now || e.next_due < horizon)
        {
            entry.next_due = entry.cadence.next_after(now.max(entry.next_due));
            debug!(entry = %entry.label, next_due = %entry.next_due, "Entry due");
            due_targets.push(entry.target.clone());
        }

        let mut seen = HashSet::new();
        let mut dispatches = Vec::new();
        for target in due_targets {
            let candidates = match target {
                JobTarget::Source(source) => vec![source],
                JobTarget::AllSources => self.sources.clone(),
                JobTarget::Report => {
                    if self.report_busy() {
                        debug!("Previous report still running, skipping");
                    } else {
                        dispatches.push(Dispatch::Report);
                    }
                    continue;
                }
            };

            for source in candidates {
                if !seen.insert(source.name.clone()) {
                    continue;
                }
                if self.is_busy(&source.name) {
                    debug!(source = %source.name, "Previous execution still running, skipping");
                    continue;
                }
                dispatches.push(Dispatch::Scrape(source));
            }
        }

        dispatches
    }

    fn reap(&mut self) {
        self.running.retain(|_, handle| !handle.is_finished());
        if self.report_task.as_ref().is_some_and(|h| h.is_finished()) {
            self.report_task = None;
        }
    }

    /// Run the tick loop until `shutdown` fires, then wait up to the grace
    /// period for in-flight work.
    pub async fn run(
        mut self,
        executor: Arc<ScrapeExecutor>,
        reporter: Option<Arc<Reporter>>,
        shutdown: CancellationToken,
    ) {
        if reporter.is_none() {
            self.entries
                .retain(|e| !matches!(e.target, JobTarget::Report));
        }

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.reap();

            for dispatch in self.poll_due(Utc::now()) {
                match dispatch {
                    Dispatch::Scrape(source) => {
                        let name = source.name.clone();
                        let handle = tokio::spawn(execute_source(
                            executor.clone(),
                            source,
                            permits.clone(),
                            shutdown.clone(),
                        ));
                        self.running.insert(name, handle);
                    }
                    Dispatch::Report => {
                        if let Some(ref reporter) = reporter {
                            self.report_task = Some(tokio::spawn(execute_report(reporter.clone())));
                        }
                    }
                }
            }
        }

        self.drain().await;
    }

    async fn drain(&mut self) {
        let handles: Vec<JoinHandle<()>> = self
            .running
            .drain()
            .map(|(_, h)| h)
            .chain(self.report_task.take())
            .collect();
        if handles.is_empty() {
            info!("Scheduler stopped");
            return;
        }

        info!(
            in_flight = handles.len(),
            grace_secs = self.config.shutdown_grace.as_secs(),
            "Waiting for in-flight executions"
        );
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        if tokio::time::timeout(self.config.shutdown_grace, join_all(handles))
            .await
            .is_err()
        {
            warn!("Grace period elapsed, aborting remaining executions");
            for abort in aborts {
                abort.abort();
            }
        }
        info!("Scheduler stopped");
    }
}

async fn execute_source(
    executor: Arc<ScrapeExecutor>,
    source: Arc<SourceDescriptor>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
) {
    let _permit = tokio::select! {
        permit = permits.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return,
        },
        _ = shutdown.cancelled() => {
            debug!(source = %source.name, "Shutdown before execution started");
            return;
        }
    };

    match executor.run(&source, &shutdown).await {
        Ok(ScrapeOutcome::Changed(event)) => {
            debug!(source = %source.name, record_id = event.record_id, "Execution stored new data")
        }
        Ok(ScrapeOutcome::Unchanged { .. }) => debug!(source = %source.name, "Execution found no change"),
        Err(ExecutionError::Cancelled { .. }) => {
            info!(source = %source.name, "Execution cancelled by shutdown")
        }
        Err(e) => warn!(source = %source.name, error = %e, "Execution failed"),
    }
}

async fn execute_report(reporter: Arc<Reporter>) {
    match reporter.run().await {
        Ok(Some(summary)) => info!(
            total = summary.total_records,
            files = summary.files.len(),
            "Report complete"
        ),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Report failed"),
    }
}
