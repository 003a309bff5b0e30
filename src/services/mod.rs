//! Orchestration: cadences, the scheduler, the per-source executor and
//! reporting.

pub mod cadence;
pub mod executor;
pub mod report;
pub mod scheduler;

pub use cadence::{Cadence, CadenceError};
pub use executor::{ExecutionError, FetchStrategies, RetryPolicy, ScrapeExecutor, ScrapeOutcome};
pub use report::{JsonReportWriter, ReportGenerator, Reporter};
pub use scheduler::{Dispatch, JobTarget, ScheduleEntry, Scheduler, SchedulerConfig};

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::notify::NotificationSink;
use crate::repository::{AsyncSqlitePool, DieselRecordRepository};
use crate::scrapers::{
    BrowserFetcher, HttpClient, RateLimitConfig, RateLimiter, SelectorExtractor,
};

/// Everything a command needs, built from configuration.
pub struct Pipeline {
    pub repository: DieselRecordRepository,
    pub notifier: Arc<NotificationSink>,
    pub executor: Arc<ScrapeExecutor>,
    pub reporter: Arc<Reporter>,
    /// Shared with the HTTP strategy; read for per-host statistics.
    pub rate_limiter: RateLimiter,
}

impl Pipeline {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db_path = config.database_path();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating data dir {}", parent.display()))?;
        }

        let repository = DieselRecordRepository::new(AsyncSqlitePool::from_path(&db_path));
        repository
            .init_schema()
            .await
            .with_context(|| format!("initializing database {}", db_path.display()))?;
        info!(path = %db_path.display(), "Database ready");

        let general = &config.general_settings;
        let rate_limiter = RateLimiter::new(RateLimitConfig::with_base_delay(config.request_delay()));
        let http = HttpClient::new(
            Some(&general.user_agent),
            config.fetch_timeout(),
            rate_limiter.clone(),
        )
            .context("building HTTP client")?;
        let browser = BrowserFetcher::new(
            general.browser.clone(),
            crate::scrapers::resolve_user_agent(Some(&general.user_agent)),
        );
        let fetchers = FetchStrategies {
            http: Arc::new(http),
            browser: Arc::new(browser),
        };

        let notifier = Arc::new(
            NotificationSink::from_settings(&config.notifications, config.fetch_timeout())
                .context("building notification channels")?,
        );
        let store = Arc::new(repository.clone());

        let executor = Arc::new(ScrapeExecutor::new(
            fetchers,
            Arc::new(SelectorExtractor),
            store.clone(),
            notifier.clone(),
            config.retry_policy(),
            config.fetch_timeout(),
        ));

        let export = &config.export_settings;
        let reporter = Arc::new(Reporter::new(
            store,
            Arc::new(JsonReportWriter::new(
                config.report_dir(),
                export.max_records_per_file,
            )),
            notifier.clone(),
            config.report_window(),
        ));

        Ok(Self {
            repository,
            notifier,
            executor,
            reporter,
            rate_limiter,
        })
    }

    /// Scheduler settings derived from configuration.
    pub fn scheduler_config(config: &Config) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: config.tick_interval(),
            global_cadence: config.global_cadence(),
            report_cadence: config.report_cadence(),
            max_concurrent: config.general_settings.max_workers,
            shutdown_grace: config.shutdown_grace(),
        }
    }
}
