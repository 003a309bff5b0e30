//! Periodic reports over recently stored records.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Local, Utc};
use serde_json::json;
use tracing::info;

use crate::models::{ReportSummary, StoredRecord};
use crate::notify::NotificationSink;
use crate::repository::ResultStore;

/// Turns a window of records into a report artifact and its summary.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(
        &self,
        records: &[StoredRecord],
        window: Duration,
    ) -> anyhow::Result<ReportSummary>;
}

/// Writes `scraping_report_<timestamp>[_partN].json` files, each holding at
/// most `max_records_per_file` records and the window summary.
pub struct JsonReportWriter {
    output_dir: PathBuf,
    max_records_per_file: usize,
}

impl JsonReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>, max_records_per_file: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_records_per_file: max_records_per_file.max(1),
        }
    }
}

#[async_trait]
impl ReportGenerator for JsonReportWriter {
    async fn generate(
        &self,
        records: &[StoredRecord],
        window: Duration,
    ) -> anyhow::Result<ReportSummary> {
        let window_hours = window.as_secs() / 3600;
        let mut summary = ReportSummary::from_records(records, window_hours, Utc::now());
        if records.is_empty() {
            return Ok(summary);
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("creating report dir {}", self.output_dir.display()))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let chunks: Vec<&[StoredRecord]> = records.chunks(self.max_records_per_file).collect();
        let parts = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let file_name = if parts == 1 {
                format!("scraping_report_{}.json", stamp)
            } else {
                format!("scraping_report_{}_part{}.json", stamp, index + 1)
            };
            let path = self.output_dir.join(file_name);

            let document = json!({
                "part": index + 1,
                "parts": parts,
                "summary": &summary,
                "records": chunk,
            });
            let rendered = serde_json::to_vec_pretty(&document)?;
            tokio::fs::write(&path, rendered)
                .await
                .with_context(|| format!("writing report {}", path.display()))?;

            info!(path = %path.display(), records = chunk.len(), "Wrote report file");
            summary.files.push(path);
        }

        Ok(summary)
    }
}

/// Pulls the recent window from the store, generates a report and sends the
/// digest to every channel.
pub struct Reporter {
    store: Arc<dyn ResultStore>,
    generator: Arc<dyn ReportGenerator>,
    notifier: Arc<NotificationSink>,
    window: Duration,
}

impl Reporter {
    pub fn new(
        store: Arc<dyn ResultStore>,
        generator: Arc<dyn ReportGenerator>,
        notifier: Arc<NotificationSink>,
        window: Duration,
    ) -> Self {
        Self {
            store,
            generator,
            notifier,
            window,
        }
    }

    /// Generate a report over the configured window. Returns `None` when
    /// the window holds no records.
    pub async fn run(&self) -> anyhow::Result<Option<ReportSummary>> {
        self.run_window(self.window).await
    }

    /// Generate a report over an explicit window.
    pub async fn run_window(&self, window: Duration) -> anyhow::Result<Option<ReportSummary>> {
        let records = self
            .store
            .recent_records(window)
            .await
            .context("loading recent records")?;

        if records.is_empty() {
            info!(
                window_hours = window.as_secs() / 3600,
                "No records in report window, skipping report"
            );
            return Ok(None);
        }

        let summary = self.generator.generate(&records, window).await?;
        self.notifier.deliver_digest(&summary).await;
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fingerprint, Record};
    use tempfile::tempdir;

    fn stored(id: i64, source: &str) -> StoredRecord {
        let now = Utc::now();
        StoredRecord {
            id,
            record: Record {
                source_id: source.to_string(),
                url: "https://example.com".to_string(),
                fields: Default::default(),
                captured_at: now,
                fingerprint: Fingerprint::from_hex(format!("{:032x}", id)),
            },
            stored_at: now,
        }
    }

    #[tokio::test]
    async fn test_writes_chunked_files() {
        let dir = tempdir().unwrap();
        let writer = JsonReportWriter::new(dir.path().join("reports"), 2);
        let records: Vec<_> = (1..=5).map(|i| stored(i, "news")).collect();

        let summary = writer
            .generate(&records, Duration::from_secs(24 * 3600))
            .await
            .unwrap();

        assert_eq!(summary.total_records, 5);
        assert_eq!(summary.window_hours, 24);
        assert_eq!(summary.files.len(), 3);
        assert!(summary.files[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_part1.json"));

        let last: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&summary.files[2]).unwrap()).unwrap();
        assert_eq!(last["records"].as_array().unwrap().len(), 1);
        assert_eq!(last["summary"]["total_records"], 5);
    }

    #[tokio::test]
    async fn test_empty_window_writes_nothing() {
        let dir = tempdir().unwrap();
        let writer = JsonReportWriter::new(dir.path(), 100);

        let summary = writer.generate(&[], Duration::from_secs(3600)).await.unwrap();
        assert!(summary.files.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
