use async_trait::async_trait;
use tracing::info;

use super::backend::NotifyBackend;
use crate::models::{ChangeEvent, ReportSummary};

/// Channel that writes notifications to the log.
pub struct LogBackend;

#[async_trait]
impl NotifyBackend for LogBackend {
    async fn send(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        info!(
            source = %event.record.source_id,
            change = event.kind.as_str(),
            fingerprint = %event.record.fingerprint,
            title = %event.record.field("title"),
            "New data detected"
        );
        Ok(())
    }

    async fn send_digest(&self, summary: &ReportSummary) -> anyhow::Result<()> {
        info!(
            total = summary.total_records,
            sources = summary.sources.len(),
            window_hours = summary.window_hours,
            "Report generated"
        );
        for stats in &summary.sources {
            info!(source = %stats.source_id, records = stats.records, "Report source");
        }
        Ok(())
    }
}
