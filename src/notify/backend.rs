use async_trait::async_trait;

use crate::models::{ChangeEvent, ReportSummary};

/// Pluggable notification channel.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    /// Deliver a single change event.
    async fn send(&self, event: &ChangeEvent) -> anyhow::Result<()>;

    /// Deliver the summary of a report window.
    async fn send_digest(&self, summary: &ReportSummary) -> anyhow::Result<()>;
}
