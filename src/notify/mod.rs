//! Change notification fan-out.
//!
//! A [`NotificationSink`] delivers each event to every configured channel
//! concurrently. One channel failing never blocks or cancels the others;
//! failures are logged and returned in the [`DeliveryReport`].

mod backend;
mod log;
mod webhook;

pub use backend::NotifyBackend;
pub use log::LogBackend;
pub use webhook::WebhookBackend;

use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::config::NotificationSettings;
use crate::models::{ChangeEvent, ReportSummary};

/// Per-channel delivery result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub channel: String,
    pub error: Option<String>,
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub outcomes: Vec<ChannelOutcome>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_none()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ChannelOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }
}

/// Named set of notification channels.
#[derive(Default)]
pub struct NotificationSink {
    channels: Vec<(String, Box<dyn NotifyBackend>)>,
}

impl NotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, name: impl Into<String>, backend: Box<dyn NotifyBackend>) -> Self {
        self.channels.push((name.into(), backend));
        self
    }

    /// Build the channels enabled in configuration.
    pub fn from_settings(settings: &NotificationSettings, timeout: Duration) -> anyhow::Result<Self> {
        let mut sink = Self::new();

        if settings.log {
            sink = sink.with_channel("log", Box::new(LogBackend));
        }

        if settings.webhook.enabled {
            match settings.webhook.url.as_deref().map(str::trim) {
                Some(url) if !url.is_empty() => {
                    sink = sink.with_channel(
                        "webhook",
                        Box::new(WebhookBackend::new(url.to_string(), timeout)?),
                    );
                }
                _ => warn!("Webhook notifications enabled without a url; channel skipped"),
            }
        }

        if settings.email.enabled {
            warn!("Email notifications are not supported by this build; channel skipped");
        }

        Ok(sink)
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Deliver a change event to every channel.
    pub async fn deliver(&self, event: &ChangeEvent) -> DeliveryReport {
        let sends = self.channels.iter().map(|(name, backend)| async move {
            let result = backend.send(event).await;
            if let Err(ref e) = result {
                warn!(
                    error = %e,
                    channel = %name,
                    source = %event.record.source_id,
                    "Failed to deliver change notification"
                );
            }
            ChannelOutcome {
                channel: name.clone(),
                error: result.err().map(|e| e.to_string()),
            }
        });

        let report = DeliveryReport {
            outcomes: join_all(sends).await,
        };
        debug!(
            delivered = report.delivered(),
            channels = report.outcomes.len(),
            "Change notification fan-out complete"
        );
        report
    }

    /// Deliver a report summary to every channel.
    pub async fn deliver_digest(&self, summary: &ReportSummary) -> DeliveryReport {
        let sends = self.channels.iter().map(|(name, backend)| async move {
            let result = backend.send_digest(summary).await;
            if let Err(ref e) = result {
                warn!(error = %e, channel = %name, "Failed to deliver report digest");
            }
            ChannelOutcome {
                channel: name.clone(),
                error: result.err().map(|e| e.to_string()),
            }
        });

        DeliveryReport {
            outcomes: join_all(sends).await,
        }
    }
}
