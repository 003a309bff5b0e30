use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::backend::NotifyBackend;
use crate::models::{ChangeEvent, ReportSummary};

/// HTTP webhook channel posting JSON payloads.
pub struct WebhookBackend {
    url: String,
    http: reqwest::Client,
}

impl WebhookBackend {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, http })
    }

    async fn post(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let resp = self.http.post(&self.url).json(&payload).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Webhook returned non-success");
            anyhow::bail!("webhook returned {status}");
        }

        Ok(())
    }
}

#[async_trait]
impl NotifyBackend for WebhookBackend {
    async fn send(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        let record = &event.record;
        let payload = json!({
            "type": "new_data",
            "website": record.source_id,
            "title": record.field("title"),
            "url": record.url,
            "timestamp": record.captured_at.to_rfc3339(),
            "fingerprint": record.fingerprint,
            "change": event.kind.as_str(),
            "fields": record.fields,
        });

        self.post(payload).await
    }

    async fn send_digest(&self, summary: &ReportSummary) -> anyhow::Result<()> {
        let payload = json!({
            "type": "report",
            "generated_at": summary.generated_at.to_rfc3339(),
            "window_hours": summary.window_hours,
            "total_records": summary.total_records,
            "sources": summary.sources,
            "hourly": summary.hourly_utc,
        });

        self.post(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fingerprint, Record};
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event() -> ChangeEvent {
        let record = Record {
            source_id: "example_news".to_string(),
            url: "https://example.com/news".to_string(),
            fields: [("title".to_string(), "Headline".to_string())]
                .into_iter()
                .collect(),
            captured_at: Utc::now(),
            fingerprint: Fingerprint::from_hex("00ff"),
        };
        ChangeEvent::new(1, record, None)
    }

    #[tokio::test]
    async fn test_posts_new_data_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({
                "type": "new_data",
                "website": "example_news",
                "title": "Headline",
                "url": "https://example.com/news",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let hook =
            WebhookBackend::new(format!("{}/hook", server.uri()), Duration::from_secs(5)).unwrap();
        hook.send(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let hook = WebhookBackend::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert!(hook.send(&event()).await.is_err());
    }
}
