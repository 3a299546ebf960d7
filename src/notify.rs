//! Outbound notifications: approval requests, operator alerts, human
//! assignments, and issue-outcome summaries.
//!
//! The sink is a narrow seam — a chat webhook in production, a tracing
//! logger when none is configured, and a recording stub in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

/// One outbound message.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Fallback sink: structured log lines only.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            subject = %notification.subject,
            body = %notification.body,
            "notification"
        );
        Ok(())
    }
}

/// Posts notifications as JSON to a chat webhook URL. Transient delivery
/// failures are retried a few times before giving up.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    async fn post_once(&self, payload: &serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .context("Failed to post notification")?;
        response
            .error_for_status()
            .context("Notification webhook rejected the message")?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let payload = serde_json::json!({
            "text": format!("*{}*\n{}", notification.subject, notification.body),
        });
        crate::util::with_retry(3, std::time::Duration::from_millis(500), || {
            self.post_once(&payload)
        })
        .await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[tokio::test]
    async fn test_log_sink_never_fails() {
        let sink = LogSink;
        let n = Notification {
            subject: "s".to_string(),
            body: "b".to_string(),
        };
        assert!(sink.send(&n).await.is_ok());
    }

    #[tokio::test]
    async fn test_recording_sink_captures_in_order() {
        let sink = RecordingSink::default();
        for i in 0..3 {
            sink.send(&Notification {
                subject: format!("s{i}"),
                body: String::new(),
            })
            .await
            .unwrap();
        }
        let sent = sink.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2].subject, "s2");
    }
}
