//! Monitoring adapter: Alertmanager-style webhook batches. Webhook-only —
//! alerting systems push, so polling is a successful no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::adapters::IssueSource;
use crate::errors::AdapterError;
use crate::issue::{Issue, IssueType, Priority, SourceType};

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    alerts: Vec<Alert>,
}

#[derive(Debug, Deserialize)]
struct Alert {
    status: String,
    #[serde(default)]
    fingerprint: Option<String>,
    #[serde(default)]
    labels: AlertLabels,
    #[serde(default)]
    annotations: AlertAnnotations,
    #[serde(default, rename = "startsAt")]
    starts_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "generatorURL")]
    generator_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct AlertLabels {
    #[serde(default)]
    alertname: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    service: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AlertAnnotations {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

fn priority_from_severity(severity: Option<&str>) -> Priority {
    match severity {
        Some("critical" | "page") => Priority::Critical,
        Some("high" | "error") => Priority::High,
        Some("warning") => Priority::Medium,
        _ => Priority::Low,
    }
}

#[derive(Default)]
pub struct MonitoringSource;

impl MonitoringSource {
    pub fn new() -> Self {
        Self
    }

    fn normalize(&self, alert: Alert) -> Issue {
        let severity = alert.labels.severity.clone();
        let mut labels = vec!["monitoring".to_string()];
        if let Some(severity) = &severity {
            labels.push(format!("severity:{severity}"));
        }
        let id = alert
            .fingerprint
            .unwrap_or_else(|| alert.labels.alertname.clone());
        let title = alert
            .annotations
            .summary
            .unwrap_or_else(|| alert.labels.alertname.clone());
        Issue {
            id,
            title,
            body: alert.annotations.description.unwrap_or_default(),
            labels,
            repository: alert.labels.service.unwrap_or_else(|| "unknown".to_string()),
            source_type: SourceType::Monitoring,
            priority: priority_from_severity(severity.as_deref()),
            issue_type: IssueType::Bug,
            created_at: alert.starts_at.unwrap_or_else(Utc::now),
            url: alert.generator_url,
        }
    }
}

#[async_trait]
impl IssueSource for MonitoringSource {
    fn source_type(&self) -> SourceType {
        SourceType::Monitoring
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<Vec<Issue>, AdapterError> {
        let payload: WebhookPayload =
            serde_json::from_slice(body).map_err(|e| AdapterError::MalformedPayload {
                source_type: SourceType::Monitoring,
                message: e.to_string(),
            })?;
        Ok(payload
            .alerts
            .into_iter()
            .filter(|a| a.status == "firing")
            .map(|a| self.normalize(a))
            .collect())
    }

    async fn poll(&self, _since: Option<DateTime<Utc>>) -> Result<Vec<Issue>, AdapterError> {
        Ok(Vec::new())
    }
}
