//! Sentry adapter: issue-alert webhooks plus REST polling of unresolved
//! issues. Everything from Sentry is a bug by definition; priority maps
//! from the event level.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::adapters::IssueSource;
use crate::errors::AdapterError;
use crate::issue::{Issue, IssueType, Priority, SourceType};
use crate::util::with_retry;

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    action: Option<String>,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    issue: ApiIssue,
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    id: String,
    title: String,
    #[serde(default)]
    culprit: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default, rename = "firstSeen")]
    first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    project: Option<ApiProject>,
}

#[derive(Debug, Deserialize)]
struct ApiProject {
    slug: String,
}

fn priority_from_level(level: Option<&str>) -> Priority {
    match level {
        Some("fatal") => Priority::Critical,
        Some("error") => Priority::High,
        Some("warning") => Priority::Medium,
        _ => Priority::Low,
    }
}

pub struct SentrySource {
    client: reqwest::Client,
    api_base: String,
    organization: String,
    project: String,
    token: Option<String>,
}

impl SentrySource {
    pub fn new(organization: String, project: String, token: Option<String>) -> Self {
        Self::with_api_base(
            "https://sentry.io/api/0".to_string(),
            organization,
            project,
            token,
        )
    }

    pub fn with_api_base(
        api_base: String,
        organization: String,
        project: String,
        token: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
            organization,
            project,
            token,
        }
    }

    fn normalize(&self, api: ApiIssue) -> Issue {
        let level = api.level.as_deref().map(str::to_string);
        let mut labels = vec!["sentry".to_string()];
        if let Some(level) = &level {
            labels.push(format!("level:{level}"));
        }
        let repository = api
            .project
            .map(|p| p.slug)
            .unwrap_or_else(|| self.project.clone());
        Issue {
            id: api.id,
            title: api.title,
            body: api
                .culprit
                .map(|c| format!("Culprit: {c}"))
                .unwrap_or_default(),
            labels,
            repository,
            source_type: SourceType::Sentry,
            priority: priority_from_level(level.as_deref()),
            issue_type: IssueType::Bug,
            created_at: api.first_seen.unwrap_or_else(Utc::now),
            url: api.permalink.unwrap_or_default(),
        }
    }

    async fn fetch_unresolved(&self) -> Result<Vec<ApiIssue>, AdapterError> {
        let mut request = self
            .client
            .get(format!(
                "{}/projects/{}/{}/issues/?query=is:unresolved",
                self.api_base, self.organization, self.project
            ))
            .header("User-Agent", "triage");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| AdapterError::PollFailed {
            source_type: SourceType::Sentry,
            message: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(AdapterError::PollFailed {
                source_type: SourceType::Sentry,
                message: format!("status {}", response.status()),
            });
        }
        response.json().await.map_err(|e| AdapterError::PollFailed {
            source_type: SourceType::Sentry,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl IssueSource for SentrySource {
    fn source_type(&self) -> SourceType {
        SourceType::Sentry
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<Vec<Issue>, AdapterError> {
        let payload: WebhookPayload =
            serde_json::from_slice(body).map_err(|e| AdapterError::MalformedPayload {
                source_type: SourceType::Sentry,
                message: e.to_string(),
            })?;
        // Only newly created issues dispatch; resolve/ignore actions do not.
        if payload.action.as_deref().is_some_and(|a| a != "created") {
            return Ok(Vec::new());
        }
        Ok(vec![self.normalize(payload.data.issue)])
    }

    async fn poll(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Issue>, AdapterError> {
        let items = with_retry(3, Duration::from_secs(2), || self.fetch_unresolved()).await?;
        Ok(items
            .into_iter()
            .filter(|i| match (since, i.first_seen) {
                (Some(since), Some(seen)) => seen > since,
                _ => true,
            })
            .map(|i| self.normalize(i))
            .collect())
    }
}
