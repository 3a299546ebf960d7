//! GitHub issues adapter: `issues` webhook events plus REST polling.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::adapters::IssueSource;
use crate::errors::AdapterError;
use crate::issue::{Issue, SourceType, infer_issue_type, infer_priority};
use crate::util::with_retry;

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    action: String,
    issue: Option<ApiIssue>,
    repository: Option<ApiRepository>,
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    /// Present in poll responses; pull requests share the issues endpoint.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiRepository {
    full_name: String,
}

pub struct GithubSource {
    client: reqwest::Client,
    api_base: String,
    /// `owner/name` of the repository to poll.
    repository: String,
    token: Option<String>,
}

impl GithubSource {
    pub fn new(repository: String, token: Option<String>) -> Self {
        Self::with_api_base("https://api.github.com".to_string(), repository, token)
    }

    pub fn with_api_base(api_base: String, repository: String, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
            repository,
            token,
        }
    }

    fn normalize(&self, api: ApiIssue, repository: &str) -> Issue {
        let body = api.body.unwrap_or_default();
        let labels: Vec<String> = api.labels.into_iter().map(|l| l.name).collect();
        let issue_type = infer_issue_type(&api.title, &body, &labels);
        let priority = infer_priority(&api.title, &body, &labels);
        Issue {
            id: api.number.to_string(),
            title: api.title,
            body,
            labels,
            repository: repository.to_string(),
            source_type: SourceType::Github,
            priority,
            issue_type,
            created_at: api.created_at.unwrap_or_else(Utc::now),
            url: api.html_url,
        }
    }

    async fn fetch_open_issues(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ApiIssue>, AdapterError> {
        let mut request = self
            .client
            .get(format!(
                "{}/repos/{}/issues?state=open&sort=created&direction=asc",
                self.api_base, self.repository
            ))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "triage");
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| AdapterError::PollFailed {
            source_type: SourceType::Github,
            message: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(AdapterError::PollFailed {
                source_type: SourceType::Github,
                message: format!("status {}", response.status()),
            });
        }
        response.json().await.map_err(|e| AdapterError::PollFailed {
            source_type: SourceType::Github,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl IssueSource for GithubSource {
    fn source_type(&self) -> SourceType {
        SourceType::Github
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<Vec<Issue>, AdapterError> {
        let payload: WebhookPayload =
            serde_json::from_slice(body).map_err(|e| AdapterError::MalformedPayload {
                source_type: SourceType::Github,
                message: e.to_string(),
            })?;
        if payload.action != "opened" && payload.action != "reopened" {
            return Ok(Vec::new());
        }
        let issue = payload.issue.ok_or_else(|| AdapterError::MalformedPayload {
            source_type: SourceType::Github,
            message: "issues event without an issue object".to_string(),
        })?;
        let repository = payload
            .repository
            .map(|r| r.full_name)
            .unwrap_or_else(|| self.repository.clone());
        Ok(vec![self.normalize(issue, &repository)])
    }

    async fn poll(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Issue>, AdapterError> {
        let items = with_retry(3, Duration::from_secs(2), || self.fetch_open_issues(since)).await?;

        let repository = self.repository.clone();
        Ok(items
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .filter(|i| match (since, i.created_at) {
                (Some(since), Some(created)) => created > since,
                _ => true,
            })
            .map(|i| self.normalize(i, &repository))
            .collect())
    }
}
