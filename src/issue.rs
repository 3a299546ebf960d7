//! Canonical issue model.
//!
//! Every source adapter normalizes its provider-specific payload into an
//! [`Issue`]. Issues are immutable once ingested; downstream components
//! (assessor, rule engine, executors) only ever read them.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an issue was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Github,
    Sentry,
    Monitoring,
    Jira,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Sentry => "sentry",
            Self::Monitoring => "monitoring",
            Self::Jira => "jira",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(Self::Github),
            "sentry" => Ok(Self::Sentry),
            "monitoring" => Ok(Self::Monitoring),
            "jira" => Ok(Self::Jira),
            _ => Err(format!("Invalid source type: {}", s)),
        }
    }
}

/// Issue priority, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Broad classification of what kind of work an issue asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Bug,
    Feature,
    Documentation,
    Testing,
    General,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Documentation => "documentation",
            Self::Testing => "testing",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "documentation" => Ok(Self::Documentation),
            "testing" => Ok(Self::Testing),
            "general" => Ok(Self::General),
            _ => Err(format!("Invalid issue type: {}", s)),
        }
    }
}

/// Source-agnostic normalized representation of a reported problem or request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Opaque source-scoped identifier.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub repository: String,
    pub source_type: SourceType,
    pub priority: Priority,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub url: String,
}

impl Issue {
    /// Dedup key for at-least-once delivery: the same provider event must
    /// never create a second job.
    pub fn event_key(&self) -> (SourceType, String) {
        (self.source_type, self.id.clone())
    }

    /// Title and body joined, lowercased — the common input for keyword and
    /// pattern heuristics.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.body).to_lowercase()
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }
}

/// Infer an issue type from labels and text when the source does not say.
pub fn infer_issue_type(title: &str, body: &str, labels: &[String]) -> IssueType {
    let has = |name: &str| labels.iter().any(|l| l.eq_ignore_ascii_case(name));
    if has("bug") {
        return IssueType::Bug;
    }
    if has("documentation") || has("docs") {
        return IssueType::Documentation;
    }
    if has("enhancement") || has("feature") {
        return IssueType::Feature;
    }
    if has("testing") || has("tests") {
        return IssueType::Testing;
    }

    let text = format!("{} {}", title, body).to_lowercase();
    if text.contains("error") || text.contains("crash") || text.contains("broken") || text.contains("fix") {
        IssueType::Bug
    } else if text.contains("test") || text.contains("coverage") {
        IssueType::Testing
    } else if text.contains("document") || text.contains("readme") {
        IssueType::Documentation
    } else if text.contains("add") || text.contains("implement") || text.contains("support") {
        IssueType::Feature
    } else {
        IssueType::General
    }
}

/// Infer a priority from labels and severity vocabulary when absent.
pub fn infer_priority(title: &str, body: &str, labels: &[String]) -> Priority {
    let has = |name: &str| labels.iter().any(|l| l.eq_ignore_ascii_case(name));
    if has("critical") || has("p0") {
        return Priority::Critical;
    }
    if has("high") || has("p1") {
        return Priority::High;
    }
    if has("low") || has("p3") {
        return Priority::Low;
    }

    let text = format!("{} {}", title, body).to_lowercase();
    if text.contains("outage") || text.contains("data loss") || text.contains("urgent") {
        Priority::Critical
    } else if text.contains("production") || text.contains("regression") {
        Priority::High
    } else {
        Priority::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_issue() -> Issue {
        Issue {
            id: "42".to_string(),
            title: "Fix typo in README".to_string(),
            body: String::new(),
            labels: vec![],
            repository: "acme/widgets".to_string(),
            source_type: SourceType::Github,
            priority: Priority::Medium,
            issue_type: IssueType::Documentation,
            created_at: Utc::now(),
            url: "https://github.com/acme/widgets/issues/42".to_string(),
        }
    }

    #[test]
    fn test_source_type_roundtrip() {
        for s in &["github", "sentry", "monitoring", "jira"] {
            let parsed: SourceType = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_priority_roundtrip_and_ordering() {
        for s in &["low", "medium", "high", "critical"] {
            let parsed: Priority = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn test_issue_type_roundtrip() {
        for s in &["bug", "feature", "documentation", "testing", "general"] {
            let parsed: IssueType = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<IssueType>().is_err());
    }

    #[test]
    fn test_serde_produces_lowercase_strings() {
        assert_eq!(
            serde_json::to_string(&SourceType::Github).unwrap(),
            "\"github\""
        );
        assert_eq!(
            serde_json::to_string(&Priority::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(serde_json::to_string(&IssueType::Bug).unwrap(), "\"bug\"");
    }

    #[test]
    fn test_event_key_is_source_scoped() {
        let a = sample_issue();
        let mut b = sample_issue();
        b.source_type = SourceType::Sentry;
        assert_ne!(a.event_key(), b.event_key());
    }

    #[test]
    fn test_infer_issue_type_from_labels_beats_text() {
        let t = infer_issue_type(
            "Add integration tests",
            "",
            &["bug".to_string()],
        );
        assert_eq!(t, IssueType::Bug);
    }

    #[test]
    fn test_infer_issue_type_from_text() {
        assert_eq!(infer_issue_type("App crashes on startup", "", &[]), IssueType::Bug);
        assert_eq!(infer_issue_type("Update README", "", &[]), IssueType::Documentation);
        assert_eq!(infer_issue_type("Add dark mode support", "", &[]), IssueType::Feature);
    }

    #[test]
    fn test_infer_priority_defaults_to_medium() {
        assert_eq!(infer_priority("Tweak spacing", "", &[]), Priority::Medium);
        assert_eq!(
            infer_priority("Site outage", "", &[]),
            Priority::Critical
        );
        assert_eq!(
            infer_priority("x", "", &["p1".to_string()]),
            Priority::High
        );
    }

    #[test]
    fn test_issue_json_uses_type_field_name() {
        let json = serde_json::to_value(sample_issue()).unwrap();
        assert_eq!(json["type"], "documentation");
        assert_eq!(json["source_type"], "github");
    }
}
