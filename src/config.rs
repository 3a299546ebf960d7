//! Unified configuration for the dispatch pipeline.
//!
//! Configuration is read once at startup from `triage.toml`, layered with
//! environment variables for secrets, and then passed by shared reference
//! into every component. There is no global mutable config object.
//!
//! # Configuration File Format
//!
//! ```toml
//! [dispatch]
//! max_concurrent_jobs = 3
//! poll_interval_secs = 5
//! approval_timeout_secs = 1800
//! step_timeout_secs = 600
//!
//! [sources]
//! failure_threshold = 5
//!
//! [server]
//! port = 3940
//!
//! [audit]
//! dir = ".triage/audit"
//!
//! [scoring.complexity]
//! text_complexity = 0.2
//! technical_depth = 0.4
//! scope_size = 0.3
//! dependencies = 0.1
//!
//! [scoring.confidence]
//! pattern_match = 0.3
//! similarity = 0.3
//! capability_match = 0.3
//! context_available = 0.1
//! ```
//!
//! The webhook secret and notification webhook URL come from the
//! environment (`TRIAGE_WEBHOOK_SECRET`, `TRIAGE_NOTIFY_URL`), loaded via
//! dotenvy so a local `.env` file works in development.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Weights for the complexity axis. Tunable, not load-bearing constants;
/// normalized before use so any positive values are acceptable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityWeights {
    pub text_complexity: f64,
    pub technical_depth: f64,
    pub scope_size: f64,
    pub dependencies: f64,
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            text_complexity: 0.2,
            technical_depth: 0.4,
            scope_size: 0.3,
            dependencies: 0.1,
        }
    }
}

impl ComplexityWeights {
    pub fn normalized(&self) -> Self {
        let sum = self.text_complexity + self.technical_depth + self.scope_size + self.dependencies;
        if sum <= 0.0 {
            return Self::default();
        }
        Self {
            text_complexity: self.text_complexity / sum,
            technical_depth: self.technical_depth / sum,
            scope_size: self.scope_size / sum,
            dependencies: self.dependencies / sum,
        }
    }
}

/// Weights for the confidence axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub pattern_match: f64,
    pub similarity: f64,
    pub capability_match: f64,
    pub context_available: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            pattern_match: 0.3,
            similarity: 0.3,
            capability_match: 0.3,
            context_available: 0.1,
        }
    }
}

impl ConfidenceWeights {
    pub fn normalized(&self) -> Self {
        let sum =
            self.pattern_match + self.similarity + self.capability_match + self.context_available;
        if sum <= 0.0 {
            return Self::default();
        }
        Self {
            pattern_match: self.pattern_match / sum,
            similarity: self.similarity / sum,
            capability_match: self.capability_match / sum,
            context_available: self.context_available / sum,
        }
    }
}

/// Weights for the risk axis, mirroring the complexity approach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    pub severity_keywords: f64,
    pub sensitive_labels: f64,
    pub missing_tests: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            severity_keywords: 0.4,
            sensitive_labels: 0.4,
            missing_tests: 0.2,
        }
    }
}

impl RiskWeights {
    pub fn normalized(&self) -> Self {
        let sum = self.severity_keywords + self.sensitive_labels + self.missing_tests;
        if sum <= 0.0 {
            return Self::default();
        }
        Self {
            severity_keywords: self.severity_keywords / sum,
            sensitive_labels: self.sensitive_labels / sum,
            missing_tests: self.missing_tests / sum,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub complexity: ComplexityWeights,
    #[serde(default)]
    pub confidence: ConfidenceWeights,
    #[serde(default)]
    pub risk: RiskWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_secs: u64,
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,
}

fn default_max_concurrent() -> usize {
    3
}
fn default_poll_interval() -> u64 {
    5
}
fn default_approval_timeout() -> u64 {
    1800
}
fn default_step_timeout() -> u64 {
    600
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent(),
            poll_interval_secs: default_poll_interval(),
            approval_timeout_secs: default_approval_timeout(),
            step_timeout_secs: default_step_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Consecutive poll failures before a source is disabled.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// `owner/name` of the GitHub repository to poll; the GitHub adapter is
    /// registered only when set.
    #[serde(default)]
    pub github_repo: Option<String>,
    /// Sentry organization + project slugs; the Sentry adapter is registered
    /// only when both are set.
    #[serde(default)]
    pub sentry_org: Option<String>,
    #[serde(default)]
    pub sentry_project: Option<String>,
}

fn default_failure_threshold() -> u32 {
    5
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            github_repo: None,
            sentry_org: None,
            sentry_project: None,
        }
    }
}

/// Shell commands backing plan steps, keyed by step kind name
/// (`analyze`, `fix`, `run_tests`, ...). Steps without a command are
/// simulated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecConfig {
    #[serde(default)]
    pub commands: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3940
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_dir")]
    pub dir: PathBuf,
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from(".triage/audit")
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            dir: default_audit_dir(),
        }
    }
}

/// Immutable runtime configuration, constructed once at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub exec: ExecConfig,
    /// Shared secret for webhook HMAC verification. Env-only, never in the
    /// config file.
    #[serde(skip)]
    pub webhook_secret: Option<String>,
    /// Outbound notification webhook URL. Env-only.
    #[serde(skip)]
    pub notify_url: Option<String>,
}

impl TriageConfig {
    /// Load from `triage.toml` in the given directory, falling back to
    /// defaults when the file is absent, then layer env vars on top.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join("triage.toml");
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        dotenvy::dotenv().ok();
        if let Ok(secret) = std::env::var("TRIAGE_WEBHOOK_SECRET") {
            if !secret.is_empty() {
                self.webhook_secret = Some(secret);
            }
        }
        if let Ok(url) = std::env::var("TRIAGE_NOTIFY_URL") {
            if !url.is_empty() {
                self.notify_url = Some(url);
            }
        }
    }

    pub fn approval_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dispatch.approval_timeout_secs)
    }

    pub fn step_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dispatch.step_timeout_secs)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dispatch.poll_interval_secs)
    }
}
