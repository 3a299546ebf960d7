//! Append-only audit trail.
//!
//! Every pipeline decision lands as one JSON line in `events.jsonl` under
//! the audit directory. The log is the system of record: the assessor's
//! outcome history and the `triage audit` CLI both read it back.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened. Serialized snake_case into the JSONL stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Ingested,
    DuplicateSkipped,
    Dispatched,
    ApprovalRequested,
    ApprovalResolved,
    ApprovalTimeout,
    ExecutionStarted,
    StepCompleted,
    JobCompleted,
    JobFailed,
    JobError,
    SourceDisabled,
    OperatorAlert,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Ingested => "ingested",
            AuditKind::DuplicateSkipped => "duplicate_skipped",
            AuditKind::Dispatched => "dispatched",
            AuditKind::ApprovalRequested => "approval_requested",
            AuditKind::ApprovalResolved => "approval_resolved",
            AuditKind::ApprovalTimeout => "approval_timeout",
            AuditKind::ExecutionStarted => "execution_started",
            AuditKind::StepCompleted => "step_completed",
            AuditKind::JobCompleted => "job_completed",
            AuditKind::JobFailed => "job_failed",
            AuditKind::JobError => "job_error",
            AuditKind::SourceDisabled => "source_disabled",
            AuditKind::OperatorAlert => "operator_alert",
        }
    }
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    /// `source/provider_id` of the originating issue, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_ref: Option<String>,
    /// Free-form structured payload (scores, decisions, error text).
    pub detail: serde_json::Value,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, detail: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            job_id: None,
            issue_ref: None,
            detail,
        }
    }

    pub fn for_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn for_issue(mut self, issue_ref: String) -> Self {
        self.issue_ref = Some(issue_ref);
        self
    }
}

/// Append-only JSONL writer. A line is flushed before `append` returns, so
/// a crash loses at most the event being written.
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create audit directory {}", dir.display()))?;
        let path = dir.join("events.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &AuditEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("Failed to serialize audit event")?;
        let mut file = self.file.lock().unwrap();
        writeln!(file, "{line}").context("Failed to append audit event")?;
        file.flush().context("Failed to flush audit log")?;
        Ok(())
    }

    /// Read the whole log back, oldest first. Unparseable lines are skipped
    /// with a warning rather than poisoning the read.
    pub fn read_all(&self) -> Result<Vec<AuditEvent>> {
        Self::read_file(&self.path)
    }

    /// Read an audit log without holding a writer open, for the CLI.
    pub fn read_file(path: &Path) -> Result<Vec<AuditEvent>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path)
            .with_context(|| format!("Failed to read audit log {}", path.display()))?;
        let mut events = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.context("Failed to read audit log line")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(line = n + 1, error = %e, "skipping bad audit line");
                }
            }
        }
        Ok(events)
    }

    /// Events for one job, oldest first.
    pub fn events_for_job(&self, job_id: Uuid) -> Result<Vec<AuditEvent>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.job_id == Some(job_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            AuditKind::Ingested,
            AuditKind::DuplicateSkipped,
            AuditKind::ApprovalTimeout,
            AuditKind::OperatorAlert,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let back: AuditKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn test_append_then_read_all() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        let job_id = Uuid::new_v4();

        log.append(
            &AuditEvent::new(AuditKind::Ingested, serde_json::json!({"title": "Fix typo"}))
                .for_issue("github/42".to_string()),
        )
        .unwrap();
        log.append(
            &AuditEvent::new(AuditKind::Dispatched, serde_json::json!({"executor": "autonomous"}))
                .for_job(job_id),
        )
        .unwrap();

        let events = log.read_all().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, AuditKind::Ingested);
        assert_eq!(events[0].issue_ref.as_deref(), Some("github/42"));
        assert_eq!(events[1].job_id, Some(job_id));
    }

    #[test]
    fn test_reopen_appends_instead_of_truncating() {
        let dir = TempDir::new().unwrap();
        {
            let log = AuditLog::open(dir.path()).unwrap();
            log.append(&AuditEvent::new(AuditKind::Ingested, serde_json::Value::Null))
                .unwrap();
        }
        let log = AuditLog::open(dir.path()).unwrap();
        log.append(&AuditEvent::new(AuditKind::JobCompleted, serde_json::Value::Null))
            .unwrap();
        assert_eq!(log.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        log.append(&AuditEvent::new(AuditKind::Ingested, serde_json::Value::Null))
            .unwrap();
        fs::write(
            log.path(),
            format!(
                "{}\nnot json at all\n",
                fs::read_to_string(log.path()).unwrap().trim_end()
            ),
        )
        .unwrap();
        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_events_for_job_filters() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for job in [a, b, a] {
            log.append(
                &AuditEvent::new(AuditKind::StepCompleted, serde_json::Value::Null).for_job(job),
            )
            .unwrap();
        }
        assert_eq!(log.events_for_job(a).unwrap().len(), 2);
        assert_eq!(log.events_for_job(b).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let events = AuditLog::read_file(&dir.path().join("events.jsonl")).unwrap();
        assert!(events.is_empty());
    }
}
