//! Approval gate for supervised jobs.
//!
//! A job whose decision requires approval parks here with a oneshot
//! channel. Reviewers answer through chat-style replies
//! (`/approve <job-id>`, `/reject <job-id> [reason]`,
//! `/modify <job-id> <instructions>`) routed in via the HTTP server. No
//! reply within the configured window resolves to a timeout — never to an
//! implicit approve.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use regex::Regex;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::dispatch::job::Job;
use crate::errors::ApprovalError;
use crate::notify::Notification;

/// A reviewer's verdict on one pending job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalResponse {
    Approve,
    Reject(Option<String>),
    /// Approve, with instructions the executor must honor.
    Modify(String),
}

static REPLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^/(approve|reject|modify)\s+([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})(?:\s+(.+))?$",
    )
    .unwrap()
});

/// Parse a reviewer reply into a job id and response.
///
/// `modify` without instructions is rejected as malformed rather than
/// silently treated as a plain approval.
pub fn parse_reply(text: &str) -> Result<(Uuid, ApprovalResponse), ApprovalError> {
    let text = text.trim();
    let caps = REPLY_RE.captures(text).ok_or_else(|| ApprovalError::BadReply {
        text: text.to_string(),
    })?;
    let verb = caps[1].to_lowercase();
    let job_id = Uuid::parse_str(&caps[2]).map_err(|_| ApprovalError::BadReply {
        text: text.to_string(),
    })?;
    let rest = caps.get(3).map(|m| m.as_str().trim().to_string());

    let response = match verb.as_str() {
        "approve" => ApprovalResponse::Approve,
        "reject" => ApprovalResponse::Reject(rest),
        "modify" => match rest {
            Some(instructions) if !instructions.is_empty() => {
                ApprovalResponse::Modify(instructions)
            }
            _ => {
                return Err(ApprovalError::BadReply {
                    text: text.to_string(),
                });
            }
        },
        _ => unreachable!("regex alternation is exhaustive"),
    };
    Ok((job_id, response))
}

/// Render the approval-request message for a parked job.
pub fn format_request(job: &Job) -> Notification {
    let scores = format!(
        "complexity {:.2} ({}), confidence {:.2} ({}), risk {:.2} ({})",
        job.evaluation.complexity.score,
        job.evaluation.complexity.level,
        job.evaluation.confidence.score,
        job.evaluation.confidence.level,
        job.evaluation.risk.score,
        job.evaluation.risk.level,
    );
    Notification {
        subject: format!("Approval needed: {}", job.issue.title),
        body: format!(
            "Job {job_id} for issue {issue_id} ({repo}) wants supervised execution.\n\
             {scores}\n\
             Reasoning:\n{reasoning}\n\n\
             Reply with one of:\n\
             /approve {job_id}\n\
             /reject {job_id} [reason]\n\
             /modify {job_id} <instructions>",
            job_id = job.id,
            issue_id = job.issue.id,
            repo = job.issue.repository,
            reasoning = job.evaluation.reasoning.join("\n"),
        ),
    }
}

/// In-memory registry of jobs waiting on a reviewer.
#[derive(Default)]
pub struct ApprovalGate {
    pending: Mutex<HashMap<Uuid, oneshot::Sender<ApprovalResponse>>>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a job and get the receiving half back. Re-requesting a job id
    /// replaces the earlier channel, which then reads as resolved.
    pub fn request(&self, job_id: Uuid) -> oneshot::Receiver<ApprovalResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(job_id, tx);
        rx
    }

    /// Deliver a reviewer verdict to a parked job.
    pub fn resolve(&self, job_id: Uuid, response: ApprovalResponse) -> Result<(), ApprovalError> {
        let tx = self
            .pending
            .lock()
            .unwrap()
            .remove(&job_id)
            .ok_or(ApprovalError::UnknownJob { job_id })?;
        tx.send(response)
            .map_err(|_| ApprovalError::AlreadyResolved { job_id })
    }

    /// Drop a parked job without resolving it (timeout path).
    pub fn abandon(&self, job_id: Uuid) {
        self.pending.lock().unwrap().remove(&job_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Wait for the reviewer, up to `timeout`. The channel is removed from
    /// the pending map on timeout so later replies report an unknown job.
    pub async fn wait(
        &self,
        job_id: Uuid,
        rx: oneshot::Receiver<ApprovalResponse>,
        timeout: Duration,
    ) -> Result<ApprovalResponse, ApprovalError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ApprovalError::AlreadyResolved { job_id }),
            Err(_) => {
                self.abandon(job_id);
                Err(ApprovalError::Timeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }
}
