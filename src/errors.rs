//! Typed error hierarchy for the dispatch pipeline.
//!
//! Five top-level enums cover the five subsystems:
//! - `AdapterError` — inbound payload parsing and source polling
//! - `EvaluationError` — assessor / rule-engine failures
//! - `DispatchError` — job creation, queueing, and state transitions
//! - `ExecutionError` — plan runner and executor failures
//! - `ApprovalError` — approval gate failures
//!
//! Errors inside a single job never escape the job-execution boundary; the
//! dispatcher records them on the job and keeps running.

use thiserror::Error;

use crate::dispatch::job::JobStatus;
use crate::issue::SourceType;

/// Errors from inbound source adapters (webhook parsing and polling).
///
/// The originating source lives in a field named `source_type`: thiserror
/// reserves `source` for a wrapped inner error.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Malformed {source_type} payload: {message}")]
    MalformedPayload {
        source_type: SourceType,
        message: String,
    },

    #[error("Webhook signature verification failed")]
    Unauthorized,

    #[error("Source {source_type} is disabled after {consecutive_errors} consecutive failures")]
    SourceDisabled {
        source_type: SourceType,
        consecutive_errors: u32,
    },

    #[error("Poll of {source_type} failed: {message}")]
    PollFailed {
        source_type: SourceType,
        message: String,
    },
}

/// Errors from the assessor or rule engine.
///
/// Callers must treat any evaluation error as "uncertain" and force the
/// human executor — never default to autonomous dispatch.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Assessor failed for issue {issue_id}: {message}")]
    AssessorFailed { issue_id: String, message: String },

    #[error("Rule '{rule}' failed for issue {issue_id}: {message}")]
    RuleFailed {
        rule: String,
        issue_id: String,
        message: String,
    },
}

/// Errors from job creation and the queue.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Duplicate provider event {source_type}/{provider_id}")]
    DuplicateEvent {
        source_type: SourceType,
        provider_id: String,
    },

    #[error("Illegal job transition {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    #[error("Job {id} not found")]
    JobNotFound { id: uuid::Uuid },

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from executor backends and the plan runner.
///
/// Step failures, timeouts, and cancellations are not errors: the plan
/// runner reports them as a clean `success: false` result so the completed
/// steps survive for diagnostics. Only infrastructure breakage lands here.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Hybrid executor invoked without an approval verdict")]
    MissingApproval,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the approval gate.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("No approval response within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("No job awaiting approval with id {job_id}")]
    UnknownJob { job_id: uuid::Uuid },

    #[error("Job {job_id} already received a terminal approval response")]
    AlreadyResolved { job_id: uuid::Uuid },

    #[error("Unparseable approval reply: {text}")]
    BadReply { text: String },
}
