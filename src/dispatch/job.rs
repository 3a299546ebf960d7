//! Job records and their status state machine.
//!
//! A job is one dispatch attempt for an issue, carrying a frozen snapshot
//! of its evaluation and decision. Jobs are owned exclusively by the
//! dispatcher; terminal states are final and a retry is always a new job.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::decision::DispatchDecision;
use crate::errors::DispatchError;
use crate::evaluate::Evaluation;
use crate::exec::ExecutionResult;
use crate::issue::Issue;

/// Job lifecycle states.
///
/// ```text
/// queued ──────────────────────────> executing ──> completed
///    │                                   │   └────> failed
///    └──> awaiting_approval ──> executing└────────> error
///              │         └────> failed          (reject)
///              └──> approval_timeout
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    AwaitingApproval,
    Executing,
    Completed,
    Failed,
    Error,
    ApprovalTimeout,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::ApprovalTimeout => "approval_timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Error | Self::ApprovalTimeout
        )
    }

    /// Whether the state machine permits `self -> to`.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Queued, AwaitingApproval)
                | (Queued, Executing)
                | (AwaitingApproval, Executing)
                | (AwaitingApproval, ApprovalTimeout)
                | (AwaitingApproval, Failed)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Executing, Error)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "awaiting_approval" => Ok(Self::AwaitingApproval),
            "executing" => Ok(Self::Executing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "error" => Ok(Self::Error),
            "approval_timeout" => Ok(Self::ApprovalTimeout),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// One dispatch attempt for an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub issue: Issue,
    /// Frozen at dispatch time.
    pub evaluation: Evaluation,
    /// Frozen at dispatch time.
    pub decision: DispatchDecision,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<ExecutionResult>,
    pub error: Option<String>,
    /// Free-text instructions from a `modify` approval response.
    pub approval_instructions: Option<String>,
}

impl Job {
    pub fn new(issue: Issue, evaluation: Evaluation, decision: DispatchDecision) -> Self {
        Self {
            id: Uuid::new_v4(),
            issue,
            evaluation,
            decision,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            approval_instructions: None,
        }
    }

    /// Validated state transition. Stamps `started_at` / `completed_at` as
    /// the job enters execution or a terminal state.
    pub fn transition(&mut self, to: JobStatus) -> Result<(), DispatchError> {
        if !self.status.can_transition_to(to) {
            return Err(DispatchError::IllegalTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        match to {
            JobStatus::Executing => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::decision::{ExecutionMode, ExecutorKind};
    use crate::evaluate::{AxisScore, Level, RiskScore, Suitability};
    use crate::issue::{IssueType, Priority, SourceType};
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_job() -> Job {
        let issue = Issue {
            id: "1".to_string(),
            title: "Fix typo".to_string(),
            body: String::new(),
            labels: vec![],
            repository: "acme/widgets".to_string(),
            source_type: SourceType::Github,
            priority: Priority::Medium,
            issue_type: IssueType::Documentation,
            created_at: Utc::now(),
            url: String::new(),
        };
        let axis = AxisScore {
            score: 0.2,
            level: Level::Low,
            factors: BTreeMap::new(),
        };
        let evaluation = Evaluation {
            complexity: axis.clone(),
            confidence: axis,
            risk: RiskScore {
                score: 0.1,
                level: Level::Low,
            },
            suitability: Suitability::High,
            reasoning: vec![],
            recommendations: BTreeSet::new(),
        };
        let decision = DispatchDecision {
            executor: ExecutorKind::Autonomous,
            mode: ExecutionMode::Autonomous,
            priority: Priority::Medium,
            approval_required: false,
            reason: "test".to_string(),
        };
        Job::new(issue, evaluation, decision)
    }

    #[test]
    fn test_status_roundtrip() {
        for s in &[
            "queued",
            "awaiting_approval",
            "executing",
            "completed",
            "failed",
            "error",
            "approval_timeout",
        ] {
            let parsed: JobStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = sample_job();
        assert_eq!(job.status, JobStatus::Queued);
        job.transition(JobStatus::Executing).unwrap();
        assert!(job.started_at.is_some());
        job.transition(JobStatus::Completed).unwrap();
        assert!(job.completed_at.is_some());
        assert!(job.status.is_terminal());
    }

    #[test]
    fn test_approval_path_transitions() {
        let mut job = sample_job();
        job.transition(JobStatus::AwaitingApproval).unwrap();
        job.transition(JobStatus::Executing).unwrap();
        job.transition(JobStatus::Failed).unwrap();
    }

    #[test]
    fn test_reject_goes_to_failed_without_execution() {
        let mut job = sample_job();
        job.transition(JobStatus::AwaitingApproval).unwrap();
        job.transition(JobStatus::Failed).unwrap();
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_approval_timeout_transition() {
        let mut job = sample_job();
        job.transition(JobStatus::AwaitingApproval).unwrap();
        job.transition(JobStatus::ApprovalTimeout).unwrap();
        assert!(job.status.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = sample_job();
        job.transition(JobStatus::Executing).unwrap();
        job.transition(JobStatus::Completed).unwrap();
        let err = job.transition(JobStatus::Executing).unwrap_err();
        assert!(matches!(err, DispatchError::IllegalTransition { .. }));
    }

    #[test]
    fn test_cannot_skip_approval_into_timeout() {
        let mut job = sample_job();
        assert!(job.transition(JobStatus::ApprovalTimeout).is_err());
        assert!(job.transition(JobStatus::Completed).is_err());
    }

    #[test]
    fn test_queued_cannot_fail_directly() {
        let mut job = sample_job();
        assert!(job.transition(JobStatus::Failed).is_err());
    }
}
