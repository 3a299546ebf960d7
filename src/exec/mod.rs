//! Executor backends.
//!
//! Every job is handed to exactly one [`Executor`]: fully autonomous plan
//! execution, a human handoff, or the approval-gated hybrid. The actual
//! work behind each plan step goes through the [`StepRunner`] seam so the
//! pipeline can be exercised without a real agent or shell.

pub mod autonomous;
pub mod human;
pub mod hybrid;
pub mod plan;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dispatch::job::Job;
use crate::errors::ExecutionError;
use crate::evaluate::Level;
use crate::exec::plan::{PlanStep, StepKind};

pub use autonomous::AutonomousExecutor;
pub use human::HumanExecutor;
pub use hybrid::HybridExecutor;

/// Terminal approval disposition carried into hybrid execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDisposition {
    Approved,
    /// Approved with extra free-text instructions.
    Modified(String),
}

/// Per-job execution context, built by the dispatcher before handing the
/// job to an executor.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Branch the change lands on, derived from the issue title.
    pub branch_name: String,
    /// Repository the job operates on.
    pub workspace: String,
    /// Guard rails derived from the evaluation (and `modify` instructions).
    pub constraints: Vec<String>,
    /// Checked between plan steps; set by an external cancel signal.
    pub cancel: Arc<AtomicBool>,
    pub step_timeout: Duration,
    /// Present only for jobs that went through the approval gate.
    pub approval: Option<ApprovalDisposition>,
}

impl ExecutionContext {
    pub fn for_job(job: &Job, step_timeout: Duration, cancel: Arc<AtomicBool>) -> Self {
        let mut constraints = Vec::new();
        if job.evaluation.risk.level != Level::Low {
            constraints.push("limit the change to the smallest possible diff".to_string());
        }
        if job.evaluation.risk.level == Level::High {
            constraints.push("do not touch authentication or data migration code".to_string());
        }
        Self {
            branch_name: format!("triage/issue-{}-{}", job.issue.id, slugify(&job.issue.title, 40)),
            workspace: job.issue.repository.clone(),
            constraints,
            cancel,
            step_timeout,
            approval: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            branch_name: "triage/test".to_string(),
            workspace: "acme/widgets".to_string(),
            constraints: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            step_timeout: Duration::from_secs(5),
            approval: None,
        }
    }
}

/// Convert a title to a branch-safe slug, limited to `max_len` bytes.
pub fn slugify(title: &str, max_len: usize) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.len() > max_len {
        let mut end = max_len;
        while !slug.is_char_boundary(end) {
            end -= 1;
        }
        slug[..end].trim_end_matches('-').to_string()
    } else {
        slug
    }
}

/// Outcome of one plan step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: StepKind,
    pub success: bool,
    pub detail: String,
}

/// What an executor reports back for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// Results of the steps that completed, preserved for diagnostics even
    /// on failure.
    pub steps: Vec<StepResult>,
    pub failed_step: Option<StepKind>,
    pub summary: String,
}

impl ExecutionResult {
    /// A success that carries no plan (human handoff).
    pub fn handed_off(summary: String) -> Self {
        Self {
            success: true,
            steps: Vec::new(),
            failed_step: None,
            summary,
        }
    }

    /// A clean failure without plan execution (approval rejected).
    pub fn rejected(summary: String) -> Self {
        Self {
            success: false,
            steps: Vec::new(),
            failed_step: None,
            summary,
        }
    }
}

/// One executor backend (autonomous, human, hybrid).
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        job: &Job,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult, ExecutionError>;
}

/// Runs a single plan step. The production backend may shell out; tests
/// use [`SimulatedRunner`].
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run_step(
        &self,
        step: &PlanStep,
        ctx: &ExecutionContext,
    ) -> Result<StepResult, ExecutionError>;
}

/// Deterministic in-process step runner.
#[derive(Default)]
pub struct SimulatedRunner {
    fail_on: Option<StepKind>,
    error: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl SimulatedRunner {
    pub fn failing_on(step: StepKind) -> Self {
        Self {
            fail_on: Some(step),
            ..Self::default()
        }
    }

    pub fn erroring() -> Self {
        Self {
            error: true,
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepRunner for SimulatedRunner {
    async fn run_step(
        &self,
        step: &PlanStep,
        _ctx: &ExecutionContext,
    ) -> Result<StepResult, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.error {
            return Err(ExecutionError::Other(anyhow::anyhow!(
                "simulated runner crash"
            )));
        }
        if self.fail_on == Some(step.kind) {
            return Ok(StepResult {
                step: step.kind,
                success: false,
                detail: "simulated failure".to_string(),
            });
        }
        Ok(StepResult {
            step: step.kind,
            success: true,
            detail: format!("simulated: {}", step.description),
        })
    }
}

/// Shells out to a configured command per step kind; steps without a
/// configured command succeed as no-ops so partial configurations work.
pub struct CommandRunner {
    commands: HashMap<StepKind, String>,
}

impl CommandRunner {
    pub fn new(commands: HashMap<StepKind, String>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl StepRunner for CommandRunner {
    async fn run_step(
        &self,
        step: &PlanStep,
        ctx: &ExecutionContext,
    ) -> Result<StepResult, ExecutionError> {
        let Some(command) = self.commands.get(&step.kind) else {
            return Ok(StepResult {
                step: step.kind,
                success: true,
                detail: "no command configured, skipped".to_string(),
            });
        };

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("TRIAGE_BRANCH", &ctx.branch_name)
            .env("TRIAGE_WORKSPACE", &ctx.workspace)
            .output()
            .await
            .map_err(|e| ExecutionError::Other(anyhow::anyhow!("spawn failed: {e}")))?;

        let detail = if output.status.success() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            String::from_utf8_lossy(&output.stderr).trim().to_string()
        };
        Ok(StepResult {
            step: step.kind,
            success: output.status.success(),
            detail,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::plan::PlanStep;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Fix typo in README", 40), "fix-typo-in-readme");
        assert_eq!(slugify("A  --  messy:title!", 40), "a-messy-title");
        assert_eq!(slugify("long title here", 6), "long-t");
    }

    #[tokio::test]
    async fn test_simulated_runner_counts_calls() {
        let runner = SimulatedRunner::default();
        let step = PlanStep {
            kind: StepKind::Analyze,
            description: "x".to_string(),
        };
        let ctx = ExecutionContext::for_tests();
        runner.run_step(&step, &ctx).await.unwrap();
        runner.run_step(&step, &ctx).await.unwrap();
        assert_eq!(runner.calls(), 2);
    }

    #[tokio::test]
    async fn test_command_runner_skips_unconfigured_steps() {
        let runner = CommandRunner::new(HashMap::new());
        let step = PlanStep {
            kind: StepKind::RunTests,
            description: "x".to_string(),
        };
        let result = runner
            .run_step(&step, &ExecutionContext::for_tests())
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.detail.contains("skipped"));
    }

    #[tokio::test]
    async fn test_command_runner_reports_exit_status() {
        let mut commands = HashMap::new();
        commands.insert(StepKind::Analyze, "true".to_string());
        commands.insert(StepKind::Fix, "false".to_string());
        let runner = CommandRunner::new(commands);
        let ctx = ExecutionContext::for_tests();

        let ok = runner
            .run_step(
                &PlanStep {
                    kind: StepKind::Analyze,
                    description: "x".to_string(),
                },
                &ctx,
            )
            .await
            .unwrap();
        assert!(ok.success);

        let bad = runner
            .run_step(
                &PlanStep {
                    kind: StepKind::Fix,
                    description: "x".to_string(),
                },
                &ctx,
            )
            .await
            .unwrap();
        assert!(!bad.success);
    }

    #[test]
    fn test_context_constraints_follow_risk() {
        use crate::dispatch::decision::{DispatchDecision, ExecutionMode, ExecutorKind};
        use crate::evaluate::{AxisScore, Evaluation, RiskScore, Suitability};
        use crate::issue::{Issue, IssueType, Priority, SourceType};
        use std::collections::{BTreeMap, BTreeSet};

        let issue = Issue {
            id: "7".to_string(),
            title: "Fix crash".to_string(),
            body: String::new(),
            labels: vec![],
            repository: "acme/widgets".to_string(),
            source_type: SourceType::Github,
            priority: Priority::High,
            issue_type: IssueType::Bug,
            created_at: chrono::Utc::now(),
            url: String::new(),
        };
        let axis = AxisScore {
            score: 0.5,
            level: Level::Medium,
            factors: BTreeMap::new(),
        };
        let evaluation = Evaluation {
            complexity: axis.clone(),
            confidence: axis,
            risk: RiskScore {
                score: 0.8,
                level: Level::High,
            },
            suitability: Suitability::Medium,
            reasoning: vec![],
            recommendations: BTreeSet::new(),
        };
        let decision = DispatchDecision {
            executor: ExecutorKind::Hybrid,
            mode: ExecutionMode::Supervised,
            priority: Priority::High,
            approval_required: true,
            reason: "test".to_string(),
        };
        let job = Job::new(issue, evaluation, decision);
        let ctx = ExecutionContext::for_job(
            &job,
            Duration::from_secs(1),
            Arc::new(AtomicBool::new(false)),
        );
        assert_eq!(ctx.branch_name, "triage/issue-7-fix-crash");
        assert_eq!(ctx.constraints.len(), 2);
    }
}
