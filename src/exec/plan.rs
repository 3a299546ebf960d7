//! Execution plans: typed step lists chosen by issue type, run strictly
//! sequentially with abort on first failure.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ExecutionError;
use crate::exec::{ExecutionContext, ExecutionResult, StepResult, StepRunner};
use crate::issue::IssueType;

/// The kinds of steps an autonomous plan can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Analyze,
    Design,
    Implement,
    Fix,
    WriteTests,
    RunTests,
    WriteDocs,
    FullTestSuite,
    CreatePr,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Design => "design",
            Self::Implement => "implement",
            Self::Fix => "fix",
            Self::WriteTests => "write_tests",
            Self::RunTests => "run_tests",
            Self::WriteDocs => "write_docs",
            Self::FullTestSuite => "full_test_suite",
            Self::CreatePr => "create_pr",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analyze" => Ok(Self::Analyze),
            "design" => Ok(Self::Design),
            "implement" => Ok(Self::Implement),
            "fix" => Ok(Self::Fix),
            "write_tests" => Ok(Self::WriteTests),
            "run_tests" => Ok(Self::RunTests),
            "write_docs" => Ok(Self::WriteDocs),
            "full_test_suite" => Ok(Self::FullTestSuite),
            "create_pr" => Ok(Self::CreatePr),
            _ => Err(format!("Invalid step kind: {}", s)),
        }
    }
}

/// One step in an execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub kind: StepKind,
    pub description: String,
}

impl PlanStep {
    fn new(kind: StepKind, description: &str) -> Self {
        Self {
            kind,
            description: description.to_string(),
        }
    }
}

/// Build the ordered plan for an issue type. Every plan ends with the full
/// test suite and a PR.
pub fn build_plan(issue_type: IssueType) -> Vec<PlanStep> {
    let mut plan = match issue_type {
        IssueType::Bug => vec![
            PlanStep::new(StepKind::Analyze, "Reproduce and localize the defect"),
            PlanStep::new(StepKind::Fix, "Apply the minimal fix"),
            PlanStep::new(StepKind::RunTests, "Run the affected tests"),
        ],
        IssueType::Feature => vec![
            PlanStep::new(StepKind::Design, "Sketch the change and its seams"),
            PlanStep::new(StepKind::Implement, "Implement the feature"),
            PlanStep::new(StepKind::RunTests, "Run the affected tests"),
            PlanStep::new(StepKind::WriteDocs, "Update documentation"),
        ],
        IssueType::Documentation => vec![
            PlanStep::new(StepKind::WriteDocs, "Apply the documentation change"),
        ],
        IssueType::Testing => vec![
            PlanStep::new(StepKind::WriteTests, "Add or repair the tests"),
            PlanStep::new(StepKind::RunTests, "Run the new tests"),
        ],
        IssueType::General => vec![
            PlanStep::new(StepKind::Analyze, "Understand the request"),
            PlanStep::new(StepKind::Implement, "Apply the change"),
        ],
    };
    plan.push(PlanStep::new(StepKind::FullTestSuite, "Run the full test suite"));
    plan.push(PlanStep::new(StepKind::CreatePr, "Open a pull request"));
    plan
}

/// Run a plan step-by-step.
///
/// Stops at the first failing step and returns a clean `success: false`
/// result preserving every completed step for diagnostics. A step timeout
/// counts as a failure of that step. Cancellation is honoured between
/// steps only; a cancelled run also comes back as a clean failure. No step
/// is ever retried within a single job.
pub async fn run_plan(
    plan: &[PlanStep],
    ctx: &ExecutionContext,
    runner: &dyn StepRunner,
) -> Result<ExecutionResult, ExecutionError> {
    let mut steps: Vec<StepResult> = Vec::with_capacity(plan.len());

    for step in plan {
        if ctx.is_cancelled() {
            tracing::info!(step = %step.kind, "cancelled before step");
            return Ok(ExecutionResult {
                success: false,
                steps,
                failed_step: Some(step.kind),
                summary: format!("cancelled before step {}", step.kind),
            });
        }

        let result = match tokio::time::timeout(ctx.step_timeout, runner.run_step(step, ctx)).await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return Err(e),
            Err(_) => StepResult {
                step: step.kind,
                success: false,
                detail: format!("timed out after {}s", ctx.step_timeout.as_secs()),
            },
        };

        if !result.success {
            tracing::warn!(step = %step.kind, detail = %result.detail, "step failed");
            let failed = step.kind;
            let detail = result.detail.clone();
            return Ok(ExecutionResult {
                success: false,
                steps,
                failed_step: Some(failed),
                summary: format!("step {} failed: {}", failed, detail),
            });
        }

        tracing::debug!(step = %step.kind, "step completed");
        steps.push(result);
    }

    Ok(ExecutionResult {
        success: true,
        failed_step: None,
        summary: format!("{} steps completed", steps.len()),
        steps,
    })
}
